use std::sync::Arc;

use serde_json::Value;
use tracing::debug;

use super::parameter::{BoundValue, ParameterDescriptor};
use super::{
    Access, BindingContract, BindingData, BindingValue, ContractType, TriggerBinding, TriggerBindingProvider,
    TriggerData, TriggerValue, ValueBinder,
};
use crate::error::Error;
use crate::invocation::OrchestrationInvocation;
use crate::{RETURN_BINDING, TriggerAttribute, TriggerKind};

/// Resolves orchestration-trigger parameters. The parameter must be the
/// orchestration context itself (or "any").
#[derive(Debug, Clone, Default)]
pub struct OrchestrationTriggerBindingProvider;

impl OrchestrationTriggerBindingProvider {
    pub fn new() -> Self {
        Self
    }
}

impl TriggerBindingProvider for OrchestrationTriggerBindingProvider {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Orchestration
    }

    fn try_create(&self, descriptor: &ParameterDescriptor) -> Result<Option<Arc<dyn TriggerBinding>>, Error> {
        let Some(attribute) = descriptor
            .trigger
            .as_ref()
            .filter(|t| t.kind() == TriggerKind::Orchestration)
        else {
            return Ok(None);
        };

        let ty = &descriptor.parameter_type;
        if !ty.is_any() && !ty.is::<OrchestrationInvocation>() {
            return Err(Error::configuration(format!(
                "Orchestration triggers cannot be bound to {}; use the orchestration context type",
                ty.name()
            )));
        }

        let binding = OrchestrationTriggerBinding {
            name: attribute.effective_name(&descriptor.function_name).to_string(),
            attribute: attribute.clone(),
            parameter: descriptor.clone(),
            contract: BindingContract::new().with(RETURN_BINDING, ContractType::Any, Access::WriteOnly),
        };
        debug!(
            target: "durable_functions::bindings",
            function = %binding.name,
            "created orchestration trigger binding"
        );
        Ok(Some(Arc::new(binding)))
    }
}

pub struct OrchestrationTriggerBinding {
    name: String,
    attribute: TriggerAttribute,
    parameter: ParameterDescriptor,
    contract: BindingContract,
}

impl TriggerBinding for OrchestrationTriggerBinding {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Orchestration
    }

    fn function_name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> Option<&str> {
        self.attribute.version()
    }

    fn trigger_value_type(&self) -> &'static str {
        std::any::type_name::<OrchestrationInvocation>()
    }

    fn binding_data_contract(&self) -> &BindingContract {
        &self.contract
    }

    fn parameter(&self) -> &ParameterDescriptor {
        &self.parameter
    }

    fn bind(&self, value: TriggerValue) -> Result<TriggerData, Error> {
        let TriggerValue::Orchestration(invocation) = value else {
            return Err(Error::configuration(format!(
                "orchestration function '{}' was handed an activity trigger value",
                self.name
            )));
        };

        let mut binding_data = BindingData::new();
        binding_data.insert(
            RETURN_BINDING,
            BindingValue::Binder(Arc::new(OrchestrationReturnValueBinder {
                invocation: invocation.clone(),
            })),
        );

        Ok(TriggerData {
            value: BoundValue::new(invocation),
            binding_data,
        })
    }
}

/// `$return` sink for orchestrations: first write wins, later writes are skipped.
pub struct OrchestrationReturnValueBinder {
    invocation: OrchestrationInvocation,
}

impl OrchestrationReturnValueBinder {
    pub fn new(invocation: OrchestrationInvocation) -> Self {
        Self { invocation }
    }
}

impl ValueBinder for OrchestrationReturnValueBinder {
    fn write(&self, value: &Value) -> Result<(), Error> {
        self.invocation.set_output_if_unset(value).map(|_| ())
    }

    fn to_display_string(&self) -> Option<String> {
        self.invocation.serialized_output()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::ParameterType;
    use crate::invocation::ActivityInvocation;
    use serde_json::json;

    fn invocation() -> OrchestrationInvocation {
        OrchestrationInvocation::new("Hub", "HelloSequence", None, "abc")
    }

    #[test]
    fn passes_context_through_with_return_slot() {
        let binding = OrchestrationTriggerBindingProvider
            .try_create(&ParameterDescriptor::orchestration("HelloSequence"))
            .unwrap()
            .unwrap();
        assert_eq!(binding.function_name(), "HelloSequence");
        assert_eq!(binding.binding_data_contract().len(), 1);

        let ctx = invocation();
        let data = binding.bind(TriggerValue::Orchestration(ctx.clone())).unwrap();
        let (bound, slots) = data.take_value::<OrchestrationInvocation>().unwrap();
        assert_eq!(bound.instance_id(), "abc");
        assert!(slots.instance_id().is_none());

        ctx.set_output("from body").unwrap();
        let binder = slots.return_binder().unwrap();
        binder.write(&json!("from return")).unwrap();
        assert_eq!(binder.to_display_string().as_deref(), Some("\"from body\""));
        assert!(binder.read().is_err());
    }

    #[test]
    fn rejects_non_context_parameter() {
        let d = ParameterDescriptor::new("Run", "ctx", ParameterType::of::<String>())
            .with_trigger(TriggerAttribute::orchestration());
        let err = OrchestrationTriggerBindingProvider.try_create(&d).err().unwrap();
        assert!(err.is_configuration());

        let d = ParameterDescriptor::new("Run", "ctx", ParameterType::any())
            .with_trigger(TriggerAttribute::orchestration());
        assert!(OrchestrationTriggerBindingProvider.try_create(&d).unwrap().is_some());
    }

    #[test]
    fn wrong_trigger_value_kind() {
        let binding = OrchestrationTriggerBindingProvider
            .try_create(&ParameterDescriptor::orchestration("Run"))
            .unwrap()
            .unwrap();
        let err = binding
            .bind(TriggerValue::Activity(Arc::new(ActivityInvocation::new("i", "[]"))))
            .unwrap_err();
        assert!(err.is_configuration());
    }
}
