use std::any::{Any, TypeId};
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use super::converters::{ConverterRegistry, ConverterRegistryBuilder};
use super::parameter::{BoundValue, ParameterDescriptor, TypeShape};
use super::{
    Access, BindingContract, BindingData, BindingValue, ContractType, TriggerBinding, TriggerBindingProvider,
    TriggerData, TriggerValue, ValueBinder,
};
use crate::error::Error;
use crate::invocation::ActivityInvocation;
use crate::{INSTANCE_ID_BINDING, RETURN_BINDING, TriggerAttribute, TriggerKind};

/// Resolves activity-trigger parameters into [`ActivityTriggerBinding`]s.
#[derive(Debug, Clone)]
pub struct ActivityTriggerBindingProvider {
    converters: ConverterRegistry,
}

impl ActivityTriggerBindingProvider {
    pub fn new(converters: ConverterRegistry) -> Self {
        Self { converters }
    }

    /// Register the built-in activity conversions. Call once per host, before
    /// the converter registry is frozen.
    pub fn register_binding_rules(builder: &mut ConverterRegistryBuilder) {
        builder.register::<ActivityInvocation, String, _>(TriggerKind::Activity, |invocation, _| {
            Ok(invocation.raw_input().to_string())
        });
        builder.register::<ActivityInvocation, Map<String, Value>, _>(TriggerKind::Activity, |invocation, _| {
            activity_to_object(invocation)
        });
    }
}

// The root token itself must be an object; the parameter array is not unwrapped.
fn activity_to_object(invocation: &ActivityInvocation) -> Result<Map<String, Value>, Error> {
    match invocation.input_as_json()? {
        Value::Object(map) => Ok(map),
        _ => Err(Error::argument_for("input", "activity input is not a JSON object")),
    }
}

impl TriggerBindingProvider for ActivityTriggerBindingProvider {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Activity
    }

    fn try_create(&self, descriptor: &ParameterDescriptor) -> Result<Option<Arc<dyn TriggerBinding>>, Error> {
        let Some(attribute) = descriptor.trigger.as_ref().filter(|t| t.kind() == TriggerKind::Activity) else {
            return Ok(None);
        };
        let binding = ActivityTriggerBinding {
            name: attribute.effective_name(&descriptor.function_name).to_string(),
            attribute: attribute.clone(),
            parameter: descriptor.clone(),
            contract: BindingContract::new()
                .with(RETURN_BINDING, ContractType::Any, Access::WriteOnly)
                .with(INSTANCE_ID_BINDING, ContractType::String, Access::ReadOnly),
            converters: self.converters.clone(),
        };
        debug!(
            target: "durable_functions::bindings",
            function = %binding.name,
            parameter_type = descriptor.parameter_type.name(),
            "created activity trigger binding"
        );
        Ok(Some(Arc::new(binding)))
    }
}

pub struct ActivityTriggerBinding {
    name: String,
    attribute: TriggerAttribute,
    parameter: ParameterDescriptor,
    contract: BindingContract,
    converters: ConverterRegistry,
}

impl ActivityTriggerBinding {
    fn convert(&self, invocation: &Arc<ActivityInvocation>) -> Result<BoundValue, Error> {
        let ty = &self.parameter.parameter_type;
        if ty.is_any() {
            return Ok(BoundValue::new(invocation.clone()));
        }

        if let Some(f) = self
            .converters
            .lookup(TypeId::of::<ActivityInvocation>(), ty.type_id(), TriggerKind::Activity)
        {
            return f(invocation.as_ref() as &dyn Any, &self.attribute);
        }

        if ty.shape() == TypeShape::Concrete
            && let Some(result) = ty.deserialize(invocation)
        {
            return result;
        }

        Err(Error::configuration(format!(
            "Activity triggers cannot be bound to {}",
            ty.name()
        )))
    }
}

impl TriggerBinding for ActivityTriggerBinding {
    fn kind(&self) -> TriggerKind {
        TriggerKind::Activity
    }

    fn function_name(&self) -> &str {
        &self.name
    }

    fn version(&self) -> Option<&str> {
        self.attribute.version()
    }

    fn trigger_value_type(&self) -> &'static str {
        std::any::type_name::<ActivityInvocation>()
    }

    fn binding_data_contract(&self) -> &BindingContract {
        &self.contract
    }

    fn parameter(&self) -> &ParameterDescriptor {
        &self.parameter
    }

    fn bind(&self, value: TriggerValue) -> Result<TriggerData, Error> {
        let TriggerValue::Activity(invocation) = value else {
            return Err(Error::configuration(format!(
                "activity function '{}' was handed an orchestration trigger value",
                self.name
            )));
        };

        let converted = self.convert(&invocation)?;

        let mut binding_data = BindingData::new();
        binding_data.insert(
            INSTANCE_ID_BINDING,
            BindingValue::Text(invocation.instance_id().to_string()),
        );
        binding_data.insert(
            RETURN_BINDING,
            BindingValue::Binder(Arc::new(ActivityReturnValueBinder { invocation })),
        );

        Ok(TriggerData {
            value: converted,
            binding_data,
        })
    }
}

/// `$return` sink for activities. Writes go through the strict write-once path.
pub struct ActivityReturnValueBinder {
    invocation: Arc<ActivityInvocation>,
}

impl ValueBinder for ActivityReturnValueBinder {
    fn write(&self, value: &Value) -> Result<(), Error> {
        self.invocation.set_output(value)
    }

    fn to_display_string(&self) -> Option<String> {
        self.invocation.serialized_output()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::ParameterType;
    use serde::Deserialize;
    use serde_json::json;

    trait Greeter {}

    #[derive(Debug, Default, Deserialize, PartialEq)]
    struct Location {
        city: String,
    }

    fn provider() -> ActivityTriggerBindingProvider {
        let mut b = ConverterRegistry::builder();
        ActivityTriggerBindingProvider::register_binding_rules(&mut b);
        ActivityTriggerBindingProvider::new(b.build_result().unwrap())
    }

    fn bind(ty: ParameterType, input: &str) -> Result<TriggerData, Error> {
        let binding = provider()
            .try_create(&ParameterDescriptor::activity("Say", ty))
            .unwrap()
            .unwrap();
        binding.bind(TriggerValue::Activity(Arc::new(ActivityInvocation::new("inst-9", input))))
    }

    #[test]
    fn ignores_descriptors_without_activity_trigger() {
        let p = provider();
        assert!(p.try_create(&ParameterDescriptor::orchestration("Run")).unwrap().is_none());
        let plain = ParameterDescriptor::new("Say", "x", ParameterType::of::<String>());
        assert!(p.try_create(&plain).unwrap().is_none());
    }

    #[test]
    fn name_and_version_from_attribute() {
        let d = ParameterDescriptor::activity("Fn", ParameterType::any())
            .with_trigger(TriggerAttribute::activity().with_name("Say").with_version("3"));
        let binding = provider().try_create(&d).unwrap().unwrap();
        assert_eq!(binding.function_name(), "Say");
        assert_eq!(binding.version(), Some("3"));
        assert_eq!(binding.kind(), TriggerKind::Activity);
        assert!(binding.binding_data_contract().contains("instanceid"));
        assert!(binding.binding_data_contract().contains("$return"));
    }

    #[test]
    fn any_passes_invocation_through() {
        let data = bind(ParameterType::any(), r#"["x"]"#).unwrap();
        let (invocation, _) = data.take_value::<Arc<ActivityInvocation>>().unwrap();
        assert_eq!(invocation.raw_input(), r#"["x"]"#);
    }

    #[test]
    fn string_converter_returns_raw_input() {
        let data = bind(ParameterType::of::<String>(), r#"["Hello"]"#).unwrap();
        let (raw, bindings) = data.take_value::<String>().unwrap();
        assert_eq!(raw, r#"["Hello"]"#);
        assert_eq!(bindings.instance_id(), Some("inst-9"));
    }

    #[test]
    fn object_converter_requires_root_object() {
        let data = bind(ParameterType::of::<Map<String, Value>>(), r#"{"a":1}"#).unwrap();
        let (map, _) = data.take_value::<Map<String, Value>>().unwrap();
        assert_eq!(map.get("a"), Some(&json!(1)));

        let err = bind(ParameterType::of::<Map<String, Value>>(), r#"[{"a":1}]"#).unwrap_err();
        assert!(err.is_argument());
        let err = bind(ParameterType::of::<Map<String, Value>>(), r#"["text"]"#).unwrap_err();
        assert!(err.is_argument());
    }

    #[test]
    fn concrete_type_falls_back_to_deserialization() {
        let data = bind(ParameterType::of::<Location>(), r#"[{"city":"Seattle"}]"#).unwrap();
        let (loc, _) = data.take_value::<Location>().unwrap();
        assert_eq!(loc.city, "Seattle");

        let err = bind(ParameterType::of::<Location>(), r#"[{"a":1},{"b":2}]"#).unwrap_err();
        assert!(err.is_argument());
    }

    #[test]
    fn abstract_type_without_converter_is_configuration_error() {
        let err = bind(ParameterType::of_abstract::<dyn Greeter>(), "[]").unwrap_err();
        assert!(err.is_configuration());
        assert!(err.to_string().contains("Greeter"));
    }

    #[test]
    fn return_binder_is_strict() {
        let data = bind(ParameterType::any(), "[]").unwrap();
        let binder = data.binding_data.return_binder().unwrap();
        binder.write(&json!("done")).unwrap();
        assert!(binder.write(&json!("again")).unwrap_err().is_invalid_operation());
        assert_eq!(binder.to_display_string().as_deref(), Some("\"done\""));
        assert!(binder.read().is_err());
    }
}
