use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;

use super::{ActivityCallback, TaskActivity};
use crate::bindings::{TriggerBinding, TriggerValue};
use crate::error::{Error, ExecuteError};
use crate::invocation::ActivityInvocation;
use crate::trace::{TraceHelper, TraceScope};

/// Runs activity work items through a cached activity binding.
///
/// Each run gets a fresh [`ActivityInvocation`]; a non-null return value is
/// written through the `$return` slot, so an activity that both sets its output
/// explicitly and returns a value fails with an invalid-operation error.
pub struct TaskActivityShim {
    trace: TraceHelper,
    binding: Arc<dyn TriggerBinding>,
    callback: ActivityCallback,
}

impl fmt::Debug for TaskActivityShim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskActivityShim")
            .field("function_name", &self.binding.function_name())
            .finish()
    }
}

impl TaskActivityShim {
    pub fn new(trace: TraceHelper, binding: Arc<dyn TriggerBinding>, callback: ActivityCallback) -> Self {
        Self {
            trace,
            binding,
            callback,
        }
    }

    pub fn function_name(&self) -> &str {
        self.binding.function_name()
    }

    fn fail(&self, scope: &TraceScope<'_>, error: ExecuteError) -> ExecuteError {
        let text = match &error {
            ExecuteError::Function(e) => format!("{e:#}"),
            ExecuteError::Invocation(e) => e.to_string(),
        };
        self.trace.function_failed(scope, &text, false);
        error
    }
}

#[async_trait]
impl TaskActivity for TaskActivityShim {
    async fn run(&self, instance_id: &str, serialized_input: &str) -> Result<Option<String>, ExecuteError> {
        let scope = TraceScope {
            function_name: self.binding.function_name(),
            version: self.binding.version(),
            instance_id,
            is_orchestrator: false,
        };
        self.trace.function_starting(&scope, Some(serialized_input), false);

        let invocation = Arc::new(ActivityInvocation::new(instance_id, serialized_input));
        let data = self
            .binding
            .bind(TriggerValue::Activity(invocation.clone()))
            .map_err(|e| self.fail(&scope, e.into()))?;
        let return_binder = data
            .binding_data
            .return_binder()
            .ok_or_else(|| self.fail(&scope, Error::configuration("activity binding has no $return slot").into()))?;

        let returned = (self.callback)(data)
            .await
            .map_err(|e| self.fail(&scope, e))?;

        if let Some(value) = returned.filter(|v| !v.is_null()) {
            return_binder.write(&value).map_err(|e| self.fail(&scope, e.into()))?;
        }

        let output = invocation.serialized_output();
        self.trace.function_completed(&scope, output.as_deref(), false, false);
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::{
        ActivityTriggerBindingProvider, ConverterRegistry, ParameterDescriptor, ParameterType, TriggerBindingProvider,
        TriggerData,
    };
    use crate::config::DurableTaskOptions;
    use crate::runtime::activity_callback;
    use crate::trace::{MemoryTraceSink, TraceEventKind};
    use serde_json::json;

    fn shim(ty: ParameterType, callback: ActivityCallback) -> (TaskActivityShim, Arc<MemoryTraceSink>) {
        let mut converters = ConverterRegistry::builder();
        ActivityTriggerBindingProvider::register_binding_rules(&mut converters);
        let provider = ActivityTriggerBindingProvider::new(converters.build());
        let binding = provider
            .try_create(&ParameterDescriptor::activity("Say", ty))
            .unwrap()
            .unwrap();
        let sink = Arc::new(MemoryTraceSink::new());
        let trace = TraceHelper::new(Arc::new(DurableTaskOptions::default()), sink.clone());
        (TaskActivityShim::new(trace, binding, callback), sink)
    }

    #[tokio::test]
    async fn returns_serialized_result() {
        let (shim, sink) = shim(
            ParameterType::any(),
            activity_callback(|data: TriggerData| async move {
                let (ctx, _) = data.take_value::<Arc<ActivityInvocation>>()?;
                let city: String = ctx.get_input()?;
                Ok::<_, anyhow::Error>(Some(json!(format!("Hello {city}!"))))
            }),
        );
        let out = shim.run("inst", r#"["Tokyo"]"#).await.unwrap();
        assert_eq!(out.as_deref(), Some("\"Hello Tokyo!\""));
        assert_eq!(sink.kinds(), vec![TraceEventKind::Starting, TraceEventKind::Completed]);
        assert!(sink.events().iter().all(|e| !e.is_orchestrator && !e.is_replaying));
    }

    #[tokio::test]
    async fn bind_failure_is_traced() {
        trait Unbound {}
        let (shim, sink) = shim(
            ParameterType::of_abstract::<dyn Unbound>(),
            activity_callback(|_| async { Ok(None) }),
        );
        let err = shim.run("inst", "[]").await.unwrap_err();
        assert!(err.as_invocation().unwrap().is_configuration());
        assert_eq!(sink.kinds(), vec![TraceEventKind::Starting, TraceEventKind::Failed]);
    }

    #[tokio::test]
    async fn body_error_is_returned_unchanged() {
        let (shim, sink) = shim(
            ParameterType::any(),
            activity_callback(|_| async { Err(anyhow::anyhow!("activity exploded")) }),
        );
        let err = shim.run("inst", "[]").await.unwrap_err();
        assert_eq!(err.as_function().unwrap().to_string(), "activity exploded");
        let failed = &sink.events()[1];
        assert_eq!(failed.error.as_deref(), Some("activity exploded"));
    }
}
