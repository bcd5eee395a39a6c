//! Host wiring: builds converters, providers and shims in startup order.
//!
//! Converter registration completes before any provider exists, so lookups
//! never race with registration.

use std::future::Future;
use std::sync::Arc;

use futures::FutureExt;
use futures::future;
use serde::Serialize;
use tracing::info;

use crate::bindings::{
    ActivityTriggerBindingProvider, ConverterRegistry, ConverterRegistryBuilder,
    OrchestrationTriggerBindingProvider, TriggerBinding, TriggerBindingProvider, TriggerData, TriggerValue,
};
use crate::config::DurableTaskOptions;
use crate::error::{Error, ExecuteError};
use crate::invocation::OrchestrationInvocation;
use crate::runtime::{
    ActivityCallback, FunctionRegistry, FunctionRegistryBuilder, TaskActivityShim, TaskOrchestrationShim,
    orchestration_callback,
};
use crate::trace::{TraceHelper, TraceSink, TracingTraceSink};
use crate::{TriggerAttribute, TriggerKind};

pub struct DurableTaskExtensionBuilder {
    options: DurableTaskOptions,
    sink: Option<Arc<dyn TraceSink>>,
    converters: ConverterRegistryBuilder,
}

impl DurableTaskExtensionBuilder {
    /// Replace the default `tracing`-backed trace sink.
    pub fn trace_sink(mut self, sink: Arc<dyn TraceSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Add a custom conversion. Registering a key the built-ins already cover
    /// fails the build.
    pub fn register_converter<S, D, F>(mut self, kind: TriggerKind, f: F) -> Self
    where
        S: 'static,
        D: Send + 'static,
        F: Fn(&S, &TriggerAttribute) -> Result<D, Error> + Send + Sync + 'static,
    {
        self.converters.register::<S, D, F>(kind, f);
        self
    }

    pub fn build(self) -> Result<DurableTaskExtension, Error> {
        let DurableTaskExtensionBuilder {
            options,
            sink,
            mut converters,
        } = self;
        options.validate()?;

        ActivityTriggerBindingProvider::register_binding_rules(&mut converters);
        let converters = converters.build_result()?;

        let options = Arc::new(options);
        let sink = sink.unwrap_or_else(|| Arc::new(TracingTraceSink));
        info!(
            target: "durable_functions::host",
            hub = %options.hub_name,
            converters = converters.len(),
            "durable task extension initialized"
        );
        Ok(DurableTaskExtension {
            trace: TraceHelper::new(options.clone(), sink),
            activity_provider: Arc::new(ActivityTriggerBindingProvider::new(converters.clone())),
            orchestration_provider: Arc::new(OrchestrationTriggerBindingProvider::new()),
            converters,
            options,
        })
    }
}

/// Process-wide extension state: options, trace helper, frozen converters and
/// the two trigger binding providers.
pub struct DurableTaskExtension {
    options: Arc<DurableTaskOptions>,
    trace: TraceHelper,
    converters: ConverterRegistry,
    activity_provider: Arc<ActivityTriggerBindingProvider>,
    orchestration_provider: Arc<OrchestrationTriggerBindingProvider>,
}

impl DurableTaskExtension {
    pub fn builder(options: DurableTaskOptions) -> DurableTaskExtensionBuilder {
        DurableTaskExtensionBuilder {
            options,
            sink: None,
            converters: ConverterRegistry::builder(),
        }
    }

    pub fn options(&self) -> &DurableTaskOptions {
        &self.options
    }

    pub fn trace_helper(&self) -> &TraceHelper {
        &self.trace
    }

    pub fn converters(&self) -> &ConverterRegistry {
        &self.converters
    }

    pub fn providers(&self) -> Vec<Arc<dyn TriggerBindingProvider>> {
        vec![self.activity_provider.clone(), self.orchestration_provider.clone()]
    }

    /// Start a registry that resolves descriptors through both providers.
    pub fn function_registry(&self) -> FunctionRegistryBuilder {
        FunctionRegistry::builder(self.providers())
    }

    /// Create the shim for one orchestration instance and wire `body` into it.
    ///
    /// The body is invoked once per replay pass with the same context; its
    /// return value becomes the output unless the body set one explicitly.
    pub fn orchestration_shim<F, Fut, Out>(
        &self,
        binding: &Arc<dyn TriggerBinding>,
        instance_id: impl Into<String>,
        body: F,
    ) -> Result<Arc<TaskOrchestrationShim>, Error>
    where
        F: Fn(OrchestrationInvocation) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Out>> + Send + 'static,
        Out: Serialize + Send + 'static,
    {
        if binding.kind() != TriggerKind::Orchestration {
            return Err(Error::configuration(format!(
                "'{}' is not an orchestration function",
                binding.function_name()
            )));
        }
        let invocation = OrchestrationInvocation::new(
            self.options.hub_name.clone(),
            binding.function_name(),
            binding.version().map(str::to_owned),
            instance_id,
        );
        let (ctx, _) = binding
            .bind(TriggerValue::Orchestration(invocation.clone()))?
            .take_value::<OrchestrationInvocation>()?;

        let shim = TaskOrchestrationShim::new(self.trace.clone(), invocation);
        shim.register_callback(Some(orchestration_callback(move || {
            let fut = body(ctx.clone());
            async move {
                let out = fut.await?;
                Ok::<_, anyhow::Error>(Some(serde_json::to_value(&out)?))
            }
        })))?;
        Ok(Arc::new(shim))
    }

    /// Create an activity shim whose body receives the bound parameter as `T`.
    ///
    /// `T` must match the binding's declared parameter type; for an "any"
    /// parameter that is `Arc<ActivityInvocation>`.
    pub fn activity_shim<T, F, Fut, Out>(
        &self,
        binding: &Arc<dyn TriggerBinding>,
        body: F,
    ) -> Result<TaskActivityShim, Error>
    where
        T: Send + 'static,
        F: Fn(T) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<Out>> + Send + 'static,
        Out: Serialize + Send + 'static,
    {
        if binding.kind() != TriggerKind::Activity {
            return Err(Error::configuration(format!(
                "'{}' is not an activity function",
                binding.function_name()
            )));
        }
        // A parameter type mismatch is a wiring error, not a failure of the body.
        let callback: ActivityCallback = Arc::new(move |data: TriggerData| match data.take_value::<T>() {
            Ok((value, _)) => {
                let fut = body(value);
                async move {
                    let out = fut.await.map_err(ExecuteError::Function)?;
                    let value = serde_json::to_value(&out).map_err(|e| Error::serialization(e.to_string()))?;
                    Ok::<_, ExecuteError>(Some(value))
                }
                .boxed()
            }
            Err(e) => future::ready(Err::<Option<serde_json::Value>, _>(ExecuteError::Invocation(e))).boxed(),
        });
        Ok(TaskActivityShim::new(self.trace.clone(), binding.clone(), callback))
    }

    /// Run a registered converter directly, bypassing a binding.
    pub fn convert<S: 'static, D: 'static>(&self, kind: TriggerKind, source: &S) -> Option<Result<D, Error>> {
        let attribute = match kind {
            TriggerKind::Activity => TriggerAttribute::activity(),
            TriggerKind::Orchestration => TriggerAttribute::orchestration(),
        };
        self.converters.convert::<S, D>(kind, source, &attribute)
    }
}

impl std::fmt::Debug for DurableTaskExtension {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableTaskExtension")
            .field("hub_name", &self.options.hub_name)
            .field("converters", &self.converters)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bindings::{ParameterDescriptor, ParameterType};
    use crate::invocation::ActivityInvocation;
    use crate::runtime::TaskActivity;

    trait Greeting {}

    struct Formal;

    impl Greeting for Formal {}

    #[test]
    fn build_validates_options() {
        let err = DurableTaskExtension::builder(DurableTaskOptions::default().with_hub_name("x"))
            .build()
            .unwrap_err();
        assert!(err.is_configuration());
    }

    #[test]
    fn builtin_converter_conflict_fails_build() {
        let err = DurableTaskExtension::builder(DurableTaskOptions::default())
            .register_converter::<ActivityInvocation, String, _>(TriggerKind::Activity, |a, _| {
                Ok(a.raw_input().to_string())
            })
            .build()
            .unwrap_err();
        assert!(err.to_string().contains("duplicate"));
    }

    #[tokio::test]
    async fn custom_converter_binds_boxed_trait_object() {
        let ext = DurableTaskExtension::builder(DurableTaskOptions::default())
            .register_converter::<ActivityInvocation, Box<dyn Greeting + Send>, _>(TriggerKind::Activity, |_, _| {
                Ok(Box::new(Formal) as Box<dyn Greeting + Send>)
            })
            .build()
            .unwrap();
        assert_eq!(ext.converters().len(), 3);

        let registry = ext
            .function_registry()
            .register(ParameterDescriptor::activity(
                "Greet",
                ParameterType::opaque::<Box<dyn Greeting + Send>>(),
            ))
            .build_result()
            .unwrap();
        let binding = registry.activity("Greet").unwrap();
        let shim = ext
            .activity_shim(&binding, |_greeting: Box<dyn Greeting + Send>| async { Ok("greeted") })
            .unwrap();
        let out = shim.run("inst", "[]").await.unwrap();
        assert_eq!(out.as_deref(), Some("\"greeted\""));
    }

    #[tokio::test]
    async fn mismatched_body_type_is_permanent_invocation_error() {
        let ext = DurableTaskExtension::builder(DurableTaskOptions::default()).build().unwrap();
        let registry = ext
            .function_registry()
            .register(ParameterDescriptor::activity("Count", ParameterType::of::<u32>()))
            .build_result()
            .unwrap();
        let binding = registry.activity("Count").unwrap();
        let shim = ext
            .activity_shim(&binding, |text: String| async move { Ok(text) })
            .unwrap();

        let err = shim.run("inst", "[3]").await.unwrap_err();
        let invocation = err.as_invocation().expect("reported as an invocation error");
        assert!(invocation.is_configuration());
        assert!(invocation.is_permanent());
    }

    #[test]
    fn shim_helpers_check_binding_kind() {
        let ext = DurableTaskExtension::builder(DurableTaskOptions::default()).build().unwrap();
        let registry = ext
            .function_registry()
            .register(ParameterDescriptor::activity("Say", ParameterType::any()))
            .build_result()
            .unwrap();
        let binding = registry.activity("Say").unwrap();
        let err = ext
            .orchestration_shim(&binding, "i", |_ctx| async { Ok(()) })
            .unwrap_err();
        assert!(err.is_configuration());

        let raw: String = ext
            .convert::<ActivityInvocation, String>(TriggerKind::Activity, &ActivityInvocation::new("i", "[1]"))
            .unwrap()
            .unwrap();
        assert_eq!(raw, "[1]");
    }
}
