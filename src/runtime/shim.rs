use std::fmt;
use std::future::Future;
use std::sync::OnceLock;

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use super::{OrchestrationCallback, TaskOrchestration, orchestration_callback};
use crate::error::{Error, ExecuteError};
use crate::invocation::OrchestrationInvocation;
use crate::trace::{TraceHelper, TraceScope};

/// Marks the invocation completed when a pass settles, including by panic.
///
/// A pass that is dropped while still suspended has not settled; the engine
/// will replay it.
struct CompletionGuard<'a> {
    invocation: &'a OrchestrationInvocation,
    settled: bool,
}

impl<'a> CompletionGuard<'a> {
    fn new(invocation: &'a OrchestrationInvocation) -> Self {
        Self {
            invocation,
            settled: false,
        }
    }

    fn settle(mut self) {
        self.settled = true;
    }
}

impl Drop for CompletionGuard<'_> {
    fn drop(&mut self) {
        if self.settled || std::thread::panicking() {
            self.invocation.mark_completed();
        }
    }
}

/// Adapts one orchestration body to the replay engine's [`TaskOrchestration`].
///
/// Lifecycle: `Created` until a callback is registered, `Running` while a pass
/// is in flight, `Completed` or `Failed` once a pass settles. The invocation
/// outlives individual passes, so state observed by the body (delivered
/// events, output) is shared across replays.
pub struct TaskOrchestrationShim {
    trace: TraceHelper,
    invocation: OrchestrationInvocation,
    callback: OnceLock<OrchestrationCallback>,
}

impl fmt::Debug for TaskOrchestrationShim {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskOrchestrationShim")
            .field("invocation", &self.invocation)
            .field("has_callback", &self.callback.get().is_some())
            .finish()
    }
}

impl TaskOrchestrationShim {
    pub fn new(trace: TraceHelper, invocation: OrchestrationInvocation) -> Self {
        Self {
            trace,
            invocation,
            callback: OnceLock::new(),
        }
    }

    pub fn invocation(&self) -> &OrchestrationInvocation {
        &self.invocation
    }

    /// Bind the body. Registering twice, or registering nothing, is a contract violation.
    pub fn register_callback(&self, callback: Option<OrchestrationCallback>) -> Result<(), Error> {
        if self.callback.get().is_some() {
            return Err(Error::invalid_operation(
                "an orchestration callback has already been registered",
            ));
        }
        let callback = callback.ok_or_else(|| Error::argument_for("callback", "callback must be provided"))?;
        self.callback
            .set(callback)
            .map_err(|_| Error::invalid_operation("an orchestration callback has already been registered"))
    }

    /// Register an async body returning any JSON value.
    pub fn register_fn<F, Fut>(&self, f: F) -> Result<(), Error>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Option<Value>, anyhow::Error>> + Send + 'static,
    {
        self.register_callback(Some(orchestration_callback(f)))
    }

    fn scope(&self) -> TraceScope<'_> {
        TraceScope {
            function_name: self.invocation.name(),
            version: self.invocation.version(),
            instance_id: self.invocation.instance_id(),
            is_orchestrator: true,
        }
    }
}

#[async_trait]
impl TaskOrchestration for TaskOrchestrationShim {
    async fn execute(&self, serialized_input: Option<String>) -> Result<Option<String>, ExecuteError> {
        let Some(callback) = self.callback.get().cloned() else {
            warn!(
                target: "durable_functions::shim",
                instance_id = %self.invocation.instance_id(),
                "execute called before a callback was registered"
            );
            return Err(Error::invalid_operation("no orchestration callback has been registered").into());
        };

        self.invocation.begin_pass(serialized_input.clone());
        self.trace
            .function_starting(&self.scope(), serialized_input.as_deref(), self.invocation.is_replaying());

        let result = {
            let guard = CompletionGuard::new(&self.invocation);
            let result = callback().await;
            guard.settle();
            result
        };

        let returned = match result {
            Ok(v) => v,
            Err(e) => {
                self.trace
                    .function_failed(&self.scope(), &format!("{e:#}"), self.invocation.is_replaying());
                return Err(ExecuteError::Function(e));
            }
        };

        if let Some(value) = returned.filter(|v| !v.is_null()) {
            self.invocation.set_output_if_unset(&value)?;
        }

        let output = self.invocation.serialized_output();
        self.trace.function_completed(
            &self.scope(),
            output.as_deref(),
            self.invocation.continued_as_new(),
            self.invocation.is_replaying(),
        );
        Ok(output)
    }

    fn get_status(&self) -> Option<String> {
        None
    }

    fn raise_event(&self, name: &str, serialized_payload: &str) {
        self.trace.external_event_raised(
            &self.scope(),
            name,
            Some(serialized_payload),
            self.invocation.is_replaying(),
        );
        self.invocation.raise_event(name, serialized_payload);
    }
}
