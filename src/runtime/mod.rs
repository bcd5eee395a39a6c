//! Engine-facing execution layer.
//!
//! The replay engine only ever sees [`TaskOrchestration`] and [`TaskActivity`].
//! The shims implement them on top of user callbacks, the registry resolves
//! descriptors into bindings, and [`replay`] polls single passes for hosts that
//! drive orchestrations themselves.

use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::sync::Arc;

use crate::bindings::TriggerData;
use crate::error::ExecuteError;

pub mod activity_shim;
pub mod registry;
pub mod replay;
pub mod shim;

pub use activity_shim::TaskActivityShim;
pub use registry::{FunctionRegistry, FunctionRegistryBuilder};
pub use replay::{Executor, PassOutcome, run_pass};
pub use shim::TaskOrchestrationShim;

/// Orchestration body as the shim sees it: produce one pass's result.
pub type OrchestrationCallback =
    Arc<dyn Fn() -> BoxFuture<'static, Result<Option<Value>, anyhow::Error>> + Send + Sync>;

/// Activity body: consume the bound trigger data, return the result value.
pub type ActivityCallback =
    Arc<dyn Fn(TriggerData) -> BoxFuture<'static, Result<Option<Value>, ExecuteError>> + Send + Sync>;

/// Wrap an async closure as an [`OrchestrationCallback`].
pub fn orchestration_callback<F, Fut>(f: F) -> OrchestrationCallback
where
    F: Fn() -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Value>, anyhow::Error>> + Send + 'static,
{
    Arc::new(move || f().boxed())
}

/// Wrap an async closure as an [`ActivityCallback`]. Its errors are reported
/// as function failures.
pub fn activity_callback<F, Fut>(f: F) -> ActivityCallback
where
    F: Fn(TriggerData) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Option<Value>, anyhow::Error>> + Send + 'static,
{
    Arc::new(move |data| f(data).map(|r| r.map_err(ExecuteError::Function)).boxed())
}

/// Interface the replay engine drives for one orchestration instance.
#[async_trait]
pub trait TaskOrchestration: Send + Sync {
    /// Run one replay pass. Completes with the serialized output, or stays
    /// pending while the body waits on something not yet in history.
    async fn execute(&self, serialized_input: Option<String>) -> Result<Option<String>, ExecuteError>;

    /// Custom status channel; not modeled.
    fn get_status(&self) -> Option<String>;

    /// Deliver an external event. Safe between and during passes.
    fn raise_event(&self, name: &str, serialized_payload: &str);
}

/// Interface the dispatcher drives for one activity work item.
#[async_trait]
pub trait TaskActivity: Send + Sync {
    async fn run(&self, instance_id: &str, serialized_input: &str) -> Result<Option<String>, ExecuteError>;
}
