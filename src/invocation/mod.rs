//! Per-invocation value holders passed to activity and orchestration bodies.

pub mod activity;
pub mod orchestration;
pub mod output;

pub use activity::ActivityInvocation;
pub use orchestration::{ExternalEventFuture, OrchestrationInvocation};
pub use output::OutputCell;
