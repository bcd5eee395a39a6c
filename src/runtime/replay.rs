use std::task::{Context, Poll};

use futures::task::noop_waker_ref;
use tracing::debug;

use super::TaskOrchestration;
use crate::error::ExecuteError;

/// Result of polling one `execute` pass.
#[derive(Debug)]
pub enum PassOutcome {
    Completed(Option<String>),
    Failed(ExecuteError),
    /// The body is waiting on something not yet delivered.
    Suspended,
}

impl PassOutcome {
    pub fn is_suspended(&self) -> bool {
        matches!(self, PassOutcome::Suspended)
    }
}

/// Poll a single replay pass once. A pass that cannot finish is dropped; the
/// next pass replays the body from the start.
pub fn run_pass(orchestration: &dyn TaskOrchestration, serialized_input: Option<String>) -> PassOutcome {
    let mut fut = orchestration.execute(serialized_input);
    let mut cx = Context::from_waker(noop_waker_ref());
    match fut.as_mut().poll(&mut cx) {
        Poll::Ready(Ok(output)) => PassOutcome::Completed(output),
        Poll::Ready(Err(e)) => PassOutcome::Failed(e),
        Poll::Pending => PassOutcome::Suspended,
    }
}

/// Helper for single-threaded, host-driven execution in tests and samples.
pub struct Executor;

impl Executor {
    /// Alternate replay passes with `feed` until the orchestration settles or
    /// `max_passes` is reached. `feed` receives the zero-based index of the
    /// pass that just suspended and is expected to deliver events.
    ///
    /// Returns the final outcome and the number of passes run.
    pub fn drive_to_completion<X>(
        orchestration: &dyn TaskOrchestration,
        serialized_input: Option<String>,
        max_passes: usize,
        mut feed: X,
    ) -> (PassOutcome, usize)
    where
        X: FnMut(usize),
    {
        let mut last = PassOutcome::Suspended;
        for pass in 0..max_passes {
            last = run_pass(orchestration, serialized_input.clone());
            if !last.is_suspended() {
                return (last, pass + 1);
            }
            debug!(target: "durable_functions::replay", pass, "orchestration suspended");
            feed(pass);
        }
        (last, max_passes)
    }
}
