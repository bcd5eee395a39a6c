use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::task::{Context, Poll, Waker};

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::output::{OutputCell, serialize_output};
use crate::_typed_codec::{Codec, Json};
use crate::error::Error;

#[derive(Debug, Default)]
struct InvocationState {
    input: Option<String>,
    is_replaying: bool,

    continued_as_new: bool,
    continue_as_new_input: Option<String>,

    // Raised but not yet observed by the body
    pending: HashMap<String, VecDeque<String>>,
    // Observed in an earlier pass; served again, in order, while replaying
    delivered: HashMap<String, Vec<String>>,
    replay_cursor: HashMap<String, usize>,
    replay_remaining: usize,

    waiters: Vec<Waker>,
}

impl InvocationState {
    fn begin_pass(&mut self, input: Option<String>) {
        self.input = input;
        self.continued_as_new = false;
        self.continue_as_new_input = None;
        self.replay_cursor.clear();
        self.replay_remaining = self.delivered.values().map(Vec::len).sum();
        self.is_replaying = self.replay_remaining > 0;
    }

    fn next_event(&mut self, name: &str) -> Option<String> {
        let cursor = self.replay_cursor.entry(name.to_string()).or_insert(0);
        if let Some(payload) = self.delivered.get(name).and_then(|d| d.get(*cursor)).cloned() {
            *cursor += 1;
            self.replay_remaining = self.replay_remaining.saturating_sub(1);
            if self.replay_remaining == 0 {
                self.is_replaying = false;
            }
            return Some(payload);
        }

        let payload = self.pending.get_mut(name)?.pop_front()?;
        *cursor += 1;
        self.delivered.entry(name.to_string()).or_default().push(payload.clone());
        self.is_replaying = false;
        Some(payload)
    }
}

struct Shared {
    hub_name: String,
    name: String,
    version: Option<String>,
    instance_id: String,
    output: OutputCell,
    completed: AtomicBool,
    state: Mutex<InvocationState>,
}

/// Per-instance orchestration context handed to the orchestration body.
///
/// One logical context spans every replay pass of an instance: events raised
/// between passes are queued here, observed once by the body, and served
/// again from the delivered log when the body is replayed.
#[derive(Clone)]
pub struct OrchestrationInvocation {
    shared: Arc<Shared>,
}

impl fmt::Debug for OrchestrationInvocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrchestrationInvocation")
            .field("hub_name", &self.shared.hub_name)
            .field("name", &self.shared.name)
            .field("version", &self.shared.version)
            .field("instance_id", &self.shared.instance_id)
            .field("is_completed", &self.is_completed())
            .finish()
    }
}

impl OrchestrationInvocation {
    pub fn new(
        hub_name: impl Into<String>,
        name: impl Into<String>,
        version: Option<String>,
        instance_id: impl Into<String>,
    ) -> Self {
        Self {
            shared: Arc::new(Shared {
                hub_name: hub_name.into(),
                name: name.into(),
                version,
                instance_id: instance_id.into(),
                output: OutputCell::new(),
                completed: AtomicBool::new(false),
                state: Mutex::new(InvocationState::default()),
            }),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, InvocationState> {
        // Mutex lock should never fail in normal operation - if poisoned, it indicates a serious bug
        self.shared.state.lock().expect("Mutex should not be poisoned")
    }

    pub fn hub_name(&self) -> &str {
        &self.shared.hub_name
    }

    pub fn name(&self) -> &str {
        &self.shared.name
    }

    pub fn version(&self) -> Option<&str> {
        self.shared.version.as_deref()
    }

    pub fn instance_id(&self) -> &str {
        &self.shared.instance_id
    }

    /// True while the body is re-executing recorded history instead of making
    /// forward progress. Guard non-idempotent side effects with this flag.
    pub fn is_replaying(&self) -> bool {
        self.lock_state().is_replaying
    }

    /// Engines that track replay state themselves can override the flag.
    pub fn set_is_replaying(&self, replaying: bool) {
        self.lock_state().is_replaying = replaying;
    }

    pub fn is_completed(&self) -> bool {
        self.shared.completed.load(Ordering::Acquire)
    }

    pub(crate) fn mark_completed(&self) {
        self.shared.completed.store(true, Ordering::Release);
    }

    /// Prepare the context for one replay pass.
    pub(crate) fn begin_pass(&self, serialized_input: Option<String>) {
        self.lock_state().begin_pass(serialized_input);
    }

    pub fn raw_input(&self) -> Option<String> {
        self.lock_state().input.clone()
    }

    /// Deserialize the orchestration input; a missing input reads as JSON `null`.
    pub fn get_input<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let raw = self.raw_input();
        Json::decode(raw.as_deref().unwrap_or("null")).map_err(Error::serialization)
    }

    /// Explicitly set the orchestration output. Fails if already set.
    pub fn set_output<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), Error> {
        if self.shared.output.is_set() {
            return Err(Error::invalid_operation(
                "the output has already been set for this orchestration instance",
            ));
        }
        self.shared.output.set(serialize_output(value)?)
    }

    /// Set the output unless something was already written; first write wins.
    pub fn set_output_if_unset<T: Serialize + ?Sized>(&self, value: &T) -> Result<bool, Error> {
        if self.shared.output.is_set() {
            return Ok(false);
        }
        Ok(self.shared.output.set_if_unset(serialize_output(value)?))
    }

    pub fn is_output_set(&self) -> bool {
        self.shared.output.is_set()
    }

    pub fn serialized_output(&self) -> Option<String> {
        self.shared.output.get().map(str::to_owned)
    }

    /// Restart the instance with fresh input once this pass completes.
    pub fn continue_as_new<T: Serialize + ?Sized>(&self, input: &T) -> Result<(), Error> {
        let serialized = serialize_output(input)?;
        let mut state = self.lock_state();
        state.continued_as_new = true;
        state.continue_as_new_input = serialized;
        Ok(())
    }

    pub fn continued_as_new(&self) -> bool {
        self.lock_state().continued_as_new
    }

    pub fn continue_as_new_input(&self) -> Option<String> {
        self.lock_state().continue_as_new_input.clone()
    }

    /// Queue an external event for the body's next suspension point.
    pub fn raise_event(&self, name: impl Into<String>, serialized_payload: impl Into<String>) {
        let waiters = {
            let mut state = self.lock_state();
            state
                .pending
                .entry(name.into())
                .or_default()
                .push_back(serialized_payload.into());
            std::mem::take(&mut state.waiters)
        };
        for w in waiters {
            w.wake();
        }
    }

    /// Wait for the next event with `name`. Resolves immediately for events
    /// already observed in an earlier pass.
    pub fn wait_for_external_event(&self, name: impl Into<String>) -> ExternalEventFuture {
        ExternalEventFuture {
            invocation: self.clone(),
            name: name.into(),
        }
    }

    /// Wait for the next event with `name` and decode its payload.
    pub async fn wait_for_external_event_typed<T: DeserializeOwned>(
        &self,
        name: impl Into<String>,
    ) -> Result<T, Error> {
        let payload = self.wait_for_external_event(name).await;
        Json::decode(&payload).map_err(Error::serialization)
    }

    pub fn pending_event_count(&self, name: &str) -> usize {
        self.lock_state().pending.get(name).map(VecDeque::len).unwrap_or(0)
    }
}

/// Future returned by [`OrchestrationInvocation::wait_for_external_event`].
#[must_use = "futures do nothing unless polled"]
pub struct ExternalEventFuture {
    invocation: OrchestrationInvocation,
    name: String,
}

impl Future for ExternalEventFuture {
    type Output = String;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        let mut state = this.invocation.lock_state();
        if let Some(payload) = state.next_event(&this.name) {
            return Poll::Ready(payload);
        }
        if !state.waiters.iter().any(|w| w.will_wake(cx.waker())) {
            state.waiters.push(cx.waker().clone());
        }
        Poll::Pending
    }
}
