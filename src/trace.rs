//! Function lifecycle trace events.
//!
//! Events are never suppressed during replay. Each one carries the current
//! `is_replaying` flag so a sink can drop the non-authoritative copies.

use std::fmt;
use std::sync::{Arc, Mutex};

use serde::Serialize;
use tracing::{error, info};

use crate::config::DurableTaskOptions;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum TraceEventKind {
    Starting,
    Completed,
    Failed,
    ExternalEventRaised,
}

impl TraceEventKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TraceEventKind::Starting => "starting",
            TraceEventKind::Completed => "completed",
            TraceEventKind::Failed => "failed",
            TraceEventKind::ExternalEventRaised => "externalEventRaised",
        }
    }
}

impl fmt::Display for TraceEventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TraceEvent {
    pub event: TraceEventKind,
    pub hub: String,
    pub function_name: String,
    pub version: Option<String>,
    pub instance_id: String,
    pub payload_preview: String,
    pub is_orchestrator: bool,
    pub is_replaying: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub continued_as_new: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_name: Option<String>,
}

/// Destination for trace events.
pub trait TraceSink: Send + Sync {
    fn emit(&self, event: &TraceEvent);
}

/// Default sink: forwards every event to `tracing`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingTraceSink;

impl TraceSink for TracingTraceSink {
    fn emit(&self, e: &TraceEvent) {
        let version = e.version.as_deref().unwrap_or("");
        match e.event {
            TraceEventKind::Failed => error!(
                target: "durable_functions::trace",
                hub = %e.hub,
                function_name = %e.function_name,
                version = %version,
                instance_id = %e.instance_id,
                is_orchestrator = e.is_orchestrator,
                is_replaying = e.is_replaying,
                error = e.error.as_deref().unwrap_or(""),
                "function failed"
            ),
            kind => info!(
                target: "durable_functions::trace",
                event = kind.as_str(),
                hub = %e.hub,
                function_name = %e.function_name,
                version = %version,
                instance_id = %e.instance_id,
                payload = %e.payload_preview,
                is_orchestrator = e.is_orchestrator,
                is_replaying = e.is_replaying,
                continued_as_new = e.continued_as_new.unwrap_or(false),
                event_name = e.event_name.as_deref().unwrap_or(""),
                "function {kind}"
            ),
        }
    }
}

/// Records events in memory, in emission order.
#[derive(Debug, Default)]
pub struct MemoryTraceSink {
    events: Mutex<Vec<TraceEvent>>,
}

impl MemoryTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<TraceEvent> {
        self.events.lock().expect("Mutex should not be poisoned").clone()
    }

    pub fn count(&self, kind: TraceEventKind) -> usize {
        self.events
            .lock()
            .expect("Mutex should not be poisoned")
            .iter()
            .filter(|e| e.event == kind)
            .count()
    }

    pub fn kinds(&self) -> Vec<TraceEventKind> {
        self.events
            .lock()
            .expect("Mutex should not be poisoned")
            .iter()
            .map(|e| e.event)
            .collect()
    }

    pub fn clear(&self) {
        self.events.lock().expect("Mutex should not be poisoned").clear();
    }
}

impl TraceSink for MemoryTraceSink {
    fn emit(&self, event: &TraceEvent) {
        self.events.lock().expect("Mutex should not be poisoned").push(event.clone());
    }
}

/// Identity of the function a trace event is about.
#[derive(Debug, Clone, Copy)]
pub struct TraceScope<'a> {
    pub function_name: &'a str,
    pub version: Option<&'a str>,
    pub instance_id: &'a str,
    pub is_orchestrator: bool,
}

/// Builds trace events from the host options and hands them to the sink.
#[derive(Clone)]
pub struct TraceHelper {
    options: Arc<DurableTaskOptions>,
    sink: Arc<dyn TraceSink>,
}

impl fmt::Debug for TraceHelper {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TraceHelper").field("hub", &self.options.hub_name).finish()
    }
}

impl TraceHelper {
    pub fn new(options: Arc<DurableTaskOptions>, sink: Arc<dyn TraceSink>) -> Self {
        Self { options, sink }
    }

    pub fn hub_name(&self) -> &str {
        &self.options.hub_name
    }

    fn event(&self, kind: TraceEventKind, scope: &TraceScope<'_>, preview: String, is_replaying: bool) -> TraceEvent {
        TraceEvent {
            event: kind,
            hub: self.options.hub_name.clone(),
            function_name: scope.function_name.to_string(),
            version: scope.version.map(str::to_owned),
            instance_id: scope.instance_id.to_string(),
            payload_preview: preview,
            is_orchestrator: scope.is_orchestrator,
            is_replaying,
            continued_as_new: None,
            error: None,
            event_name: None,
        }
    }

    pub fn function_starting(&self, scope: &TraceScope<'_>, input: Option<&str>, is_replaying: bool) {
        let preview = self.options.input_output_trace(input);
        self.sink
            .emit(&self.event(TraceEventKind::Starting, scope, preview, is_replaying));
    }

    pub fn function_completed(
        &self,
        scope: &TraceScope<'_>,
        output: Option<&str>,
        continued_as_new: bool,
        is_replaying: bool,
    ) {
        let preview = self.options.input_output_trace(output);
        let mut event = self.event(TraceEventKind::Completed, scope, preview, is_replaying);
        event.continued_as_new = Some(continued_as_new);
        self.sink.emit(&event);
    }

    pub fn function_failed(&self, scope: &TraceScope<'_>, error: &str, is_replaying: bool) {
        let mut event = self.event(TraceEventKind::Failed, scope, String::new(), is_replaying);
        event.error = Some(error.to_string());
        self.sink.emit(&event);
    }

    pub fn external_event_raised(
        &self,
        scope: &TraceScope<'_>,
        event_name: &str,
        payload: Option<&str>,
        is_replaying: bool,
    ) {
        let preview = self.options.input_output_trace(payload);
        let mut event = self.event(TraceEventKind::ExternalEventRaised, scope, preview, is_replaying);
        event.event_name = Some(event_name.to_string());
        self.sink.emit(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn helper(sink: Arc<MemoryTraceSink>, trace_payloads: bool) -> TraceHelper {
        let options = DurableTaskOptions::default()
            .with_hub_name("TestHub")
            .with_trace_inputs_and_outputs(trace_payloads);
        TraceHelper::new(Arc::new(options), sink)
    }

    const SCOPE: TraceScope<'static> = TraceScope {
        function_name: "HelloSequence",
        version: Some("1"),
        instance_id: "abc",
        is_orchestrator: true,
    };

    #[test]
    fn events_carry_identity_and_replay_flag() {
        let sink = Arc::new(MemoryTraceSink::new());
        let trace = helper(sink.clone(), true);
        trace.function_starting(&SCOPE, Some("\"in\""), true);
        trace.function_completed(&SCOPE, Some("\"out\""), false, false);

        let events = sink.events();
        assert_eq!(sink.kinds(), vec![TraceEventKind::Starting, TraceEventKind::Completed]);
        assert_eq!(events[0].hub, "TestHub");
        assert_eq!(events[0].payload_preview, "\"in\"");
        assert!(events[0].is_replaying);
        assert_eq!(events[0].continued_as_new, None);
        assert_eq!(events[1].continued_as_new, Some(false));
        assert!(!events[1].is_replaying);
    }

    #[test]
    fn payloads_are_redacted_by_default() {
        let sink = Arc::new(MemoryTraceSink::new());
        let trace = helper(sink.clone(), false);
        trace.external_event_raised(&SCOPE, "go", Some("42"), false);
        let e = &sink.events()[0];
        assert_eq!(e.payload_preview, "(2 bytes)");
        assert_eq!(e.event_name.as_deref(), Some("go"));
    }

    #[test]
    fn serialized_schema() {
        let sink = Arc::new(MemoryTraceSink::new());
        let trace = helper(sink.clone(), true);
        trace.function_failed(&SCOPE, "boom", false);
        let json = serde_json::to_value(&sink.events()[0]).unwrap();
        assert_eq!(json["event"], "failed");
        assert_eq!(json["functionName"], "HelloSequence");
        assert_eq!(json["instanceId"], "abc");
        assert_eq!(json["isOrchestrator"], true);
        assert_eq!(json["error"], "boom");
        assert!(json.get("continuedAsNew").is_none());
        assert_eq!(TraceEventKind::ExternalEventRaised.to_string(), "externalEventRaised");
        assert_eq!(
            serde_json::to_value(TraceEventKind::ExternalEventRaised).unwrap(),
            "externalEventRaised"
        );
    }
}
