//! Shared fixtures for integration tests.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use durable_functions::bindings::{ParameterDescriptor, ParameterType, TriggerBinding};
use durable_functions::{DurableTaskExtension, DurableTaskOptions, FunctionRegistry, MemoryTraceSink};
use tracing::field::{Field, Visit};
use tracing::{Dispatch, Event as TracingEvent, Level, Subscriber, dispatcher};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::layer::{Context as LayerContext, Layer};
use tracing_subscriber::prelude::*;

pub const HUB: &str = "TestHub";

/// Extension wired to an in-memory trace sink with payload tracing on.
pub fn extension() -> (DurableTaskExtension, Arc<MemoryTraceSink>) {
    let sink = Arc::new(MemoryTraceSink::new());
    let options = DurableTaskOptions::default()
        .with_hub_name(HUB)
        .with_trace_inputs_and_outputs(true);
    let ext = DurableTaskExtension::builder(options)
        .trace_sink(sink.clone())
        .build()
        .expect("extension builds");
    (ext, sink)
}

/// Registry with one orchestration and a few activities of different parameter types.
pub fn registry(ext: &DurableTaskExtension) -> FunctionRegistry {
    ext.function_registry()
        .register(ParameterDescriptor::orchestration("HelloSequence"))
        .register(ParameterDescriptor::activity("SayHello", ParameterType::any()))
        .register(ParameterDescriptor::activity("RawInput", ParameterType::of::<String>()))
        .register(ParameterDescriptor::activity("Count", ParameterType::of::<u32>()))
        .build_result()
        .expect("registry builds")
}

pub fn orchestration_binding(ext: &DurableTaskExtension) -> Arc<dyn TriggerBinding> {
    registry(ext).orchestration("HelloSequence").expect("registered")
}

#[derive(Debug, Clone)]
pub struct CapturedEvent {
    pub level: Level,
    pub target: String,
    pub message: String,
    pub fields: BTreeMap<String, String>,
}

impl CapturedEvent {
    /// Get a field value with surrounding quotes stripped.
    pub fn field(&self, key: &str) -> Option<String> {
        self.fields.get(key).map(|v| v.trim_matches('"').to_string())
    }
}

struct CaptureLayer {
    events: Arc<Mutex<Vec<CapturedEvent>>>,
}

struct FieldCapture<'a> {
    fields: &'a mut BTreeMap<String, String>,
}

impl Visit for FieldCapture<'_> {
    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields.insert(field.name().to_string(), value.to_string());
    }
    fn record_bool(&mut self, field: &Field, value: bool) {
        self.fields.insert(field.name().to_string(), value.to_string());
    }
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.fields.insert(field.name().to_string(), format!("{value:?}"));
    }
}

impl<S: Subscriber> Layer<S> for CaptureLayer {
    fn on_event(&self, event: &TracingEvent<'_>, _ctx: LayerContext<'_, S>) {
        let mut fields = BTreeMap::new();
        event.record(&mut FieldCapture { fields: &mut fields });
        let meta = event.metadata();
        let message = fields.get("message").cloned().unwrap_or_default();
        self.events.lock().unwrap().push(CapturedEvent {
            level: *meta.level(),
            target: meta.target().to_string(),
            message,
            fields,
        });
    }
}

/// Install a thread-local subscriber that captures all events until the guard drops.
pub fn install_tracing_capture() -> (Arc<Mutex<Vec<CapturedEvent>>>, dispatcher::DefaultGuard) {
    let captured = Arc::new(Mutex::new(Vec::new()));
    let collector = tracing_subscriber::registry()
        .with(CaptureLayer {
            events: captured.clone(),
        })
        .with(LevelFilter::TRACE);
    let guard = dispatcher::set_default(&Dispatch::new(collector));
    (captured, guard)
}
