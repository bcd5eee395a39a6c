//! Trigger bindings and a replay-aware execution shim for durable functions.
//!
//! Activity and orchestration functions are registered with an explicit
//! [`ParameterDescriptor`] instead of being discovered from attributes. Every
//! descriptor is resolved once, at host start, into a shared
//! [`TriggerBinding`](bindings::TriggerBinding). Per invocation the binding
//! converts the raw trigger value into the declared parameter type and hands out
//! the named output slots (`$return`, `InstanceId`).
//!
//! Orchestrations are driven by a replay engine that re-executes the function
//! body on every decision pass. [`TaskOrchestrationShim`] sits between that
//! engine and the user body:
//!
//! - stores the pass input and emits `starting` / `completed` / `failed` traces
//!   that always carry the current replay flag
//! - captures the output exactly once (first write wins)
//! - marks the invocation completed on every settled exit path
//! - queues external events so they are observed once across all passes
//!
//! The crate exposes:
//!
//! - Data model: [`TriggerKind`], [`TriggerAttribute`], [`ActivityInvocation`],
//!   [`OrchestrationInvocation`]
//! - Binding layer: converter registry, providers, bindings, return binders
//! - Runtime: [`TaskOrchestrationShim`], [`TaskActivityShim`], the function
//!   registry and a single-pass replay driver
//! - Host wiring: [`DurableTaskExtension`]
use std::fmt;

pub mod bindings;
pub mod config;
pub mod error;
pub mod host;
pub mod invocation;
pub mod observability;
pub mod runtime;
pub mod trace;

pub use bindings::{BindingData, BoundValue, ParameterDescriptor, ParameterType, TriggerData, TriggerValue};
pub use config::DurableTaskOptions;
pub use error::{Error, ExecuteError};
pub use host::{DurableTaskExtension, DurableTaskExtensionBuilder};
pub use invocation::{ActivityInvocation, OrchestrationInvocation, OutputCell};
pub use runtime::{FunctionRegistry, TaskActivityShim, TaskOrchestration, TaskOrchestrationShim};
pub use trace::{MemoryTraceSink, TraceEvent, TraceEventKind, TraceHelper, TraceSink};

/// Reserved output binding holding the function's return value.
pub const RETURN_BINDING: &str = "$return";
/// Reserved read-only binding exposing the orchestration instance id to activities.
pub const INSTANCE_ID_BINDING: &str = "InstanceId";

// Internal codec utilities for typed I/O (kept private; public API stays string based)
mod _typed_codec {
    use serde::{Serialize, de::DeserializeOwned};
    use serde_json::Value;

    pub trait Codec {
        /// Encode a value; a JSON `null` encodes to `None`.
        fn encode<T: Serialize + ?Sized>(v: &T) -> Result<Option<String>, String>;
        fn decode<T: DeserializeOwned>(s: &str) -> Result<T, String>;
    }

    pub struct Json;

    impl Codec for Json {
        fn encode<T: Serialize + ?Sized>(v: &T) -> Result<Option<String>, String> {
            match serde_json::to_value(v) {
                Ok(Value::Null) => Ok(None),
                // Value's Display is the compact form
                Ok(val) => Ok(Some(val.to_string())),
                Err(e) => Err(e.to_string()),
            }
        }

        fn decode<T: DeserializeOwned>(s: &str) -> Result<T, String> {
            match serde_json::from_str::<T>(s) {
                Ok(v) => Ok(v),
                Err(first) => {
                    // Fallback: treat raw text as a JSON string value
                    let val = Value::String(s.to_string());
                    serde_json::from_value(val).map_err(|_| first.to_string())
                }
            }
        }
    }
}

/// The two trigger kinds a durable function parameter can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TriggerKind {
    Activity,
    Orchestration,
}

impl TriggerKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TriggerKind::Activity => "activity",
            TriggerKind::Orchestration => "orchestration",
        }
    }
}

impl fmt::Display for TriggerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Declared trigger of a function parameter.
///
/// `name` overrides the function's own name when present; `version` is an
/// opaque label carried into traces.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TriggerAttribute {
    kind: TriggerKind,
    name: Option<String>,
    version: Option<String>,
}

impl TriggerAttribute {
    pub fn activity() -> Self {
        Self {
            kind: TriggerKind::Activity,
            name: None,
            version: None,
        }
    }

    pub fn orchestration() -> Self {
        Self {
            kind: TriggerKind::Orchestration,
            name: None,
            version: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = Some(version.into());
        self
    }

    pub fn kind(&self) -> TriggerKind {
        self.kind
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn version(&self) -> Option<&str> {
        self.version.as_deref()
    }

    /// Name the binding is registered under: the explicit name, else `function_name`.
    pub fn effective_name<'a>(&'a self, function_name: &'a str) -> &'a str {
        self.name.as_deref().unwrap_or(function_name)
    }
}
