use serde::Deserialize;

use crate::error::Error;
use crate::observability::ObservabilityConfig;

pub const DEFAULT_HUB_NAME: &str = "DurableFunctionsHub";
const DEFAULT_MAX_TRACE_PAYLOAD_CHARS: usize = 1024;

/// Extension options, read from the `durableTask` section of a host document.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DurableTaskOptions {
    /// Task hub name stamped on every trace event.
    pub hub_name: String,
    /// Include raw inputs and outputs in traces. When off, payloads are
    /// redacted to their size.
    pub trace_inputs_and_outputs: bool,
    pub max_trace_payload_chars: usize,
    pub logging: ObservabilityConfig,
}

impl Default for DurableTaskOptions {
    fn default() -> Self {
        Self {
            hub_name: DEFAULT_HUB_NAME.to_string(),
            trace_inputs_and_outputs: false,
            max_trace_payload_chars: DEFAULT_MAX_TRACE_PAYLOAD_CHARS,
            logging: ObservabilityConfig::default(),
        }
    }
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct HostSection {
    durable_task: DurableTaskOptions,
}

impl DurableTaskOptions {
    /// Parse options from JSON. Accepts the options object itself or a
    /// document wrapping it under `durableTask`.
    pub fn from_json_str(json: &str) -> Result<Self, Error> {
        let value: serde_json::Value =
            serde_json::from_str(json).map_err(|e| Error::configuration(format!("invalid options document: {e}")))?;
        let parsed = if value.get("durableTask").is_some() {
            serde_json::from_value::<HostSection>(value).map(|s| s.durable_task)
        } else {
            serde_json::from_value::<DurableTaskOptions>(value)
        };
        parsed.map_err(|e| Error::configuration(format!("invalid durableTask options: {e}")))
    }

    pub fn with_hub_name(mut self, hub_name: impl Into<String>) -> Self {
        self.hub_name = hub_name.into();
        self
    }

    pub fn with_trace_inputs_and_outputs(mut self, enabled: bool) -> Self {
        self.trace_inputs_and_outputs = enabled;
        self
    }

    pub fn validate(&self) -> Result<(), Error> {
        let name = &self.hub_name;
        if !(3..=45).contains(&name.len()) {
            return Err(Error::configuration(format!(
                "hub name '{name}' must be between 3 and 45 characters"
            )));
        }
        if !name.starts_with(|c: char| c.is_ascii_alphabetic()) {
            return Err(Error::configuration(format!("hub name '{name}' must start with a letter")));
        }
        if !name.chars().all(|c| c.is_ascii_alphanumeric()) {
            return Err(Error::configuration(format!(
                "hub name '{name}' may only contain letters and digits"
            )));
        }
        if self.max_trace_payload_chars == 0 {
            return Err(Error::configuration("maxTracePayloadChars must be greater than zero"));
        }
        Ok(())
    }

    /// Payload text as it appears in trace events.
    pub fn input_output_trace(&self, payload: Option<&str>) -> String {
        match payload {
            None => "(null)".to_string(),
            Some(p) if !self.trace_inputs_and_outputs => format!("({} bytes)", p.len()),
            Some(p) => truncate(p, self.max_trace_payload_chars),
        }
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    match s.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &s[..idx]),
        None => s.to_string(),
    }
}
