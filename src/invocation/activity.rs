use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::output::{OutputCell, serialize_output};
use crate::error::Error;

/// Parameter data for one activity execution scheduled by a parent orchestration.
///
/// The input arrives exactly as the orchestration's call-activity marshalling
/// produced it: a JSON array holding zero or one parameter.
#[derive(Debug)]
pub struct ActivityInvocation {
    instance_id: String,
    serialized_input: String,
    output: OutputCell,
}

impl ActivityInvocation {
    pub fn new(instance_id: impl Into<String>, serialized_input: impl Into<String>) -> Self {
        Self {
            instance_id: instance_id.into(),
            serialized_input: serialized_input.into(),
            output: OutputCell::new(),
        }
    }

    /// Instance id of the orchestration that scheduled this activity.
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// The raw JSON input, unparsed.
    pub fn raw_input(&self) -> &str {
        &self.serialized_input
    }

    /// The input parsed as a JSON token.
    pub fn input_as_json(&self) -> Result<Value, Error> {
        serde_json::from_str(&self.serialized_input)
            .map_err(|e| Error::argument(format!("activity input is not valid JSON: {e}")))
    }

    /// Deserialize the single activity parameter.
    ///
    /// An empty parameter array yields `T::default()`; more than one parameter
    /// is a signature mismatch.
    pub fn get_input<T: DeserializeOwned + Default>(&self) -> Result<T, Error> {
        parse_activity_input(&self.serialized_input)
    }

    /// Set the activity output. Fails if an output was already set.
    pub fn set_output<T: Serialize + ?Sized>(&self, value: &T) -> Result<(), Error> {
        if self.output.is_set() {
            return Err(Error::invalid_operation(
                "the output has already been set for this activity instance",
            ));
        }
        self.output.set(serialize_output(value)?)
    }

    pub fn is_output_set(&self) -> bool {
        self.output.is_set()
    }

    /// The serialized output reported back to the orchestration engine.
    pub fn serialized_output(&self) -> Option<String> {
        self.output.get().map(str::to_owned)
    }
}

pub(crate) fn parse_activity_input<T: DeserializeOwned + Default>(raw: &str) -> Result<T, Error> {
    let token: Value = serde_json::from_str(raw)
        .map_err(|e| Error::argument(format!("activity input is not valid JSON: {e}")))?;
    let Value::Array(mut parameters) = token else {
        return Err(Error::argument("activity input must be a JSON array of parameters"));
    };
    if parameters.len() > 1 {
        return Err(Error::argument(
            "Activity implementation cannot be invoked due to more than expected input parameters. Signature mismatch.",
        ));
    }
    match parameters.pop() {
        None => Ok(T::default()),
        Some(value) if is_scalar(&value) => scalar_to(value),
        Some(value) => serde_json::from_value(value).map_err(|e| Error::serialization(e.to_string())),
    }
}

fn is_scalar(value: &Value) -> bool {
    !matches!(value, Value::Object(_) | Value::Array(_))
}

// Scalars convert leniently: numbers and booleans into strings, numeric
// strings into numbers, null into the default value.
fn scalar_to<T: DeserializeOwned + Default>(value: Value) -> Result<T, Error> {
    let first = match serde_json::from_value::<T>(value.clone()) {
        Ok(v) => return Ok(v),
        Err(e) => e,
    };
    let retry = match &value {
        Value::Null => return Ok(T::default()),
        Value::Number(_) | Value::Bool(_) => Some(Value::String(value.to_string())),
        Value::String(s) => serde_json::from_str::<Value>(s).ok(),
        Value::Object(_) | Value::Array(_) => None,
    };
    retry
        .and_then(|alt| serde_json::from_value::<T>(alt).ok())
        .ok_or_else(|| Error::serialization(format!("cannot convert {value} to the requested type: {first}")))
}
