use std::sync::OnceLock;

use serde::Serialize;

use crate::_typed_codec::{Codec, Json};
use crate::error::Error;

/// Write-once holder for an invocation's serialized output.
///
/// The cell is either unset or set; `Unset -> Set` is the only legal
/// transition. Setting `None` (a JSON `null`) still counts as set.
#[derive(Debug, Default)]
pub struct OutputCell {
    state: OnceLock<Option<String>>,
}

impl OutputCell {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store the serialized output, failing if the cell was already set.
    pub fn set(&self, serialized: Option<String>) -> Result<(), Error> {
        self.state
            .set(serialized)
            .map_err(|_| Error::invalid_operation("the output has already been set for this invocation"))
    }

    /// Store the serialized output unless the cell is already set. Returns
    /// whether this call performed the write.
    pub fn set_if_unset(&self, serialized: Option<String>) -> bool {
        self.state.set(serialized).is_ok()
    }

    pub fn is_set(&self) -> bool {
        self.state.get().is_some()
    }

    /// The serialized output, or `None` when unset or set to `null`.
    pub fn get(&self) -> Option<&str> {
        self.state.get().and_then(|s| s.as_deref())
    }
}

/// Serialize an output value: JSON tokens keep their compact text, `null` maps to `None`.
pub(crate) fn serialize_output<T: Serialize + ?Sized>(value: &T) -> Result<Option<String>, Error> {
    Json::encode(value).map_err(Error::serialization)
}
