//! Trigger binding resolution.
//!
//! Providers turn a [`ParameterDescriptor`] into a shared [`TriggerBinding`]
//! once, at registration. Each invocation then calls [`TriggerBinding::bind`]
//! to convert the raw trigger value into the declared parameter type and to
//! obtain the named output slots.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use crate::error::Error;
use crate::invocation::{ActivityInvocation, OrchestrationInvocation};
use crate::{INSTANCE_ID_BINDING, RETURN_BINDING, TriggerKind};

pub mod activity;
pub mod converters;
pub mod orchestration;
pub mod parameter;

pub use activity::{ActivityReturnValueBinder, ActivityTriggerBinding, ActivityTriggerBindingProvider};
pub use converters::{ConverterRegistry, ConverterRegistryBuilder, ErasedConverter};
pub use orchestration::{
    OrchestrationReturnValueBinder, OrchestrationTriggerBinding, OrchestrationTriggerBindingProvider,
};
pub use parameter::{AnyValue, BoundValue, ParameterDescriptor, ParameterType, TypeShape};

/// Raw value delivered by the dispatcher for one invocation.
#[derive(Debug, Clone)]
pub enum TriggerValue {
    Activity(Arc<ActivityInvocation>),
    Orchestration(OrchestrationInvocation),
}

impl TriggerValue {
    pub fn kind(&self) -> TriggerKind {
        match self {
            TriggerValue::Activity(_) => TriggerKind::Activity,
            TriggerValue::Orchestration(_) => TriggerKind::Orchestration,
        }
    }
}

/// Declared type of a named binding slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContractType {
    Any,
    String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Access {
    ReadOnly,
    WriteOnly,
}

/// Fixed set of named slots a binding exposes besides the trigger parameter.
///
/// Names are matched case-insensitively.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BindingContract {
    entries: BTreeMap<String, (String, ContractType, Access)>,
}

impl BindingContract {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: &str, ty: ContractType, access: Access) -> Self {
        self.entries
            .insert(name.to_ascii_lowercase(), (name.to_string(), ty, access));
        self
    }

    pub fn get(&self, name: &str) -> Option<(ContractType, Access)> {
        self.entries
            .get(&name.to_ascii_lowercase())
            .map(|(_, ty, access)| (*ty, *access))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(&name.to_ascii_lowercase())
    }

    /// Declared slot names in their original casing.
    pub fn names(&self) -> Vec<&str> {
        self.entries.values().map(|(n, _, _)| n.as_str()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Write-only sink behind a named output slot.
pub trait ValueBinder: Send + Sync {
    fn value_type(&self) -> ContractType {
        ContractType::Any
    }

    /// Output slots are never read back.
    fn read(&self) -> Result<Value, Error> {
        Err(Error::not_implemented("this binder should only be used for setting return values"))
    }

    fn write(&self, value: &Value) -> Result<(), Error>;

    /// Current serialized output for diagnostics.
    fn to_display_string(&self) -> Option<String>;
}

#[derive(Clone)]
pub enum BindingValue {
    Text(String),
    Binder(Arc<dyn ValueBinder>),
}

impl fmt::Debug for BindingValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BindingValue::Text(s) => f.debug_tuple("Text").field(s).finish(),
            BindingValue::Binder(b) => f.debug_tuple("Binder").field(&b.to_display_string()).finish(),
        }
    }
}

/// Named values produced by `bind`, keyed case-insensitively.
#[derive(Debug, Clone, Default)]
pub struct BindingData {
    entries: BTreeMap<String, BindingValue>,
}

impl BindingData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: &str, value: BindingValue) {
        self.entries.insert(name.to_ascii_lowercase(), value);
    }

    pub fn get(&self, name: &str) -> Option<&BindingValue> {
        self.entries.get(&name.to_ascii_lowercase())
    }

    pub fn text(&self, name: &str) -> Option<&str> {
        match self.get(name)? {
            BindingValue::Text(s) => Some(s),
            BindingValue::Binder(_) => None,
        }
    }

    pub fn binder(&self, name: &str) -> Option<Arc<dyn ValueBinder>> {
        match self.get(name)? {
            BindingValue::Binder(b) => Some(b.clone()),
            BindingValue::Text(_) => None,
        }
    }

    pub fn instance_id(&self) -> Option<&str> {
        self.text(INSTANCE_ID_BINDING)
    }

    pub fn return_binder(&self) -> Option<Arc<dyn ValueBinder>> {
        self.binder(RETURN_BINDING)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Result of binding one invocation: the parameter value plus named slots.
#[derive(Debug)]
pub struct TriggerData {
    pub value: BoundValue,
    pub binding_data: BindingData,
}

impl TriggerData {
    /// Take the parameter value as `T`.
    pub fn take_value<T: 'static>(self) -> Result<(T, BindingData), Error> {
        let TriggerData { value, binding_data } = self;
        match value.downcast::<T>() {
            Ok(v) => Ok((v, binding_data)),
            Err(_) => Err(Error::configuration(format!(
                "bound parameter is not a {}",
                std::any::type_name::<T>()
            ))),
        }
    }
}

/// Per-function binding, shared by every invocation of that function.
pub trait TriggerBinding: Send + Sync {
    fn kind(&self) -> TriggerKind;

    /// Resolved function name (explicit attribute name or declaring function name).
    fn function_name(&self) -> &str;

    fn version(&self) -> Option<&str>;

    /// Name of the raw trigger value type this binding accepts.
    fn trigger_value_type(&self) -> &'static str;

    fn binding_data_contract(&self) -> &BindingContract;

    fn parameter(&self) -> &ParameterDescriptor;

    fn bind(&self, value: TriggerValue) -> Result<TriggerData, Error>;
}

/// Resolves parameter descriptors of one trigger kind into bindings.
pub trait TriggerBindingProvider: Send + Sync {
    fn kind(&self) -> TriggerKind;

    /// `Ok(None)` when the descriptor carries no trigger of this provider's kind.
    fn try_create(&self, descriptor: &ParameterDescriptor) -> Result<Option<Arc<dyn TriggerBinding>>, Error>;
}
