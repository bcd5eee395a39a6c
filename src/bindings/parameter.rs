use std::any::{Any, TypeId, type_name};
use std::fmt;

use serde::de::DeserializeOwned;

use crate::TriggerAttribute;
use crate::error::Error;
use crate::invocation::{ActivityInvocation, OrchestrationInvocation};

/// Marker for the fully generic "any" parameter type.
#[derive(Debug, Clone, Copy)]
pub struct AnyValue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeShape {
    /// Fully generic; receives the raw trigger value unchanged.
    Any,
    /// Concrete type that can be built directly from the serialized input.
    Concrete,
    /// Trait object or other abstract type; needs a registered converter.
    Abstract,
}

type InputDeserializer = fn(&ActivityInvocation) -> Result<BoundValue, Error>;

/// Declared type of a bound parameter.
///
/// Replaces runtime reflection over the function signature: the descriptor
/// carries the type's identity, its shape and, for deserializable types, the
/// monomorphized input-deserialization path.
#[derive(Clone, Copy)]
pub struct ParameterType {
    id: TypeId,
    name: &'static str,
    shape: TypeShape,
    deserializer: Option<InputDeserializer>,
}

impl fmt::Debug for ParameterType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ParameterType")
            .field("name", &self.name)
            .field("shape", &self.shape)
            .finish()
    }
}

impl PartialEq for ParameterType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ParameterType {}

fn deserialize_input<T: DeserializeOwned + Default + Send + 'static>(
    invocation: &ActivityInvocation,
) -> Result<BoundValue, Error> {
    invocation.get_input::<T>().map(BoundValue::new)
}

impl ParameterType {
    pub fn any() -> Self {
        Self {
            id: TypeId::of::<AnyValue>(),
            name: "any",
            shape: TypeShape::Any,
            deserializer: None,
        }
    }

    /// A concrete type deserialized from the activity input when no converter applies.
    pub fn of<T: DeserializeOwned + Default + Send + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            shape: TypeShape::Concrete,
            deserializer: Some(deserialize_input::<T>),
        }
    }

    /// A concrete type with no input-deserialization path (converter only).
    pub fn opaque<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            shape: TypeShape::Concrete,
            deserializer: None,
        }
    }

    /// An abstract type such as `dyn Trait`.
    pub fn of_abstract<T: ?Sized + 'static>() -> Self {
        Self {
            id: TypeId::of::<T>(),
            name: type_name::<T>(),
            shape: TypeShape::Abstract,
            deserializer: None,
        }
    }

    pub fn orchestration_context() -> Self {
        Self::opaque::<OrchestrationInvocation>()
    }

    pub fn type_id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn shape(&self) -> TypeShape {
        self.shape
    }

    pub fn is_any(&self) -> bool {
        self.shape == TypeShape::Any
    }

    pub fn is<T: ?Sized + 'static>(&self) -> bool {
        self.id == TypeId::of::<T>()
    }

    pub(crate) fn deserialize(&self, invocation: &ActivityInvocation) -> Option<Result<BoundValue, Error>> {
        self.deserializer.map(|f| f(invocation))
    }
}

/// A type-erased parameter value produced by `bind`.
pub struct BoundValue(Box<dyn Any + Send>);

impl fmt::Debug for BoundValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BoundValue(..)")
    }
}

impl BoundValue {
    pub fn new<T: Send + 'static>(value: T) -> Self {
        Self(Box::new(value))
    }

    pub fn is<T: 'static>(&self) -> bool {
        self.0.is::<T>()
    }

    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.0.downcast_ref()
    }

    /// Take the value out as `T`, handing it back unchanged on a type mismatch.
    pub fn downcast<T: 'static>(self) -> Result<T, Self> {
        self.0.downcast::<T>().map(|b| *b).map_err(Self)
    }
}

/// Explicit registration record for one function parameter.
#[derive(Debug, Clone)]
pub struct ParameterDescriptor {
    pub function_name: String,
    pub parameter_name: String,
    pub parameter_type: ParameterType,
    pub trigger: Option<TriggerAttribute>,
}

impl ParameterDescriptor {
    pub fn new(
        function_name: impl Into<String>,
        parameter_name: impl Into<String>,
        parameter_type: ParameterType,
    ) -> Self {
        Self {
            function_name: function_name.into(),
            parameter_name: parameter_name.into(),
            parameter_type,
            trigger: None,
        }
    }

    /// Activity trigger parameter of type `ty`.
    pub fn activity(function_name: impl Into<String>, ty: ParameterType) -> Self {
        Self::new(function_name, "input", ty).with_trigger(TriggerAttribute::activity())
    }

    /// Orchestration trigger parameter of the context type.
    pub fn orchestration(function_name: impl Into<String>) -> Self {
        Self::new(function_name, "context", ParameterType::orchestration_context())
            .with_trigger(TriggerAttribute::orchestration())
    }

    pub fn with_trigger(mut self, trigger: TriggerAttribute) -> Self {
        self.trigger = Some(trigger);
        self
    }

    pub fn with_parameter_name(mut self, name: impl Into<String>) -> Self {
        self.parameter_name = name.into();
        self
    }

    /// Registered name of the bound function.
    pub fn effective_name(&self) -> Option<&str> {
        self.trigger.as_ref().map(|t| t.effective_name(&self.function_name))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TriggerKind;

    trait Shape {}

    #[test]
    fn shapes() {
        assert!(ParameterType::any().is_any());
        assert_eq!(ParameterType::of::<String>().shape(), TypeShape::Concrete);
        assert_eq!(ParameterType::of_abstract::<dyn Shape>().shape(), TypeShape::Abstract);
        assert!(ParameterType::of_abstract::<dyn Shape>().name().contains("Shape"));
        assert!(ParameterType::orchestration_context().is::<OrchestrationInvocation>());
    }

    #[test]
    fn concrete_type_deserializes_input() {
        let invocation = ActivityInvocation::new("i", "[5]");
        let value = ParameterType::of::<u64>().deserialize(&invocation).unwrap().unwrap();
        assert_eq!(value.downcast::<u64>().unwrap(), 5);
        assert!(ParameterType::opaque::<u64>().deserialize(&invocation).is_none());
    }

    #[test]
    fn bound_value_downcast_mismatch_returns_value() {
        let value = BoundValue::new(String::from("x"));
        let value = value.downcast::<u32>().unwrap_err();
        assert_eq!(value.downcast_ref::<String>().map(String::as_str), Some("x"));
    }

    #[test]
    fn descriptor_effective_name() {
        let d = ParameterDescriptor::activity("SayHello", ParameterType::of::<String>());
        assert_eq!(d.effective_name(), Some("SayHello"));
        assert_eq!(d.trigger.as_ref().map(|t| t.kind()), Some(TriggerKind::Activity));

        let d = ParameterDescriptor::orchestration("Run")
            .with_trigger(TriggerAttribute::orchestration().with_name("HelloSequence"));
        assert_eq!(d.effective_name(), Some("HelloSequence"));

        let d = ParameterDescriptor::new("Plain", "x", ParameterType::any());
        assert_eq!(d.effective_name(), None);
    }
}
