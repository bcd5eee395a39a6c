use std::any::{Any, TypeId, type_name};
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use super::parameter::BoundValue;
use crate::error::Error;
use crate::{TriggerAttribute, TriggerKind};

type ConverterKey = (TypeId, TypeId, TriggerKind);

/// Type-erased conversion from a raw trigger value to a parameter value.
pub type ErasedConverter = Arc<dyn Fn(&dyn Any, &TriggerAttribute) -> Result<BoundValue, Error> + Send + Sync>;

/// Read-only table of (source type, destination type, trigger kind) conversions.
///
/// Built once by the host before any binding is created; shared freely after.
#[derive(Clone, Default)]
pub struct ConverterRegistry {
    inner: Arc<HashMap<ConverterKey, ErasedConverter>>,
}

impl fmt::Debug for ConverterRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConverterRegistry").field("count", &self.inner.len()).finish()
    }
}

impl ConverterRegistry {
    pub fn builder() -> ConverterRegistryBuilder {
        ConverterRegistryBuilder {
            map: HashMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn lookup(&self, source: TypeId, destination: TypeId, kind: TriggerKind) -> Option<ErasedConverter> {
        self.inner.get(&(source, destination, kind)).cloned()
    }

    /// Run the converter for `S -> D` if one is registered.
    pub fn convert<S: 'static, D: 'static>(
        &self,
        kind: TriggerKind,
        source: &S,
        attribute: &TriggerAttribute,
    ) -> Option<Result<D, Error>> {
        let f = self.lookup(TypeId::of::<S>(), TypeId::of::<D>(), kind)?;
        Some(f(source, attribute).and_then(|bound| {
            bound
                .downcast::<D>()
                .map_err(|_| Error::configuration(format!("converter did not produce {}", type_name::<D>())))
        }))
    }

    pub fn contains(&self, source: TypeId, destination: TypeId, kind: TriggerKind) -> bool {
        self.inner.contains_key(&(source, destination, kind))
    }

    pub fn len(&self) -> usize {
        self.inner.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.is_empty()
    }
}

pub struct ConverterRegistryBuilder {
    map: HashMap<ConverterKey, ErasedConverter>,
    errors: Vec<String>,
}

impl ConverterRegistryBuilder {
    /// Register a typed conversion. A second registration for the same key is
    /// recorded as an error and leaves the first converter in place.
    pub fn register<S, D, F>(&mut self, kind: TriggerKind, f: F) -> &mut Self
    where
        S: 'static,
        D: Send + 'static,
        F: Fn(&S, &TriggerAttribute) -> Result<D, Error> + Send + Sync + 'static,
    {
        let key = (TypeId::of::<S>(), TypeId::of::<D>(), kind);
        if self.map.contains_key(&key) {
            self.errors.push(format!(
                "duplicate {kind} converter registration: {} -> {}",
                type_name::<S>(),
                type_name::<D>()
            ));
            return self;
        }
        let erased: ErasedConverter = Arc::new(move |raw: &dyn Any, attribute: &TriggerAttribute| {
            let source = raw.downcast_ref::<S>().ok_or_else(|| {
                Error::configuration(format!("converter expects a {} trigger value", type_name::<S>()))
            })?;
            f(source, attribute).map(BoundValue::new)
        });
        self.map.insert(key, erased);
        self
    }

    pub fn contains<S: 'static, D: 'static>(&self, kind: TriggerKind) -> bool {
        self.map.contains_key(&(TypeId::of::<S>(), TypeId::of::<D>(), kind))
    }

    pub fn build(self) -> ConverterRegistry {
        ConverterRegistry {
            inner: Arc::new(self.map),
        }
    }

    pub fn build_result(self) -> Result<ConverterRegistry, Error> {
        if self.errors.is_empty() {
            Ok(self.build())
        } else {
            Err(Error::configuration(self.errors.join("; ")))
        }
    }
}
