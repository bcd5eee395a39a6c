use std::collections::HashMap;
use std::sync::Arc;

use tracing::debug;

use crate::TriggerKind;
use crate::bindings::{ParameterDescriptor, TriggerBinding, TriggerBindingProvider};
use crate::error::Error;

/// Immutable map from (trigger kind, function name) to the function's binding.
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    pub(crate) inner: Arc<HashMap<(TriggerKind, String), Arc<dyn TriggerBinding>>>,
}

impl FunctionRegistry {
    pub fn builder(providers: Vec<Arc<dyn TriggerBindingProvider>>) -> FunctionRegistryBuilder {
        FunctionRegistryBuilder {
            providers,
            map: HashMap::new(),
            errors: Vec::new(),
        }
    }

    pub fn get(&self, kind: TriggerKind, name: &str) -> Option<Arc<dyn TriggerBinding>> {
        let found = self.inner.get(&(kind, name.to_string())).cloned();
        if found.is_none() {
            log_registry_miss(kind, name);
        }
        found
    }

    pub fn activity(&self, name: &str) -> Option<Arc<dyn TriggerBinding>> {
        self.get(TriggerKind::Activity, name)
    }

    pub fn orchestration(&self, name: &str) -> Option<Arc<dyn TriggerBinding>> {
        self.get(TriggerKind::Orchestration, name)
    }

    pub fn has(&self, kind: TriggerKind, name: &str) -> bool {
        self.inner.contains_key(&(kind, name.to_string()))
    }

    /// Registered names of one kind, sorted.
    pub fn list_names(&self, kind: TriggerKind) -> Vec<String> {
        let mut names: Vec<String> = self
            .inner
            .keys()
            .filter(|(k, _)| *k == kind)
            .map(|(_, n)| n.clone())
            .collect();
        names.sort();
        names
    }

    pub fn count(&self) -> usize {
        self.inner.len()
    }
}

fn log_registry_miss(kind: TriggerKind, name: &str) {
    debug!(
        target: "durable_functions::registry",
        kind = %kind,
        name = %name,
        "function not found in registry"
    );
}

pub struct FunctionRegistryBuilder {
    providers: Vec<Arc<dyn TriggerBindingProvider>>,
    map: HashMap<(TriggerKind, String), Arc<dyn TriggerBinding>>,
    errors: Vec<String>,
}

impl FunctionRegistryBuilder {
    /// Resolve `descriptor` through every provider. The first provider that
    /// claims it wins; provider errors, unclaimed descriptors and duplicate
    /// names are collected and reported by [`build_result`](Self::build_result).
    pub fn register(mut self, descriptor: ParameterDescriptor) -> Self {
        let mut claimed = None;
        for provider in &self.providers {
            match provider.try_create(&descriptor) {
                Ok(Some(binding)) => {
                    claimed = Some(binding);
                    break;
                }
                Ok(None) => {}
                Err(e) => {
                    self.errors
                        .push(format!("{}.{}: {e}", descriptor.function_name, descriptor.parameter_name));
                    return self;
                }
            }
        }

        let Some(binding) = claimed else {
            self.errors.push(format!(
                "{}.{}: no trigger binding provider claimed this parameter",
                descriptor.function_name, descriptor.parameter_name
            ));
            return self;
        };

        let key = (binding.kind(), binding.function_name().to_string());
        if self.map.contains_key(&key) {
            self.errors
                .push(format!("duplicate {} function registration: {}", key.0, key.1));
            return self;
        }
        self.map.insert(key, binding);
        self
    }

    pub fn build(self) -> FunctionRegistry {
        FunctionRegistry {
            inner: Arc::new(self.map),
        }
    }

    pub fn build_result(self) -> Result<FunctionRegistry, Error> {
        if self.errors.is_empty() {
            Ok(self.build())
        } else {
            Err(Error::configuration(self.errors.join("; ")))
        }
    }
}
