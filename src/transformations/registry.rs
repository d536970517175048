//! Storage transformer registration.
//!
//! The registry maps contract addresses to their storage transformer. It is
//! built once at startup and only read afterwards.

use std::collections::HashMap;
use std::sync::Arc;

use alloy_primitives::Address;

use super::traits::{StorageTransformer, StorageTransformerInitializer, TransformerDeps};

pub struct StorageTransformerRegistry {
    transformers: HashMap<Address, Arc<dyn StorageTransformer>>,
}

impl StorageTransformerRegistry {
    pub fn new() -> Self {
        Self {
            transformers: HashMap::new(),
        }
    }

    /// Register a transformer under its contract address. A later
    /// registration for the same address replaces the earlier one.
    pub fn register(&mut self, transformer: Arc<dyn StorageTransformer>) {
        let address = transformer.contract_address();
        if self.transformers.insert(address, transformer).is_some() {
            tracing::warn!(
                "Replaced storage transformer already registered for {:#x}",
                address
            );
        }
    }

    pub fn get(&self, address: &Address) -> Option<&Arc<dyn StorageTransformer>> {
        self.transformers.get(address)
    }

    pub fn len(&self) -> usize {
        self.transformers.len()
    }
}

impl Default for StorageTransformerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the registry from initializers bound to `deps`.
pub fn build_storage_registry(
    deps: &TransformerDeps,
    initializers: Vec<StorageTransformerInitializer>,
) -> StorageTransformerRegistry {
    let mut registry = StorageTransformerRegistry::new();
    for initializer in initializers {
        registry.register(initializer(deps));
    }

    tracing::info!(
        "Built storage transformer registry with {} contracts",
        registry.len()
    );

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fakes::{deps, MockStorageTransformer};

    fn initializer(address: Address) -> StorageTransformerInitializer {
        Box::new(move |_: &TransformerDeps| {
            let transformer: Arc<dyn StorageTransformer> =
                Arc::new(MockStorageTransformer::new(address));
            transformer
        })
    }

    #[test]
    fn test_registry_lookup_by_address() {
        let (deps, _, _) = deps();
        let one = Address::with_last_byte(1);
        let two = Address::with_last_byte(2);
        let initializers = vec![initializer(one), initializer(two)];

        let registry = build_storage_registry(&deps, initializers);

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.get(&one).unwrap().contract_address(), one);
        assert!(registry.get(&Address::with_last_byte(3)).is_none());
    }

    #[test]
    fn test_duplicate_address_keeps_last() {
        let address = Address::with_last_byte(1);
        let mut registry = StorageTransformerRegistry::new();
        registry.register(Arc::new(MockStorageTransformer::new(address)));
        registry.register(Arc::new(MockStorageTransformer::new(address)));
        assert_eq!(registry.len(), 1);
    }
}
