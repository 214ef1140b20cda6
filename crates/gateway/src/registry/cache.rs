//! Lock-free map of collection name to bound [`FieldEncryptor`].

use std::{collections::HashMap, sync::Arc};

use arc_swap::ArcSwap;
use fle::FieldEncryptor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    /// No policy is registered for the requested collection.
    #[error("unknown collection: {0}")]
    UnknownCollection(String),
}

/// Shared registry of encryptors keyed by collection name.
///
/// Backed by [`ArcSwap`] so request handlers never block and the refresh
/// task can swap in a whole new map at once.
#[derive(Clone, Debug)]
pub struct PolicyRegistry {
    inner: Arc<ArcSwap<HashMap<String, FieldEncryptor>>>,
}

impl PolicyRegistry {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(ArcSwap::new(Arc::new(HashMap::new()))),
        }
    }

    /// Number of collections currently registered.
    pub fn len(&self) -> usize {
        self.inner.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.load().is_empty()
    }

    /// Look up the encryptor of `collection`.
    ///
    /// # Errors
    ///
    /// Returns [`RegistryError::UnknownCollection`] if `collection` is not present.
    pub fn get(&self, collection: &str) -> Result<FieldEncryptor, RegistryError> {
        self.inner
            .load()
            .get(collection)
            .cloned()
            .ok_or_else(|| RegistryError::UnknownCollection(collection.to_owned()))
    }

    /// Atomically replace every registered collection.
    pub fn replace_all(&self, encryptors: HashMap<String, FieldEncryptor>) {
        self.inner.store(Arc::new(encryptors));
    }
}

impl Default for PolicyRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use fle::{EncryptionPolicy, FieldType, MemoryTransit, PolicyOptions, Schema};

    fn encryptor(collection: &str) -> FieldEncryptor {
        let schema = Schema::new().path("name", FieldType::String);
        EncryptionPolicy::new(&schema, PolicyOptions::default())
            .unwrap()
            .bind(Arc::new(MemoryTransit::new()), collection)
    }

    #[test]
    fn initially_empty() {
        let registry = PolicyRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.get("people").is_err());
    }

    #[test]
    fn replace_all_swaps_the_whole_map() {
        let registry = PolicyRegistry::new();
        registry.replace_all(HashMap::from([("a".to_string(), encryptor("a"))]));
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.get("a").unwrap().collection(), "a");

        registry.replace_all(HashMap::from([("b".to_string(), encryptor("b"))]));
        assert!(registry.get("a").is_err());
        assert!(registry.get("b").is_ok());
    }
}
