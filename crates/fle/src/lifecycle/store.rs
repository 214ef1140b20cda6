//! The document-store seam.

use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

/// Failure reported by a document store.
#[derive(Debug, Error)]
#[error("document store error: {0}")]
pub struct StoreError(pub String);

/// Minimal document-store driver interface the binder hooks into.
///
/// Filters are JSON query documents; documents are JSON objects carrying an
/// `_id`. Implementations see only ciphertext for encrypted fields.
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Insert a new document and return it as stored (with `_id` assigned).
    async fn insert(&self, collection: &str, document: Value) -> Result<Value, StoreError>;

    /// Replace the document with the same `_id`, inserting it if absent.
    async fn replace(&self, collection: &str, document: Value) -> Result<Value, StoreError>;

    async fn find(&self, collection: &str, filter: &Value) -> Result<Vec<Value>, StoreError>;

    async fn find_one(&self, collection: &str, filter: &Value) -> Result<Option<Value>, StoreError>;

    async fn count(&self, collection: &str, filter: &Value) -> Result<u64, StoreError>;

    /// Delete every matching document; returns how many were removed.
    async fn delete_many(&self, collection: &str, filter: &Value) -> Result<u64, StoreError>;

    /// Set `fields` (dotted paths) on every matching document; returns how
    /// many were modified.
    async fn update_many(
        &self,
        collection: &str,
        filter: &Value,
        fields: &Map<String, Value>,
    ) -> Result<u64, StoreError>;
}
