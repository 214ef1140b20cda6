//! Lifecycle binding: transparent encryption around a [`DocumentStore`].
//!
//! [`EncryptedCollection`] plays the role of the store's pre/post hooks:
//!
//! | operation                          | before                | after              |
//! |------------------------------------|-----------------------|--------------------|
//! | `create`, `save`                   | encrypt document      | decrypt (optional) |
//! | `find`, `find_one`                 | rewrite filter        | decrypt results    |
//! | `count`, `delete_many`             | rewrite filter        |                    |
//! | `update_many`                      | rewrite filter + set  |                    |
//!
//! A failure in any "before" step aborts the operation; nothing reaches the
//! store. When the policy disables middleware every call goes straight
//! through.

pub mod memory;
pub mod store;

pub use memory::MemoryStore;
pub use store::{DocumentStore, StoreError};

use std::sync::Arc;

use futures_util::future::try_join_all;
use serde_json::{Map, Value};
use tracing::{debug, info};
use uuid::Uuid;

use crate::error::Result;
use crate::transformer::FieldEncryptor;

/// Store operations that take a filter, for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Find,
    FindOne,
    Count,
    Delete,
    Update,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Find => "find",
            QueryKind::FindOne => "find_one",
            QueryKind::Count => "count",
            QueryKind::Delete => "delete_many",
            QueryKind::Update => "update_many",
        }
    }
}

/// A store collection with field-level encryption hooked into every call.
pub struct EncryptedCollection<S> {
    store: Arc<S>,
    encryptor: FieldEncryptor,
    name: String,
}

impl<S: DocumentStore> EncryptedCollection<S> {
    /// Wrap collection `name` of `store`.
    ///
    /// `name` addresses the store; key derivation uses the encryptor's own
    /// collection identity.
    pub fn new(store: Arc<S>, encryptor: FieldEncryptor, name: impl Into<String>) -> Self {
        let name = name.into();
        info!(
            collection = %name,
            key_collection = %encryptor.collection(),
            middleware = encryptor.policy().middleware(),
            "encrypted collection bound"
        );
        Self {
            store,
            encryptor,
            name,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn encryptor(&self) -> &FieldEncryptor {
        &self.encryptor
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    fn hooks_enabled(&self) -> bool {
        self.encryptor.policy().middleware()
    }

    /// Insert a new document.
    ///
    /// An `_id` is assigned first when absent so per-document key names can
    /// be derived. Returns the stored document, decrypted again unless
    /// `decrypt_post_save` is off.
    pub async fn create(&self, document: Value) -> Result<Value> {
        let document = self.before_save(document).await?;
        let stored = self.store.insert(&self.name, document).await?;
        self.after_save(stored).await
    }

    /// Insert or replace a document by `_id`.
    pub async fn save(&self, document: Value) -> Result<Value> {
        let document = self.before_save(document).await?;
        let stored = self.store.replace(&self.name, document).await?;
        self.after_save(stored).await
    }

    pub async fn find(&self, filter: Value) -> Result<Vec<Value>> {
        let filter = self.before_query(filter, QueryKind::Find).await?;
        let docs = self.store.find(&self.name, &filter).await?;
        if !self.hooks_enabled() {
            return Ok(docs);
        }
        try_join_all(docs.into_iter().map(|doc| self.decrypted(doc))).await
    }

    pub async fn find_one(&self, filter: Value) -> Result<Option<Value>> {
        let filter = self.before_query(filter, QueryKind::FindOne).await?;
        match self.store.find_one(&self.name, &filter).await? {
            Some(doc) if self.hooks_enabled() => Ok(Some(self.decrypted(doc).await?)),
            other => Ok(other),
        }
    }

    pub async fn count(&self, filter: Value) -> Result<u64> {
        let filter = self.before_query(filter, QueryKind::Count).await?;
        Ok(self.store.count(&self.name, &filter).await?)
    }

    pub async fn delete_many(&self, filter: Value) -> Result<u64> {
        let filter = self.before_query(filter, QueryKind::Delete).await?;
        Ok(self.store.delete_many(&self.name, &filter).await?)
    }

    /// Set `fields` on every document matching `filter`.
    ///
    /// Values assigned to encrypted fields, including strings nested in
    /// assigned sub-documents, are encrypted under the collection key in the
    /// same batch as the filter leaves, so per-document key names cannot be
    /// used here.
    pub async fn update_many(&self, mut filter: Value, mut fields: Map<String, Value>) -> Result<u64> {
        if self.hooks_enabled() {
            let rewritten = self.encryptor.rewrite_update(&mut filter, &mut fields).await?;
            debug!(collection = %self.name, kind = QueryKind::Update.as_str(), leaves = rewritten, "update rewritten");
        }
        Ok(self.store.update_many(&self.name, &filter, &fields).await?)
    }

    async fn before_save(&self, mut document: Value) -> Result<Value> {
        if !self.hooks_enabled() {
            return Ok(document);
        }
        if let Value::Object(map) = &mut document {
            map.entry("_id")
                .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));
        }
        let encrypted = self.encryptor.encrypt(&mut document).await?;
        debug!(collection = %self.name, fields = encrypted, "document encrypted before save");
        Ok(document)
    }

    async fn after_save(&self, document: Value) -> Result<Value> {
        if !self.hooks_enabled() || !self.encryptor.policy().decrypt_post_save() {
            return Ok(document);
        }
        self.decrypted(document).await
    }

    async fn before_query(&self, mut filter: Value, kind: QueryKind) -> Result<Value> {
        if !self.hooks_enabled() {
            return Ok(filter);
        }
        let rewritten = self.encryptor.rewrite_query(&mut filter).await?;
        debug!(collection = %self.name, kind = kind.as_str(), leaves = rewritten, "filter rewritten");
        Ok(filter)
    }

    async fn decrypted(&self, mut document: Value) -> Result<Value> {
        self.encryptor.decrypt(&mut document).await?;
        Ok(document)
    }
}

impl<S> std::fmt::Debug for EncryptedCollection<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EncryptedCollection")
            .field("name", &self.name)
            .field("encryptor", &self.encryptor)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FleError;
    use crate::policy::{EncryptionPolicy, PolicyOptions};
    use crate::schema::{FieldType, Schema};
    use crate::transit::{KeyServiceError, MockKeyService};
    use serde_json::json;

    fn policy(options: PolicyOptions) -> EncryptionPolicy {
        let schema = Schema::new()
            .path("_id", FieldType::ObjectId)
            .path("firstName", FieldType::String);
        EncryptionPolicy::new(&schema, options).unwrap()
    }

    #[tokio::test]
    async fn failed_encryption_aborts_the_write() {
        let mut mock = MockKeyService::new();
        mock.expect_encrypt()
            .times(1)
            .returning(|_, _| Err(KeyServiceError::Transport("down".into())));
        let store = Arc::new(MemoryStore::new());
        let people = EncryptedCollection::new(
            store.clone(),
            policy(PolicyOptions::default()).bind(Arc::new(mock), "people"),
            "people",
        );

        let err = people.create(json!({"firstName": "Max"})).await.unwrap_err();
        assert!(matches!(err, FleError::KeyService(_)));
        assert!(store.raw("people").await.is_empty());
    }

    #[tokio::test]
    async fn disabled_middleware_never_calls_the_key_service() {
        let mut mock = MockKeyService::new();
        mock.expect_encrypt().times(0);
        mock.expect_decrypt().times(0);
        let store = Arc::new(MemoryStore::new());
        let people = EncryptedCollection::new(
            store.clone(),
            policy(PolicyOptions {
                middleware: false,
                ..Default::default()
            })
            .bind(Arc::new(mock), "people"),
            "people",
        );

        people.create(json!({"_id": "1", "firstName": "Max"})).await.unwrap();
        assert_eq!(store.raw("people").await[0]["firstName"], "Max");
        assert_eq!(people.find(json!({"firstName": "Max"})).await.unwrap().len(), 1);
        assert_eq!(people.count(json!({})).await.unwrap(), 1);
    }

    fn failing_decrypt(store: Arc<MemoryStore>) -> EncryptedCollection<MemoryStore> {
        let mut mock = MockKeyService::new();
        mock.expect_encrypt().times(0);
        mock.expect_decrypt()
            .times(1)
            .returning(|_, _| Err(KeyServiceError::Transport("down".into())));
        EncryptedCollection::new(
            store,
            policy(PolicyOptions::default()).bind(Arc::new(mock), "people"),
            "people",
        )
    }

    #[tokio::test]
    async fn failed_decryption_aborts_find() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert("people", json!({"_id": "1", "firstName": "vault:v1:c2VjcmV0"}))
            .await
            .unwrap();
        let people = failing_decrypt(store);

        let err = people.find(json!({})).await.unwrap_err();
        assert!(matches!(err, FleError::KeyService(KeyServiceError::Transport(_))));
    }

    #[tokio::test]
    async fn failed_decryption_aborts_find_one() {
        let store = Arc::new(MemoryStore::new());
        store
            .insert("people", json!({"_id": "1", "firstName": "vault:v1:c2VjcmV0"}))
            .await
            .unwrap();
        let people = failing_decrypt(store);

        let err = people.find_one(json!({"_id": "1"})).await.unwrap_err();
        assert!(matches!(err, FleError::KeyService(_)));
    }
}
