//! Document-level encryption and decryption.
//!
//! [`FieldEncryptor`] combines a policy, a key-service client and a collection
//! identity. Each document operation issues at most one key-service call,
//! whatever the number of fields.
//!
//! # Mutation contract
//!
//! [`FieldEncryptor::encrypt`] and [`FieldEncryptor::decrypt`] rewrite the
//! caller's document in place. They are all-or-nothing: the remote call and
//! the decoding of every result complete before the first field is written,
//! so a failure leaves the document exactly as it was.

use std::sync::Arc;

use common::protocol::TransitRequest;
use serde_json::Value;
use tracing::debug;

use crate::codec::{self, Direction};
use crate::error::Result;
use crate::policy::EncryptionPolicy;
use crate::transit::{self, KeyService};

/// A policy bound to a key service and a collection.
#[derive(Clone)]
pub struct FieldEncryptor {
    policy: Arc<EncryptionPolicy>,
    key_service: Arc<dyn KeyService>,
    collection: Arc<str>,
}

impl FieldEncryptor {
    /// Bind `policy` to `key_service` for `collection`.
    ///
    /// The policy's `collection_id`, when set, replaces `collection` as the
    /// identity used for key derivation.
    pub fn new(
        policy: Arc<EncryptionPolicy>,
        key_service: Arc<dyn KeyService>,
        collection: impl Into<String>,
    ) -> Self {
        let collection: String = match policy.collection_id() {
            Some(id) => id.to_owned(),
            None => collection.into(),
        };
        Self {
            policy,
            key_service,
            collection: Arc::from(collection),
        }
    }

    pub fn policy(&self) -> &EncryptionPolicy {
        &self.policy
    }

    /// Collection identity used for key derivation.
    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub(crate) fn key_service(&self) -> &dyn KeyService {
        self.key_service.as_ref()
    }

    /// Replace every present policy field of `document` with its ciphertext.
    ///
    /// Returns the number of fields encrypted. No key-service call is made
    /// when no policy field holds a non-empty string.
    ///
    /// # Errors
    ///
    /// Key-name derivation, key-service, and alignment failures. The document
    /// is unchanged on error.
    pub async fn encrypt(&self, document: &mut Value) -> Result<usize> {
        self.transform(document, Direction::Encrypt).await
    }

    /// Replace every present policy field of `document` with its plaintext.
    ///
    /// Mirror of [`FieldEncryptor::encrypt`].
    pub async fn decrypt(&self, document: &mut Value) -> Result<usize> {
        self.transform(document, Direction::Decrypt).await
    }

    async fn transform(&self, document: &mut Value, direction: Direction) -> Result<usize> {
        let fields = self.policy.fields();
        let batch_input = codec::to_batch(document, fields, direction);
        if batch_input.is_empty() {
            return Ok(0);
        }

        let key_name = self
            .policy
            .key_name()
            .derive(&self.collection, Some(&*document))?;

        debug!(
            collection = %self.collection,
            key_name = %key_name,
            items = batch_input.len(),
            direction = direction.as_str(),
            "transforming document"
        );

        let request = TransitRequest {
            batch_input,
            key_creation: self.policy.key_creation().clone(),
        };
        let response = transit::dispatch(self.key_service(), direction, &key_name, request).await?;

        codec::from_batch(document, &response.data.batch_results, fields, direction)
    }
}

impl std::fmt::Debug for FieldEncryptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldEncryptor")
            .field("collection", &self.collection)
            .field("policy", &self.policy)
            .finish_non_exhaustive()
    }
}
