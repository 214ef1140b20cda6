//! Encryption policy: which fields, which key, which lifecycle behaviour.
//!
//! A policy is built once per schema binding from [`PolicyOptions`] validated
//! against a [`Schema`], and is immutable afterwards.

pub mod key_name;

pub use key_name::{KeyNameError, KeyNameFn, KeyNameStrategy};

use std::sync::Arc;

use common::protocol::KeyCreationOptions;
use serde::Deserialize;
use tracing::info;

use crate::error::ConfigurationError;
use crate::schema::{select_fields, Schema};
use crate::transformer::FieldEncryptor;
use crate::transit::KeyService;

/// Caller options, usually deserialised from configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PolicyOptions {
    /// Explicit list of paths to encrypt. When absent, every non-indexed
    /// string path is encrypted.
    pub encrypted_fields: Option<Vec<String>>,
    /// Paths removed from the default selection.
    pub exclude_from_encryption: Vec<String>,
    /// Key-name derivation mode.
    pub key_name: KeyNameStrategy,
    /// Install lifecycle hooks.
    pub middleware: bool,
    /// Decrypt the application copy again after a save.
    pub decrypt_post_save: bool,
    /// Key type to request when the key service has to create the key.
    pub key_creation_key_type: Option<String>,
    /// Convergent encryption flag to request when the key is created.
    /// Must be `true` for encrypted-field search to match anything.
    pub key_creation_convergent_encryption: Option<bool>,
    /// Fields the caller intends to query by.
    pub searchable_fields: Vec<String>,
    /// Collection identity used for key derivation, overriding the bound
    /// collection name (e.g. after a collection rename).
    pub collection_id: Option<String>,
}

impl Default for PolicyOptions {
    fn default() -> Self {
        Self {
            encrypted_fields: None,
            exclude_from_encryption: Vec::new(),
            key_name: KeyNameStrategy::PerCollection,
            middleware: true,
            decrypt_post_save: true,
            key_creation_key_type: None,
            key_creation_convergent_encryption: None,
            searchable_fields: Vec::new(),
            collection_id: None,
        }
    }
}

/// Validated, immutable encryption policy for one schema binding.
#[derive(Debug, Clone)]
pub struct EncryptionPolicy {
    fields: Vec<String>,
    key_name: KeyNameStrategy,
    key_creation: KeyCreationOptions,
    middleware: bool,
    decrypt_post_save: bool,
    collection_id: Option<String>,
}

impl EncryptionPolicy {
    /// Validate `options` against `schema` and build the policy.
    ///
    /// # Errors
    ///
    /// - [`ConfigurationError::UnknownField`] / [`ConfigurationError::UnsupportedFieldType`]
    ///   for a bad explicit field list.
    /// - [`ConfigurationError::InvalidKeyName`] for an empty literal key name.
    /// - [`ConfigurationError::PerDocumentSearch`] if `searchable_fields` is
    ///   set together with per-document key names.
    pub fn new(schema: &Schema, options: PolicyOptions) -> Result<Self, ConfigurationError> {
        if let KeyNameStrategy::Literal(name) = &options.key_name {
            if name.trim().is_empty() {
                return Err(ConfigurationError::InvalidKeyName(
                    "literal key name must not be empty".into(),
                ));
            }
        }

        let fields = select_fields(
            schema,
            options.encrypted_fields.as_deref(),
            &options.exclude_from_encryption,
        )?;

        if !options.searchable_fields.is_empty() {
            if !options.key_name.supports_search() {
                return Err(ConfigurationError::PerDocumentSearch {
                    fields: options.searchable_fields,
                });
            }
            if let Some(unknown) = options.searchable_fields.iter().find(|f| !fields.contains(*f)) {
                return Err(ConfigurationError::UnknownField(unknown.clone()));
            }
        }

        let key_creation = KeyCreationOptions {
            key_type: options.key_creation_key_type,
            convergent_encryption: options.key_creation_convergent_encryption,
        };

        info!(
            fields = fields.len(),
            key_name = ?options.key_name,
            middleware = options.middleware,
            "encryption policy built"
        );

        Ok(Self {
            fields,
            key_name: options.key_name,
            key_creation,
            middleware: options.middleware,
            decrypt_post_save: options.decrypt_post_save,
            collection_id: options.collection_id,
        })
    }

    /// Encrypted field paths, in the fixed order used for every batch.
    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Whether `path` is an encrypted field.
    pub fn is_encrypted_field(&self, path: &str) -> bool {
        self.fields.iter().any(|f| f == path)
    }

    pub fn key_name(&self) -> &KeyNameStrategy {
        &self.key_name
    }

    /// Options forwarded to the key service on every transit call.
    pub fn key_creation(&self) -> &KeyCreationOptions {
        &self.key_creation
    }

    pub fn middleware(&self) -> bool {
        self.middleware
    }

    pub fn decrypt_post_save(&self) -> bool {
        self.decrypt_post_save
    }

    /// Explicit collection identity override, if configured.
    pub fn collection_id(&self) -> Option<&str> {
        self.collection_id.as_deref()
    }

    /// Attach a key-service client and a collection identity.
    pub fn bind(self, key_service: Arc<dyn KeyService>, collection: impl Into<String>) -> FieldEncryptor {
        FieldEncryptor::new(Arc::new(self), key_service, collection)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::FieldType;
    use serde_json::json;

    fn schema() -> Schema {
        Schema::new()
            .path("_id", FieldType::ObjectId)
            .path("firstName", FieldType::String)
            .path("lastName", FieldType::String)
            .path("num", FieldType::Number)
    }

    #[test]
    fn defaults_match_plugin_defaults() {
        let opts = PolicyOptions::default();
        assert!(opts.middleware);
        assert!(opts.decrypt_post_save);
        assert!(matches!(opts.key_name, KeyNameStrategy::PerCollection));
    }

    #[test]
    fn builds_key_creation_options() {
        let policy = EncryptionPolicy::new(
            &schema(),
            PolicyOptions {
                key_creation_key_type: Some("aes256-gcm96".into()),
                key_creation_convergent_encryption: Some(true),
                ..Default::default()
            },
        )
        .unwrap();
        assert_eq!(policy.key_creation().key_type.as_deref(), Some("aes256-gcm96"));
        assert_eq!(policy.key_creation().convergent_encryption, Some(true));
        assert_eq!(policy.fields(), ["firstName", "lastName"]);
    }

    #[test]
    fn per_document_with_searchable_fields_fails() {
        let err = EncryptionPolicy::new(
            &schema(),
            PolicyOptions {
                key_name: KeyNameStrategy::PerDocument,
                searchable_fields: vec!["firstName".into()],
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::PerDocumentSearch { .. }));
    }

    #[test]
    fn per_document_without_search_is_allowed() {
        let policy = EncryptionPolicy::new(
            &schema(),
            PolicyOptions {
                key_name: KeyNameStrategy::PerDocument,
                encrypted_fields: Some(vec!["firstName".into()]),
                ..Default::default()
            },
        );
        assert!(policy.is_ok());
    }

    #[test]
    fn searchable_field_must_be_encrypted() {
        let err = EncryptionPolicy::new(
            &schema(),
            PolicyOptions {
                encrypted_fields: Some(vec!["firstName".into()]),
                searchable_fields: vec!["lastName".into()],
                ..Default::default()
            },
        )
        .unwrap_err();
        assert_eq!(err.to_string(), "unknown field lastName");
    }

    #[test]
    fn empty_literal_key_name_fails() {
        let err = EncryptionPolicy::new(
            &schema(),
            PolicyOptions {
                key_name: KeyNameStrategy::Literal(" ".into()),
                ..Default::default()
            },
        )
        .unwrap_err();
        assert!(matches!(err, ConfigurationError::InvalidKeyName(_)));
    }

    #[test]
    fn options_deserialize_from_config() {
        let opts: PolicyOptions = serde_json::from_value(json!({
            "encrypted_fields": ["firstName"],
            "key_name": "per_document",
            "decrypt_post_save": false,
            "key_creation_convergent_encryption": true
        }))
        .unwrap();
        assert!(matches!(opts.key_name, KeyNameStrategy::PerDocument));
        assert!(!opts.decrypt_post_save);
        assert!(opts.middleware);
        assert_eq!(opts.key_creation_convergent_encryption, Some(true));
    }
}
