//! Error taxonomy for policy construction and per-operation failures.

use thiserror::Error;

use crate::lifecycle::StoreError;
use crate::policy::KeyNameError;
use crate::schema::FieldType;
use crate::transit::KeyServiceError;

/// Invalid policy configuration.
///
/// Raised while building an [`crate::EncryptionPolicy`] (fatal to the schema
/// binding) or when a query needs a key name the strategy cannot provide.
/// Never retried.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// An explicitly listed field does not exist in the schema.
    #[error("unknown field {0}")]
    UnknownField(String),

    /// An explicitly listed field exists but is not a string.
    #[error("only string fields can be encrypted: {path} is a {actual}")]
    UnsupportedFieldType { path: String, actual: FieldType },

    /// The configured key name cannot be used.
    #[error("invalid key name: {0}")]
    InvalidKeyName(String),

    /// Searchable fields were requested together with per-document key names.
    #[error("per_document key names cannot be used to search encrypted fields: {}", fields.join(", "))]
    PerDocumentSearch { fields: Vec<String> },

    /// The key name could not be derived at query time.
    #[error(
        "key name cannot be derived while searching {field}; \
         per-document key names do not support search: {source}"
    )]
    UnsearchableKeyName {
        field: String,
        #[source]
        source: KeyNameError,
    },

    /// A schema definition could not be flattened into paths.
    #[error("invalid schema definition at {path}: {reason}")]
    InvalidSchema { path: String, reason: String },
}

/// Top-level error for document, query, and lifecycle operations.
#[derive(Debug, Error)]
pub enum FleError {
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// The key name for a document could not be derived.
    #[error("key name derivation failed: {0}")]
    KeyName(#[from] KeyNameError),

    /// The remote key service call failed. The enclosing operation is aborted.
    #[error(transparent)]
    KeyService(#[from] KeyServiceError),

    /// The key service answered with a different number of items than were
    /// sent. Results are never truncated or padded to fit.
    #[error("batch alignment violated: sent {expected} items, received {actual}")]
    AlignmentViolation { expected: usize, actual: usize },

    /// A batch result item is missing its payload or does not decode.
    #[error("malformed batch item {index}: {reason}")]
    MalformedPayload { index: usize, reason: String },

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// Convenience alias for results in this crate.
pub type Result<T> = std::result::Result<T, FleError>;
