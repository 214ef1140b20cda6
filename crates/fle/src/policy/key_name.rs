//! Derivation of the remote key name used for an operation.

use std::{fmt, sync::Arc};

use serde::{Deserialize, Deserializer};
use serde_json::Value;
use thiserror::Error;

/// Errors raised while deriving a key name.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum KeyNameError {
    /// The strategy needs a document, but none is available (query time).
    #[error("no document is available to derive a per-document key name")]
    MissingDocument,

    /// The document has no usable `_id`.
    #[error("document has no string or numeric _id")]
    MissingDocumentId,

    /// The derived name is empty.
    #[error("derived key name is empty")]
    Empty,

    /// A caller-supplied function failed.
    #[error("{0}")]
    Custom(String),
}

/// Signature of a caller-supplied key-name function.
///
/// Receives the collection identity and, for document operations, the
/// document. At query time the document is `None`.
pub type KeyNameFn = dyn Fn(&str, Option<&Value>) -> Result<String, KeyNameError> + Send + Sync;

/// How the key name is derived from `(collection, document)`.
#[derive(Clone, Default)]
pub enum KeyNameStrategy {
    /// The collection name. Identical for every document.
    #[default]
    PerCollection,
    /// `<collection>-<document _id>`. Unusable at query time.
    PerDocument,
    /// A fixed name.
    Literal(String),
    /// A caller-supplied function.
    Custom(Arc<KeyNameFn>),
}

impl KeyNameStrategy {
    /// Wrap a closure as [`KeyNameStrategy::Custom`].
    pub fn custom<F>(f: F) -> Self
    where
        F: Fn(&str, Option<&Value>) -> Result<String, KeyNameError> + Send + Sync + 'static,
    {
        Self::Custom(Arc::new(f))
    }

    /// Derive the key name.
    ///
    /// # Errors
    ///
    /// - [`KeyNameError::MissingDocument`] for `PerDocument` without a document.
    /// - [`KeyNameError::MissingDocumentId`] for `PerDocument` on a document without `_id`.
    /// - [`KeyNameError::Empty`] if the result is an empty string.
    /// - Whatever a custom function returns.
    pub fn derive(&self, collection: &str, document: Option<&Value>) -> Result<String, KeyNameError> {
        let name = match self {
            Self::PerCollection => collection.to_owned(),
            Self::PerDocument => {
                let document = document.ok_or(KeyNameError::MissingDocument)?;
                let id = document_id(document).ok_or(KeyNameError::MissingDocumentId)?;
                format!("{collection}-{id}")
            }
            Self::Literal(name) => name.clone(),
            Self::Custom(f) => f(collection, document)?,
        };
        if name.is_empty() {
            return Err(KeyNameError::Empty);
        }
        Ok(name)
    }

    /// Whether a key name can be derived without a document.
    ///
    /// Only `PerDocument` is known to be unsearchable; a custom function is
    /// checked when a query actually needs it.
    pub fn supports_search(&self) -> bool {
        !matches!(self, Self::PerDocument)
    }
}

impl fmt::Debug for KeyNameStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::PerCollection => f.write_str("PerCollection"),
            Self::PerDocument => f.write_str("PerDocument"),
            Self::Literal(name) => f.debug_tuple("Literal").field(name).finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

impl From<String> for KeyNameStrategy {
    /// `"per_collection"` and `"per_document"` select those modes; any other
    /// string is a literal key name.
    fn from(mode: String) -> Self {
        match mode.as_str() {
            "per_collection" => Self::PerCollection,
            "per_document" => Self::PerDocument,
            _ => Self::Literal(mode),
        }
    }
}

impl<'de> Deserialize<'de> for KeyNameStrategy {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        String::deserialize(deserializer).map(Self::from)
    }
}

/// Render a document's `_id` as used in per-document key names.
fn document_id(document: &Value) -> Option<String> {
    match document.get("_id")? {
        Value::String(id) if !id.is_empty() => Some(id.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get("$oid").and_then(Value::as_str).map(str::to_owned),
        _ => None,
    }
}
