//! Request and response types exchanged between components.
//!
//! Two families live here: the transit batch bodies sent to the remote key
//! service (`transit/encrypt/<key>` and `transit/decrypt/<key>`), and the JSON
//! bodies of the gateway's public HTTP API.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Transit batch protocol
// ---------------------------------------------------------------------------

/// Options forwarded verbatim to the key service so that a missing key can be
/// created on first use.
///
/// Both fields are omitted from the wire body when unset.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeyCreationOptions {
    /// Key type to create (e.g. `"aes256-gcm96"`).
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub key_type: Option<String>,
    /// Whether a created key supports convergent encryption.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub convergent_encryption: Option<bool>,
}

impl KeyCreationOptions {
    /// Returns `true` if no option is set.
    pub fn is_empty(&self) -> bool {
        self.key_type.is_none() && self.convergent_encryption.is_none()
    }
}

/// One entry of `batch_input`.
///
/// Exactly one of `plaintext` (encrypt) or `ciphertext` (decrypt) is set.
/// `context` is the base64 encoding of the field path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitBatchItem {
    /// Base64-encoded derivation context.
    pub context: String,
    /// Base64-encoded plaintext (encrypt direction).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plaintext: Option<String>,
    /// Opaque ciphertext token (decrypt direction).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ciphertext: Option<String>,
}

impl TransitBatchItem {
    /// Build an item for the encrypt direction.
    pub fn plaintext(context: impl Into<String>, plaintext_b64: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            plaintext: Some(plaintext_b64.into()),
            ciphertext: None,
        }
    }

    /// Build an item for the decrypt direction.
    pub fn ciphertext(context: impl Into<String>, ciphertext: impl Into<String>) -> Self {
        Self {
            context: context.into(),
            plaintext: None,
            ciphertext: Some(ciphertext.into()),
        }
    }
}

/// Request body for `transit/encrypt/<key>` and `transit/decrypt/<key>`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitRequest {
    /// Ordered batch items. Response order matches this order.
    pub batch_input: Vec<TransitBatchItem>,
    /// Key-creation fields, flattened into the top-level body.
    #[serde(flatten)]
    pub key_creation: KeyCreationOptions,
}

/// One entry of `batch_results`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitBatchResult {
    /// Ciphertext token (encrypt direction).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ciphertext: Option<String>,
    /// Base64-encoded plaintext (decrypt direction).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plaintext: Option<String>,
    /// Per-item failure reported by the key service.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// `data` member of a transit response.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitResponseData {
    /// Results in request order.
    #[serde(default)]
    pub batch_results: Vec<TransitBatchResult>,
}

/// Response body of a transit batch call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitResponse {
    pub data: TransitResponseData,
}

impl TransitResponse {
    /// Wrap an ordered result list.
    pub fn from_results(batch_results: Vec<TransitBatchResult>) -> Self {
        Self {
            data: TransitResponseData { batch_results },
        }
    }
}

/// Error body returned by the key service on non-2xx responses.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TransitErrorBody {
    #[serde(default)]
    pub errors: Vec<String>,
}

// ---------------------------------------------------------------------------
// Gateway: document endpoints
// ---------------------------------------------------------------------------

/// Request and response body for `POST /collections/:name/encrypt` and
/// `POST /collections/:name/decrypt`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentBody {
    /// The document; policy fields are transformed in place.
    pub document: serde_json::Value,
}

/// Request and response body for `POST /collections/:name/query`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryBody {
    /// Query filter; equality leaves on encrypted fields are rewritten.
    pub filter: serde_json::Value,
}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"bad_request"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}

// ---------------------------------------------------------------------------
// Health check
// ---------------------------------------------------------------------------

/// Response body for `GET /health`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Overall service status: `"ok"` or `"degraded"`.
    pub status: String,
    /// Number of collection policies currently loaded.
    pub collections_loaded: usize,
}
