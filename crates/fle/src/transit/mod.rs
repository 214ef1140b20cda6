//! Remote key-service seam.
//!
//! All cryptography is delegated to a transit key service reached through the
//! [`KeyService`] trait. Two implementations ship with the crate:
//!
//! - [`VaultTransit`]: HTTP client for a HashiCorp Vault transit engine.
//! - [`MemoryTransit`]: in-process stand-in for tests and local development.
//!
//! # Contract
//!
//! `batch_results` must have the same length and order as `batch_input`.
//! Implementations never retry; a failed call aborts the caller's operation.

pub mod memory;
pub mod vault;

pub use memory::MemoryTransit;
pub use vault::VaultTransit;

use async_trait::async_trait;
use common::protocol::{TransitRequest, TransitResponse};
use thiserror::Error;

use crate::codec::Direction;

/// Failures of a key-service call.
#[derive(Debug, Error)]
pub enum KeyServiceError {
    /// The request never produced an HTTP response.
    #[error("key service transport failure: {0}")]
    Transport(String),

    /// The key service answered with a non-success status.
    #[error("key service returned status {status}: {}", errors.join("; "))]
    Status { status: u16, errors: Vec<String> },

    /// The response body could not be parsed.
    #[error("malformed key service response: {0}")]
    MalformedResponse(String),

    /// One batch item was rejected by the key service.
    #[error("key service rejected batch item {index}: {message}")]
    ItemFailed { index: usize, message: String },

    /// Decryption was requested under a key that does not exist.
    #[error("unknown key {0}")]
    UnknownKey(String),
}

/// A remote transit key service.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait KeyService: Send + Sync {
    /// `transit/encrypt/<key_name>`: plaintext items in, ciphertext results out.
    async fn encrypt(
        &self,
        key_name: &str,
        request: TransitRequest,
    ) -> Result<TransitResponse, KeyServiceError>;

    /// `transit/decrypt/<key_name>`: ciphertext items in, plaintext results out.
    async fn decrypt(
        &self,
        key_name: &str,
        request: TransitRequest,
    ) -> Result<TransitResponse, KeyServiceError>;
}

/// Route a request to the encrypt or decrypt endpoint.
pub async fn dispatch(
    service: &dyn KeyService,
    direction: Direction,
    key_name: &str,
    request: TransitRequest,
) -> Result<TransitResponse, KeyServiceError> {
    match direction {
        Direction::Encrypt => service.encrypt(key_name, request).await,
        Direction::Decrypt => service.decrypt(key_name, request).await,
    }
}
