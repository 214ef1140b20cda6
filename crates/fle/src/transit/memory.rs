//! [`MemoryTransit`]: an in-process transit engine for tests and local runs.
//!
//! Mirrors the behaviour of a real transit engine closely enough to exercise
//! the whole encryption lifecycle:
//!
//! - Keys are created on the first encrypt call using the forwarded
//!   key-creation options; later options are ignored.
//! - With `convergent_encryption`, identical (key, context, plaintext) always
//!   yields identical ciphertext. Otherwise every call yields a new one.
//! - Ciphertexts carry the `vault:v1:` prefix and only decrypt under the key
//!   and context that produced them.
//! - A failed batch item fails the whole call with
//!   [`KeyServiceError::ItemFailed`], as [`VaultTransit`](super::VaultTransit)
//!   reports it.
//!
//! This is not cryptography: plaintexts are kept in memory, indexed by token.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use common::protocol::{TransitBatchResult, TransitRequest, TransitResponse};
use sha2::{Digest, Sha256};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::{KeyService, KeyServiceError};

/// Prefix of every ciphertext produced by this engine.
pub const CIPHERTEXT_PREFIX: &str = "vault:v1:";

#[derive(Debug)]
struct MemoryKey {
    convergent: bool,
    seed: [u8; 16],
    /// token → (context, base64 plaintext)
    entries: HashMap<String, (String, String)>,
}

/// In-memory transit engine.
#[derive(Debug, Default)]
pub struct MemoryTransit {
    keys: Mutex<HashMap<String, MemoryKey>>,
    calls: AtomicUsize,
    history: Mutex<Vec<(String, TransitRequest)>>,
    failing: AtomicBool,
}

impl MemoryTransit {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of encrypt/decrypt calls received so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Every call received, as `(key name, request)`, in arrival order.
    pub async fn history(&self) -> Vec<(String, TransitRequest)> {
        self.history.lock().await.clone()
    }

    /// Make every subsequent call fail with a transport error.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Whether `key_name` exists and was created with convergent encryption.
    pub async fn is_convergent(&self, key_name: &str) -> Option<bool> {
        self.keys.lock().await.get(key_name).map(|k| k.convergent)
    }

    async fn record(&self, key_name: &str, request: &TransitRequest) -> Result<(), KeyServiceError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.history
            .lock()
            .await
            .push((key_name.to_owned(), request.clone()));
        if self.failing.load(Ordering::SeqCst) {
            return Err(KeyServiceError::Transport("connection refused".into()));
        }
        Ok(())
    }
}

fn item_error(message: &str) -> TransitBatchResult {
    TransitBatchResult {
        error: Some(message.to_owned()),
        ..Default::default()
    }
}

/// Turn the first per-item error into a call failure.
fn respond(results: Vec<TransitBatchResult>) -> Result<TransitResponse, KeyServiceError> {
    if let Some((index, message)) = results
        .iter()
        .enumerate()
        .find_map(|(i, r)| r.error.as_ref().map(|m| (i, m.clone())))
    {
        return Err(KeyServiceError::ItemFailed { index, message });
    }
    Ok(TransitResponse::from_results(results))
}

fn token(seed: &[u8], salt: &[u8], context: &str, plaintext: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(seed);
    hasher.update(salt);
    hasher.update(context.as_bytes());
    hasher.update([0u8]);
    hasher.update(plaintext.as_bytes());
    URL_SAFE_NO_PAD.encode(hasher.finalize())
}

#[async_trait]
impl KeyService for MemoryTransit {
    async fn encrypt(
        &self,
        key_name: &str,
        request: TransitRequest,
    ) -> Result<TransitResponse, KeyServiceError> {
        self.record(key_name, &request).await?;

        let mut keys = self.keys.lock().await;
        let key = keys.entry(key_name.to_owned()).or_insert_with(|| MemoryKey {
            convergent: request.key_creation.convergent_encryption.unwrap_or(false),
            seed: *Uuid::new_v4().as_bytes(),
            entries: HashMap::new(),
        });

        let results = request
            .batch_input
            .iter()
            .map(|item| {
                let Some(plaintext) = item.plaintext.as_deref() else {
                    return item_error("missing plaintext to encrypt");
                };
                if STANDARD.decode(plaintext).is_err() {
                    return item_error("plaintext is not valid base64");
                }
                if key.convergent && item.context.is_empty() {
                    return item_error("context is required for convergent encryption");
                }
                let salt = if key.convergent {
                    [0u8; 16]
                } else {
                    *Uuid::new_v4().as_bytes()
                };
                let token = token(&key.seed, &salt, &item.context, plaintext);
                key.entries
                    .insert(token.clone(), (item.context.clone(), plaintext.to_owned()));
                TransitBatchResult {
                    ciphertext: Some(format!("{CIPHERTEXT_PREFIX}{token}")),
                    ..Default::default()
                }
            })
            .collect();

        respond(results)
    }

    async fn decrypt(
        &self,
        key_name: &str,
        request: TransitRequest,
    ) -> Result<TransitResponse, KeyServiceError> {
        self.record(key_name, &request).await?;

        let keys = self.keys.lock().await;
        let key = keys
            .get(key_name)
            .ok_or_else(|| KeyServiceError::UnknownKey(key_name.to_owned()))?;

        let results = request
            .batch_input
            .iter()
            .map(|item| {
                let entry = item
                    .ciphertext
                    .as_deref()
                    .and_then(|c| c.strip_prefix(CIPHERTEXT_PREFIX))
                    .and_then(|t| key.entries.get(t));
                match entry {
                    Some((context, plaintext)) if *context == item.context => TransitBatchResult {
                        plaintext: Some(plaintext.clone()),
                        ..Default::default()
                    },
                    _ => item_error("cipher: message authentication failed"),
                }
            })
            .collect();

        respond(results)
    }
}
