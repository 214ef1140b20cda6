//! Rewriting of equality filters on encrypted fields.
//!
//! A filter is walked depth-first. Whenever an object key is an encrypted
//! field, its operand is inspected for plaintext leaves:
//!
//! - `{field: "x"}`
//! - `{field: {"$eq": "x"}}`, `{field: {"$ne": "x"}}`
//! - `{field: {"$in": ["x", ...]}}`, `{field: {"$nin": ["x", ...]}}`
//!
//! Every other key is descended into, so combinators such as `$and`, `$or`
//! and `$nor` are covered at any depth. Empty strings are left alone, as they
//! are never encrypted in documents either.
//!
//! All leaves of one filter are encrypted in a single batch under the
//! collection key (no document is available at query time).
//!
//! Values assigned by an update are not filters. They are flattened into
//! dotted paths instead (`{"a": {"b": "x"}}` is `a.b`), and every string
//! whose flattened path is an encrypted field is encrypted in the same batch
//! as the filter leaves.
//!
//! # Caveat
//!
//! Matching only works when the key was created with convergent encryption.
//! Under a non-convergent key the filter is still rewritten, but each
//! encryption yields a fresh ciphertext, so the query silently matches
//! nothing. This is not reported as an error.

use common::protocol::TransitRequest;
use serde_json::{Map, Value};
use tracing::debug;

use crate::codec::{self, Direction};
use crate::error::{ConfigurationError, Result};
use crate::policy::EncryptionPolicy;
use crate::transformer::FieldEncryptor;

/// A plaintext leaf found in a filter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueryLeaf {
    /// JSON pointer to the leaf inside the filter.
    pub pointer: String,
    /// Encrypted field the leaf is compared against.
    pub field: String,
    pub plaintext: String,
}

/// Collect every plaintext leaf bound to an encrypted field, in walk order.
pub fn collect_leaves(filter: &Value, policy: &EncryptionPolicy) -> Vec<QueryLeaf> {
    let mut out = Vec::new();
    walk(filter, "", policy, &mut out);
    out
}

fn walk(node: &Value, pointer: &str, policy: &EncryptionPolicy, out: &mut Vec<QueryLeaf>) {
    match node {
        Value::Object(map) => {
            for (key, child) in map {
                let child_pointer = format!("{pointer}/{}", escape(key));
                if policy.is_encrypted_field(key) {
                    collect_operand(child, &child_pointer, key, out);
                } else {
                    walk(child, &child_pointer, policy, out);
                }
            }
        }
        Value::Array(items) => {
            for (i, item) in items.iter().enumerate() {
                walk(item, &format!("{pointer}/{i}"), policy, out);
            }
        }
        _ => {}
    }
}

fn collect_operand(operand: &Value, pointer: &str, field: &str, out: &mut Vec<QueryLeaf>) {
    match operand {
        Value::String(_) => push_leaf(operand, pointer, field, out),
        Value::Object(ops) => {
            for (op, value) in ops {
                let op_pointer = format!("{pointer}/{}", escape(op));
                match op.as_str() {
                    "$eq" | "$ne" => push_leaf(value, &op_pointer, field, out),
                    "$in" | "$nin" => {
                        if let Value::Array(items) = value {
                            for (i, item) in items.iter().enumerate() {
                                push_leaf(item, &format!("{op_pointer}/{i}"), field, out);
                            }
                        }
                    }
                    _ => {}
                }
            }
        }
        _ => {}
    }
}

fn push_leaf(value: &Value, pointer: &str, field: &str, out: &mut Vec<QueryLeaf>) {
    if let Value::String(s) = value {
        if !s.is_empty() {
            out.push(QueryLeaf {
                pointer: pointer.to_owned(),
                field: field.to_owned(),
                plaintext: s.clone(),
            });
        }
    }
}

/// Collect the string values an update assigns to encrypted fields.
///
/// Nested objects are flattened, so `{"a": {"b": "x"}}` and `{"a.b": "x"}`
/// both yield a leaf for `a.b`. Pointers are relative to `fields`.
pub fn collect_update_leaves(fields: &Map<String, Value>, policy: &EncryptionPolicy) -> Vec<QueryLeaf> {
    let mut out = Vec::new();
    for (key, value) in fields {
        flatten(value, key, &format!("/{}", escape(key)), policy, &mut out);
    }
    out
}

fn flatten(node: &Value, path: &str, pointer: &str, policy: &EncryptionPolicy, out: &mut Vec<QueryLeaf>) {
    match node {
        Value::String(_) if policy.is_encrypted_field(path) => push_leaf(node, pointer, path, out),
        Value::Object(map) => {
            for (key, child) in map {
                let child_path = format!("{path}.{key}");
                flatten(child, &child_path, &format!("{pointer}/{}", escape(key)), policy, out);
            }
        }
        _ => {}
    }
}

/// Escape a key for use as a JSON pointer segment (RFC 6901).
fn escape(key: &str) -> String {
    key.replace('~', "~0").replace('/', "~1")
}

impl FieldEncryptor {
    /// Encrypt the plaintext leaves of `filter` in place.
    ///
    /// Returns the number of leaves rewritten. When no leaf matches, the
    /// filter is untouched and no key-service call is made.
    ///
    /// # Errors
    ///
    /// - [`ConfigurationError::UnsearchableKeyName`] if the key name cannot be
    ///   derived without a document (per-document keys, or a custom function
    ///   that requires one). Raised before any key-service call.
    /// - Key-service and alignment failures; the filter is unchanged.
    pub async fn rewrite_query(&self, filter: &mut Value) -> Result<usize> {
        let leaves = collect_leaves(filter, self.policy());
        self.encrypt_leaves(filter, &leaves).await
    }

    /// Encrypt the filter leaves and the assigned values of an update in place.
    ///
    /// Both are sent in one batch under the collection key. On error neither
    /// `filter` nor `fields` is modified.
    ///
    /// # Errors
    ///
    /// As [`rewrite_query`](Self::rewrite_query).
    pub async fn rewrite_update(&self, filter: &mut Value, fields: &mut Map<String, Value>) -> Result<usize> {
        let mut combined = Value::Array(vec![filter.take(), Value::Object(std::mem::take(fields))]);
        let mut leaves = Vec::new();
        walk(&combined[0], "/0", self.policy(), &mut leaves);
        if let Value::Object(set) = &combined[1] {
            leaves.extend(
                collect_update_leaves(set, self.policy())
                    .into_iter()
                    .map(|leaf| QueryLeaf {
                        pointer: format!("/1{}", leaf.pointer),
                        ..leaf
                    }),
            );
        }

        let rewritten = self.encrypt_leaves(&mut combined, &leaves).await;

        if let Value::Array(mut parts) = combined {
            if let Some(Value::Object(set)) = parts.pop() {
                *fields = set;
            }
            if let Some(f) = parts.pop() {
                *filter = f;
            }
        }
        rewritten
    }

    async fn encrypt_leaves(&self, target: &mut Value, leaves: &[QueryLeaf]) -> Result<usize> {
        if leaves.is_empty() {
            return Ok(0);
        }

        let key_name = self
            .policy()
            .key_name()
            .derive(self.collection(), None)
            .map_err(|source| ConfigurationError::UnsearchableKeyName {
                field: leaves[0].field.clone(),
                source,
            })?;

        debug!(
            collection = %self.collection(),
            key_name = %key_name,
            leaves = leaves.len(),
            "rewriting query filter"
        );

        let request = TransitRequest {
            batch_input: leaves
                .iter()
                .map(|leaf| codec::encode_item(&leaf.field, &leaf.plaintext, Direction::Encrypt))
                .collect(),
            key_creation: self.policy().key_creation().clone(),
        };
        let response = self.key_service().encrypt(&key_name, request).await?;
        let ciphertexts =
            codec::decode_results(&response.data.batch_results, leaves.len(), Direction::Encrypt)?;

        for (leaf, ciphertext) in leaves.iter().zip(ciphertexts) {
            if let Some(slot) = target.pointer_mut(&leaf.pointer) {
                *slot = Value::String(ciphertext);
            }
        }
        Ok(leaves.len())
    }
}
