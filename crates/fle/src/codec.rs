//! Batch codec: document fields ⇄ transit batch items.
//!
//! The key service answers with results in request order and no field labels,
//! so [`to_batch`] and [`from_batch`] must agree on which fields are present.
//! Both use [`present_fields`], which keeps the policy order and skips absent,
//! non-string and empty values. Calling them on the same unmodified document
//! therefore yields aligned positions.
//!
//! # Payload encoding
//!
//! | direction | request payload            | response payload             |
//! |-----------|----------------------------|------------------------------|
//! | encrypt   | base64(UTF-8 plaintext)    | opaque ciphertext token      |
//! | decrypt   | ciphertext token, verbatim | base64(UTF-8 plaintext)      |
//!
//! The context of every item is base64(UTF-8 field path).

use base64::{engine::general_purpose::STANDARD, Engine as _};
use common::protocol::{TransitBatchItem, TransitBatchResult};
use serde_json::Value;

use crate::error::{FleError, Result};
use crate::path;

/// Which way a batch goes through the key service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Plaintext to ciphertext.
    Encrypt,
    /// Ciphertext to plaintext.
    Decrypt,
}

impl Direction {
    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Encrypt => "encrypt",
            Direction::Decrypt => "decrypt",
        }
    }
}

/// Derive the batch context for a field path.
pub fn encode_context(path: &str) -> String {
    STANDARD.encode(path.as_bytes())
}

/// Build one batch item for `value` at `path`.
pub fn encode_item(path: &str, value: &str, direction: Direction) -> TransitBatchItem {
    let context = encode_context(path);
    match direction {
        Direction::Encrypt => TransitBatchItem::plaintext(context, STANDARD.encode(value.as_bytes())),
        Direction::Decrypt => TransitBatchItem::ciphertext(context, value),
    }
}

/// Policy fields of `document` that currently hold a non-empty string, in
/// policy order, paired with their value.
pub fn present_fields<'a>(document: &'a Value, fields: &'a [String]) -> Vec<(&'a str, &'a str)> {
    fields
        .iter()
        .filter_map(|f| path::present_str(document, f).map(|v| (f.as_str(), v)))
        .collect()
}

/// Build the ordered batch for `fields` of `document`.
pub fn to_batch(document: &Value, fields: &[String], direction: Direction) -> Vec<TransitBatchItem> {
    present_fields(document, fields)
        .into_iter()
        .map(|(path, value)| encode_item(path, value, direction))
        .collect()
}

/// Decode an ordered result list into field values.
///
/// # Errors
///
/// - [`FleError::AlignmentViolation`] if `results.len() != expected`.
/// - [`FleError::MalformedPayload`] if an item lacks the payload for
///   `direction`, or a plaintext is not base64 of UTF-8.
pub fn decode_results(
    results: &[TransitBatchResult],
    expected: usize,
    direction: Direction,
) -> Result<Vec<String>> {
    if results.len() != expected {
        return Err(FleError::AlignmentViolation {
            expected,
            actual: results.len(),
        });
    }

    results
        .iter()
        .enumerate()
        .map(|(index, result)| match direction {
            Direction::Encrypt => result.ciphertext.clone().ok_or_else(|| FleError::MalformedPayload {
                index,
                reason: "missing ciphertext".into(),
            }),
            Direction::Decrypt => {
                let encoded = result.plaintext.as_deref().ok_or_else(|| FleError::MalformedPayload {
                    index,
                    reason: "missing plaintext".into(),
                })?;
                let raw = STANDARD.decode(encoded).map_err(|e| FleError::MalformedPayload {
                    index,
                    reason: format!("plaintext is not base64: {e}"),
                })?;
                String::from_utf8(raw).map_err(|_| FleError::MalformedPayload {
                    index,
                    reason: "plaintext is not UTF-8".into(),
                })
            }
        })
        .collect()
}

/// Scatter `results` back onto `document`.
///
/// Re-resolves the present fields exactly like [`to_batch`], decodes every
/// result first, and only then writes. On error the document is unchanged.
///
/// Returns the number of fields written.
pub fn from_batch(
    document: &mut Value,
    results: &[TransitBatchResult],
    fields: &[String],
    direction: Direction,
) -> Result<usize> {
    let paths: Vec<String> = present_fields(document, fields)
        .into_iter()
        .map(|(path, _)| path.to_owned())
        .collect();

    let values = decode_results(results, paths.len(), direction)?;

    for (path, value) in paths.iter().zip(values) {
        path::replace_str(document, path, value);
    }
    Ok(paths.len())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields() -> Vec<String> {
        ["firstName", "emptyString", "missing", "num", "objectOfStrings.string1"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn doc() -> Value {
        json!({
            "firstName": "Max",
            "emptyString": "",
            "num": 42,
            "objectOfStrings": {"string1": "content1"}
        })
    }

    fn ct(token: &str) -> TransitBatchResult {
        TransitBatchResult {
            ciphertext: Some(token.into()),
            ..Default::default()
        }
    }

    #[test]
    fn context_is_base64_of_path() {
        assert_eq!(encode_context("firstName"), "Zmlyc3ROYW1l");
    }

    #[test]
    fn to_batch_skips_absent_empty_and_non_strings() {
        let items = to_batch(&doc(), &fields(), Direction::Encrypt);
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].context, encode_context("firstName"));
        assert_eq!(items[0].plaintext.as_deref(), Some("TWF4"));
        assert_eq!(items[1].context, encode_context("objectOfStrings.string1"));
        assert!(items.iter().all(|i| i.ciphertext.is_none()));
    }

    #[test]
    fn decrypt_items_pass_ciphertext_through() {
        let d = json!({"firstName": "vault:v1:abc"});
        let items = to_batch(&d, &fields(), Direction::Decrypt);
        assert_eq!(items[0].ciphertext.as_deref(), Some("vault:v1:abc"));
        assert!(items[0].plaintext.is_none());
    }

    #[test]
    fn from_batch_assigns_positionally() {
        let mut d = doc();
        let n = from_batch(&mut d, &[ct("vault:v1:a"), ct("vault:v1:b")], &fields(), Direction::Encrypt).unwrap();
        assert_eq!(n, 2);
        assert_eq!(d["firstName"], "vault:v1:a");
        assert_eq!(d["objectOfStrings"]["string1"], "vault:v1:b");
        assert_eq!(d["emptyString"], "");
        assert_eq!(d["num"], 42);
    }

    #[test]
    fn from_batch_decodes_plaintext() {
        let mut d = json!({"firstName": "vault:v1:a"});
        let result = TransitBatchResult {
            plaintext: Some("TWF4".into()),
            ..Default::default()
        };
        from_batch(&mut d, &[result], &fields(), Direction::Decrypt).unwrap();
        assert_eq!(d["firstName"], "Max");
    }

    #[test]
    fn length_mismatch_is_an_alignment_violation_and_writes_nothing() {
        let mut d = doc();
        let before = d.clone();
        let err = from_batch(&mut d, &[ct("vault:v1:a")], &fields(), Direction::Encrypt).unwrap_err();
        assert!(matches!(err, FleError::AlignmentViolation { expected: 2, actual: 1 }));
        assert_eq!(d, before);
    }

    #[test]
    fn malformed_item_writes_nothing() {
        let mut d = doc();
        let before = d.clone();
        let err = from_batch(
            &mut d,
            &[ct("vault:v1:a"), TransitBatchResult::default()],
            &fields(),
            Direction::Encrypt,
        )
        .unwrap_err();
        assert!(matches!(err, FleError::MalformedPayload { index: 1, .. }));
        assert_eq!(d, before);
    }

    #[test]
    fn invalid_base64_plaintext_is_malformed() {
        let result = TransitBatchResult {
            plaintext: Some("***".into()),
            ..Default::default()
        };
        let err = decode_results(&[result], 1, Direction::Decrypt).unwrap_err();
        assert!(matches!(err, FleError::MalformedPayload { index: 0, .. }));
    }
}
