//! Selection of the canonical set of encrypted field paths.

use tracing::warn;

use super::{FieldType, Schema};
use crate::error::ConfigurationError;

/// Identity and metadata fields that default selection never encrypts.
///
/// `_ct` is additionally stripped from explicit lists.
pub const RESERVED_FIELDS: [&str; 3] = ["_id", "_ct", "__v"];

const CIPHERTEXT_MARKER: &str = "_ct";

/// Compute the encrypted field paths for `schema`.
///
/// With an explicit list, every entry must name an existing string path;
/// indexed paths are accepted (a warning is logged). Without one, every
/// non-indexed string path is selected, minus [`RESERVED_FIELDS`] and
/// `exclude`.
///
/// The result is deduplicated and keeps first-seen order, so that two calls on
/// the same inputs produce the same sequence.
///
/// # Errors
///
/// - [`ConfigurationError::UnknownField`] if an explicit path is not in the schema.
/// - [`ConfigurationError::UnsupportedFieldType`] if an explicit path is not a string.
pub fn select_fields(
    schema: &Schema,
    explicit: Option<&[String]>,
    exclude: &[String],
) -> Result<Vec<String>, ConfigurationError> {
    let mut selected: Vec<String> = Vec::new();

    match explicit {
        Some(list) => {
            for path in list.iter().filter(|p| p.as_str() != CIPHERTEXT_MARKER) {
                let meta = schema
                    .get(path)
                    .ok_or_else(|| ConfigurationError::UnknownField(path.clone()))?;
                if meta.field_type != FieldType::String {
                    return Err(ConfigurationError::UnsupportedFieldType {
                        path: path.clone(),
                        actual: meta.field_type,
                    });
                }
                if meta.indexed {
                    warn!(field = %path, "explicitly encrypting an indexed field");
                }
                if !selected.contains(path) {
                    selected.push(path.clone());
                }
            }
        }
        None => {
            for meta in schema.paths() {
                let eligible = meta.field_type == FieldType::String
                    && !meta.indexed
                    && !RESERVED_FIELDS.contains(&meta.path.as_str())
                    && !exclude.contains(&meta.path);
                if eligible && !selected.contains(&meta.path) {
                    selected.push(meta.path.clone());
                }
            }
        }
    }

    Ok(selected)
}
