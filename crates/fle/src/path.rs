//! Dotted-path resolution over JSON documents.
//!
//! A path such as `"objectOfStrings.string1"` walks nested objects one segment
//! at a time. Arrays are never traversed: a segment that lands on an array
//! (or any other non-object) resolves to nothing.

use serde_json::{Map, Value};

/// Split a dotted path into its segments.
fn segments(path: &str) -> impl Iterator<Item = &str> {
    path.split('.')
}

/// Return the value stored at `path`, if every intermediate segment is an object.
pub fn get<'a>(document: &'a Value, path: &str) -> Option<&'a Value> {
    segments(path).try_fold(document, |node, segment| match node {
        Value::Object(map) => map.get(segment),
        _ => None,
    })
}

/// Mutable counterpart of [`get`].
pub fn get_mut<'a>(document: &'a mut Value, path: &str) -> Option<&'a mut Value> {
    segments(path).try_fold(document, |node, segment| match node {
        Value::Object(map) => map.get_mut(segment),
        _ => None,
    })
}

/// Return the string stored at `path`, or `None` when absent or not a string.
pub fn get_str<'a>(document: &'a Value, path: &str) -> Option<&'a str> {
    get(document, path).and_then(Value::as_str)
}

/// Return the string at `path` only when it is non-empty.
///
/// This is the presence test used on both sides of a batch exchange: a field
/// takes part in a batch exactly when this returns `Some`.
pub fn present_str<'a>(document: &'a Value, path: &str) -> Option<&'a str> {
    get_str(document, path).filter(|s| !s.is_empty())
}

/// Overwrite an existing string leaf at `path`.
///
/// Returns `false` and leaves the document untouched if the path does not
/// currently resolve to a string.
pub fn replace_str(document: &mut Value, path: &str, value: String) -> bool {
    match get_mut(document, path) {
        Some(slot @ Value::String(_)) => {
            *slot = Value::String(value);
            true
        }
        _ => false,
    }
}

/// Write `value` at `path`, creating intermediate objects as needed.
///
/// Returns `false` if an intermediate segment exists but is not an object.
pub fn insert(document: &mut Value, path: &str, value: Value) -> bool {
    let mut parts: Vec<&str> = segments(path).collect();
    let Some(last) = parts.pop() else {
        return false;
    };

    let mut node = document;
    for segment in parts {
        let Value::Object(map) = node else {
            return false;
        };
        node = map
            .entry(segment.to_owned())
            .or_insert_with(|| Value::Object(Map::new()));
    }

    match node {
        Value::Object(map) => {
            map.insert(last.to_owned(), value);
            true
        }
        _ => false,
    }
}
