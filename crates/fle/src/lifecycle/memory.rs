//! [`MemoryStore`]: an in-memory [`DocumentStore`] with equality filters.
//!
//! Supported filter syntax: field equality (dotted keys), `$eq`, `$ne`, `$in`,
//! `$nin`, `$exists`, and the `$and` / `$or` / `$nor` combinators. An array
//! field matches a scalar when any element equals it.

use std::collections::HashMap;

use async_trait::async_trait;
use serde_json::{Map, Value};
use tokio::sync::RwLock;
use uuid::Uuid;

use super::store::{DocumentStore, StoreError};
use crate::path;

/// In-memory document store keyed by collection name.
#[derive(Debug, Default)]
pub struct MemoryStore {
    collections: RwLock<HashMap<String, Vec<Value>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw stored documents of `collection`, as the store sees them.
    pub async fn raw(&self, collection: &str) -> Vec<Value> {
        self.collections
            .read()
            .await
            .get(collection)
            .cloned()
            .unwrap_or_default()
    }
}

/// Whether `document` satisfies `filter`.
pub fn matches(document: &Value, filter: &Value) -> bool {
    let Value::Object(conditions) = filter else {
        return false;
    };
    conditions.iter().all(|(key, condition)| match key.as_str() {
        "$and" => each(condition, |f| matches(document, f), true),
        "$or" => each(condition, |f| matches(document, f), false),
        "$nor" => !each(condition, |f| matches(document, f), false),
        _ => field_matches(path::get(document, key), condition),
    })
}

/// `all` (when `every`) or `any` over an array of sub-filters.
fn each(list: &Value, pred: impl Fn(&Value) -> bool, every: bool) -> bool {
    match list {
        Value::Array(items) if every => items.iter().all(pred),
        Value::Array(items) => items.iter().any(pred),
        _ => false,
    }
}

fn field_matches(actual: Option<&Value>, condition: &Value) -> bool {
    match condition {
        Value::Object(ops) if !ops.is_empty() && ops.keys().all(|k| k.starts_with('$')) => {
            ops.iter().all(|(op, operand)| match op.as_str() {
                "$eq" => equals(actual, operand),
                "$ne" => !equals(actual, operand),
                "$in" => each(operand, |v| equals(actual, v), false),
                "$nin" => !each(operand, |v| equals(actual, v), false),
                "$exists" => actual.is_some() == operand.as_bool().unwrap_or(true),
                _ => false,
            })
        }
        _ => equals(actual, condition),
    }
}

fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        Some(Value::Array(items)) if !expected.is_array() => items.contains(expected),
        Some(value) => value == expected,
        None => expected.is_null(),
    }
}

fn id_of(document: &Value) -> Option<&Value> {
    document.get("_id")
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn insert(&self, collection: &str, mut document: Value) -> Result<Value, StoreError> {
        let Value::Object(map) = &mut document else {
            return Err(StoreError("document must be an object".into()));
        };
        map.entry("_id")
            .or_insert_with(|| Value::String(Uuid::new_v4().to_string()));

        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_owned()).or_default();
        if docs.iter().any(|d| id_of(d) == id_of(&document)) {
            return Err(StoreError(format!(
                "duplicate _id {}",
                id_of(&document).cloned().unwrap_or(Value::Null)
            )));
        }
        docs.push(document.clone());
        Ok(document)
    }

    async fn replace(&self, collection: &str, document: Value) -> Result<Value, StoreError> {
        if id_of(&document).is_none() {
            return self.insert(collection, document).await;
        }
        let mut collections = self.collections.write().await;
        let docs = collections.entry(collection.to_owned()).or_default();
        match docs.iter_mut().find(|d| id_of(d) == id_of(&document)) {
            Some(existing) => *existing = document.clone(),
            None => docs.push(document.clone()),
        }
        Ok(document)
    }

    async fn find(&self, collection: &str, filter: &Value) -> Result<Vec<Value>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().filter(|d| matches(d, filter)).cloned().collect())
            .unwrap_or_default())
    }

    async fn find_one(&self, collection: &str, filter: &Value) -> Result<Option<Value>, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .and_then(|docs| docs.iter().find(|d| matches(d, filter)).cloned()))
    }

    async fn count(&self, collection: &str, filter: &Value) -> Result<u64, StoreError> {
        let collections = self.collections.read().await;
        Ok(collections
            .get(collection)
            .map(|docs| docs.iter().filter(|d| matches(d, filter)).count() as u64)
            .unwrap_or(0))
    }

    async fn delete_many(&self, collection: &str, filter: &Value) -> Result<u64, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        let before = docs.len();
        docs.retain(|d| !matches(d, filter));
        Ok((before - docs.len()) as u64)
    }

    async fn update_many(
        &self,
        collection: &str,
        filter: &Value,
        fields: &Map<String, Value>,
    ) -> Result<u64, StoreError> {
        let mut collections = self.collections.write().await;
        let Some(docs) = collections.get_mut(collection) else {
            return Ok(0);
        };
        // Apply to copies first; the collection changes only if every document accepts the update.
        let mut updated = Vec::new();
        for (i, doc) in docs.iter().enumerate().filter(|(_, d)| matches(d, filter)) {
            let mut doc = doc.clone();
            for (field, value) in fields {
                if !path::insert(&mut doc, field, value.clone()) {
                    return Err(StoreError(format!("cannot set {field}")));
                }
            }
            updated.push((i, doc));
        }
        let modified = updated.len() as u64;
        for (i, doc) in updated {
            docs[i] = doc;
        }
        Ok(modified)
    }
}
