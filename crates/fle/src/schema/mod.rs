//! Document schema metadata and selection of the fields to encrypt.
//!
//! # Responsibilities
//!
//! - Hold the flattened path metadata of a collection schema: dotted path,
//!   field type, and whether the path is indexed.
//! - Flatten a nested, mongoose-style schema definition into that metadata.
//! - Compute the canonical set of encrypted field paths ([`select_fields`]).
//!
//! # Module invariants
//!
//! - **No key-service dependency.** Nothing here may import `crate::transit`.

pub mod selector;

pub use selector::{select_fields, RESERVED_FIELDS};

use std::fmt;

use serde_json::{Map, Value};

use crate::error::ConfigurationError;

/// Declared type of a schema path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
    Buffer,
    ObjectId,
    Mixed,
    Array,
    Map,
}

impl FieldType {
    /// Parse a type name as written in a schema definition (case-insensitive).
    pub fn parse(name: &str) -> Option<Self> {
        let ty = match name.to_ascii_lowercase().as_str() {
            "string" => Self::String,
            "number" | "decimal128" | "int" | "double" => Self::Number,
            "boolean" | "bool" => Self::Boolean,
            "date" => Self::Date,
            "buffer" => Self::Buffer,
            "objectid" => Self::ObjectId,
            "mixed" | "object" => Self::Mixed,
            "array" => Self::Array,
            "map" => Self::Map,
            _ => return None,
        };
        Some(ty)
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::String => "String",
            Self::Number => "Number",
            Self::Boolean => "Boolean",
            Self::Date => "Date",
            Self::Buffer => "Buffer",
            Self::ObjectId => "ObjectId",
            Self::Mixed => "Mixed",
            Self::Array => "Array",
            Self::Map => "Map",
        };
        f.write_str(name)
    }
}

/// Metadata for one leaf path of a schema.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaPath {
    /// Dotted path, e.g. `"objectOfStrings.string1"`.
    pub path: String,
    pub field_type: FieldType,
    /// Whether the store maintains an index on this path.
    pub indexed: bool,
}

/// Flattened schema: every leaf path with its type and index flag.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    paths: Vec<SchemaPath>,
}

impl Schema {
    /// Create an empty schema.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add (or redefine) a non-indexed path.
    pub fn path(self, path: impl Into<String>, field_type: FieldType) -> Self {
        self.with_path(path, field_type, false)
    }

    /// Add (or redefine) an indexed path.
    pub fn indexed_path(self, path: impl Into<String>, field_type: FieldType) -> Self {
        self.with_path(path, field_type, true)
    }

    fn with_path(mut self, path: impl Into<String>, field_type: FieldType, indexed: bool) -> Self {
        let path = path.into();
        self.paths.retain(|p| p.path != path);
        self.paths.push(SchemaPath {
            path,
            field_type,
            indexed,
        });
        self
    }

    /// Flatten a nested schema definition.
    ///
    /// Accepted shapes per property:
    /// - `"String"`: shorthand type name.
    /// - `{ "type": "String", "index": true }`: typed leaf; `unique` also
    ///   counts as indexed.
    /// - `[ ... ]` or `{ "type": [ ... ] }`: array leaf.
    /// - `{ ... }` without `type`: nested object, flattened into dotted paths.
    ///   An empty object is a `Mixed` leaf.
    ///
    /// An `_id` path of type `ObjectId` is added unless the definition
    /// declares one.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigurationError::InvalidSchema`] for unknown type names or
    /// property values of an unsupported shape.
    pub fn from_definition(definition: &Value) -> Result<Self, ConfigurationError> {
        let Value::Object(root) = definition else {
            return Err(ConfigurationError::InvalidSchema {
                path: String::new(),
                reason: "definition must be an object".into(),
            });
        };

        let mut schema = Schema::new();
        walk_definition(root, "", &mut schema.paths)?;

        if schema.get("_id").is_none() {
            schema.paths.insert(
                0,
                SchemaPath {
                    path: "_id".into(),
                    field_type: FieldType::ObjectId,
                    indexed: true,
                },
            );
        }
        Ok(schema)
    }

    /// Look up the metadata of one path.
    pub fn get(&self, path: &str) -> Option<&SchemaPath> {
        self.paths.iter().find(|p| p.path == path)
    }

    /// All paths in declaration order.
    pub fn paths(&self) -> &[SchemaPath] {
        &self.paths
    }
}

/// Recursively flatten `definition`, appending discovered leaves to `out`.
fn walk_definition(
    definition: &Map<String, Value>,
    prefix: &str,
    out: &mut Vec<SchemaPath>,
) -> Result<(), ConfigurationError> {
    for (name, spec) in definition {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{prefix}.{name}")
        };

        match spec {
            Value::String(type_name) => {
                let field_type = parse_type(type_name, &path)?;
                out.push(SchemaPath {
                    path,
                    field_type,
                    indexed: false,
                });
            }
            Value::Array(_) => out.push(SchemaPath {
                path,
                field_type: FieldType::Array,
                indexed: false,
            }),
            Value::Object(props) if props.contains_key("type") => {
                let indexed = flag(props, "index") || flag(props, "unique");
                match &props["type"] {
                    Value::String(type_name) => {
                        let field_type = parse_type(type_name, &path)?;
                        out.push(SchemaPath {
                            path,
                            field_type,
                            indexed,
                        });
                    }
                    Value::Array(_) => out.push(SchemaPath {
                        path,
                        field_type: FieldType::Array,
                        indexed,
                    }),
                    // `{ type: { ... } }` declares a nested sub-document.
                    Value::Object(nested) => walk_definition(nested, &path, out)?,
                    other => {
                        return Err(ConfigurationError::InvalidSchema {
                            path,
                            reason: format!("unsupported type declaration {other}"),
                        })
                    }
                }
            }
            Value::Object(props) if props.is_empty() => out.push(SchemaPath {
                path,
                field_type: FieldType::Mixed,
                indexed: false,
            }),
            Value::Object(props) => walk_definition(props, &path, out)?,
            other => {
                return Err(ConfigurationError::InvalidSchema {
                    path,
                    reason: format!("unsupported property definition {other}"),
                })
            }
        }
    }
    Ok(())
}

fn parse_type(name: &str, path: &str) -> Result<FieldType, ConfigurationError> {
    FieldType::parse(name).ok_or_else(|| ConfigurationError::InvalidSchema {
        path: path.to_owned(),
        reason: format!("unknown type {name}"),
    })
}

fn flag(props: &Map<String, Value>, name: &str) -> bool {
    props.get(name).and_then(Value::as_bool).unwrap_or(false)
}
