//! Catalog item types.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Field carrying the unique identifier of a catalog item.
pub const ID_FIELD: &str = "id";

/// Field carrying the upstream file name of a catalog item.
pub const FILE_NAME_FIELD: &str = "file_name";

/// Unique identifier of a catalog item.
///
/// Upstream records use either integer or string ids. The two are kept
/// distinct: `1` and `"1"` are different identifiers.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ItemId {
    /// Integer identifier.
    Int(i64),
    /// String identifier.
    Str(String),
}

impl ItemId {
    /// Interpret a JSON value as an identifier.
    ///
    /// Only integers (that fit in `i64`) and strings qualify.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(Self::Int),
            Value::String(s) => Some(Self::Str(s.clone())),
            _ => None,
        }
    }
}

impl fmt::Display for ItemId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int(n) => write!(f, "{}", n),
            Self::Str(s) => write!(f, "{}", s),
        }
    }
}

impl From<i64> for ItemId {
    fn from(n: i64) -> Self {
        Self::Int(n)
    }
}

impl From<&str> for ItemId {
    fn from(s: &str) -> Self {
        Self::Str(s.to_string())
    }
}

/// One upstream catalog record.
///
/// The record is opaque apart from its `id` and `file_name` fields; all
/// other fields are carried through to the stored artifact untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CatalogItem(Map<String, Value>);

impl CatalogItem {
    /// Wrap a decoded JSON object.
    pub fn new(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    /// Build an item from a JSON value, if it is an object.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(fields) => Some(Self(fields)),
            _ => None,
        }
    }

    /// Raw field access.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    /// Identifier stored under `key`, if present and well-typed.
    pub fn id_by(&self, key: &str) -> Option<ItemId> {
        self.0.get(key).and_then(ItemId::from_value)
    }

    /// Identifier stored under the default `id` field.
    pub fn id(&self) -> Option<ItemId> {
        self.id_by(ID_FIELD)
    }

    /// Non-empty `file_name` field, if any.
    pub fn file_name(&self) -> Option<&str> {
        self.0
            .get(FILE_NAME_FIELD)
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// All fields.
    pub fn fields(&self) -> &Map<String, Value> {
        &self.0
    }

    /// Consume into the underlying JSON object.
    pub fn into_fields(self) -> Map<String, Value> {
        self.0
    }
}
