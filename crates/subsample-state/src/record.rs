//! Record model shared by every store.
//!
//! A [`Record`] is one row of one entity type: an [`Identifier`] plus a flat
//! field map. Relations are never embedded in the field map; they are
//! described by [`crate::RelationDescriptor`] and expanded separately.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::StorageError;

/// Column values of a record, excluding the primary key.
pub type FieldMap = serde_json::Map<String, Value>;

/// Record identifier.
///
/// Integer and text keys are both accepted. Identifiers are totally ordered
/// so stores can return deterministic pages.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Identifier {
    Int(i64),
    Text(String),
}

impl Identifier {
    /// Interpret a column value as an identifier.
    ///
    /// `null` means "no reference" and yields `Ok(None)`. Floats, booleans,
    /// arrays and objects are rejected.
    pub fn try_from_value(value: &Value) -> Result<Option<Self>, StorageError> {
        match value {
            Value::Null => Ok(None),
            Value::Number(n) => n
                .as_i64()
                .map(|i| Some(Identifier::Int(i)))
                .ok_or_else(|| StorageError::InvalidIdentifier {
                    value: n.to_string(),
                }),
            Value::String(s) if !s.is_empty() => Ok(Some(Identifier::Text(s.clone()))),
            other => Err(StorageError::InvalidIdentifier {
                value: other.to_string(),
            }),
        }
    }

    /// JSON representation used when writing foreign-key columns.
    pub fn to_value(&self) -> Value {
        match self {
            Identifier::Int(i) => Value::from(*i),
            Identifier::Text(s) => Value::from(s.clone()),
        }
    }
}

impl From<i64> for Identifier {
    fn from(value: i64) -> Self {
        Identifier::Int(value)
    }
}

impl From<i32> for Identifier {
    fn from(value: i32) -> Self {
        Identifier::Int(i64::from(value))
    }
}

impl From<&str> for Identifier {
    fn from(value: &str) -> Self {
        Identifier::Text(value.to_string())
    }
}

impl From<String> for Identifier {
    fn from(value: String) -> Self {
        Identifier::Text(value)
    }
}

impl fmt::Display for Identifier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Identifier::Int(i) => write!(f, "{i}"),
            Identifier::Text(s) => write!(f, "{s}"),
        }
    }
}

/// `(entity type, identifier)` pair naming one record across a run.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RecordKey {
    pub entity: String,
    pub id: Identifier,
}

impl RecordKey {
    pub fn new(entity: impl Into<String>, id: impl Into<Identifier>) -> Self {
        Self {
            entity: entity.into(),
            id: id.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.entity, self.id)
    }
}

/// One row of one entity type.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    /// Entity type name (not the table name)
    pub entity: String,
    /// Primary key value
    pub id: Identifier,
    /// Column values, primary key excluded
    pub fields: FieldMap,
}

impl Record {
    pub fn new(entity: impl Into<String>, id: impl Into<Identifier>, fields: FieldMap) -> Self {
        Self {
            entity: entity.into(),
            id: id.into(),
            fields,
        }
    }

    pub fn key(&self) -> RecordKey {
        RecordKey {
            entity: self.entity.clone(),
            id: self.id.clone(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields.get(column)
    }

    /// Read a foreign-key column. Absent and `null` columns both yield `None`.
    pub fn foreign_key(&self, column: &str) -> Result<Option<Identifier>, StorageError> {
        match self.fields.get(column) {
            Some(value) => Identifier::try_from_value(value),
            None => Ok(None),
        }
    }
}

/// Build a [`FieldMap`] from a `serde_json::json!({...})` object literal.
///
/// Non-object values produce an empty map.
pub fn field_map(value: Value) -> FieldMap {
    match value {
        Value::Object(map) => map,
        _ => FieldMap::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn identifier_from_json_values() {
        assert_eq!(
            Identifier::try_from_value(&json!(7)).unwrap(),
            Some(Identifier::Int(7))
        );
        assert_eq!(
            Identifier::try_from_value(&json!("abc")).unwrap(),
            Some(Identifier::Text("abc".into()))
        );
        assert_eq!(Identifier::try_from_value(&json!(null)).unwrap(), None);
        assert!(Identifier::try_from_value(&json!(1.5)).is_err());
        assert!(Identifier::try_from_value(&json!({"a": 1})).is_err());
    }

    #[test]
    fn identifier_serializes_untagged() {
        assert_eq!(serde_json::to_value(Identifier::Int(3)).unwrap(), json!(3));
        assert_eq!(
            serde_json::to_value(Identifier::from("x")).unwrap(),
            json!("x")
        );
    }

    #[test]
    fn foreign_key_reads_column() {
        let record = Record::new("Order", 10, field_map(json!({"userId": 1, "note": null})));
        assert_eq!(record.foreign_key("userId").unwrap(), Some(Identifier::Int(1)));
        assert_eq!(record.foreign_key("note").unwrap(), None);
        assert_eq!(record.foreign_key("missing").unwrap(), None);
    }

    #[test]
    fn record_key_display() {
        assert_eq!(RecordKey::new("User", 1).to_string(), "User:1");
    }
}
