//! Result row model

use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;

/// A single result row: field name mapped to a JSON value.
///
/// Field ordering is carried by the [`FieldCatalog`](crate::models::FieldCatalog),
/// not by the row itself.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Row {
    values: HashMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Get a field value; `None` when the field is absent from the row
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.values.get(field)
    }

    /// Set a field value, replacing any previous one
    pub fn set(&mut self, field: &str, value: Value) {
        self.values.insert(field.to_string(), value);
    }

    /// Whether the field is present in the row at all
    pub fn contains(&self, field: &str) -> bool {
        self.values.contains_key(field)
    }

    /// Whether the field is absent or SQL NULL
    pub fn is_null(&self, field: &str) -> bool {
        matches!(self.values.get(field), None | Some(Value::Null))
    }

    /// Integer accessor
    pub fn as_i64(&self, field: &str) -> Option<i64> {
        self.values.get(field).and_then(Value::as_i64)
    }

    /// String accessor
    pub fn as_str(&self, field: &str) -> Option<&str> {
        self.values.get(field).and_then(Value::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl FromIterator<(String, Value)> for Row {
    fn from_iter<I: IntoIterator<Item = (String, Value)>>(iter: I) -> Self {
        Self {
            values: iter.into_iter().collect(),
        }
    }
}
