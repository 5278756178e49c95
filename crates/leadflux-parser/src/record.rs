use std::collections::HashMap;

use serde_json::{Map, Value};

use crate::timestamp::Timestamp;

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Null,
    Text(String),
    Timestamp(Timestamp),
    Details(Map<String, Value>),
}

/// One row of a source table, keyed by column name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: HashMap<String, FieldValue>,
}

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, column: impl Into<String>, value: FieldValue) {
        self.fields.insert(column.into(), value);
    }

    pub fn get(&self, column: &str) -> Option<&FieldValue> {
        self.fields.get(column)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Text value of a column. Absent, null and empty cells all read as `None`.
    pub fn text(&self, column: &str) -> Option<&str> {
        match self.fields.get(column) {
            Some(FieldValue::Text(value)) if !value.is_empty() => Some(value.as_str()),
            _ => None,
        }
    }

    pub fn owned_text(&self, column: &str) -> Option<String> {
        self.text(column).map(str::to_string)
    }

    pub fn timestamp(&self, column: &str) -> Option<Timestamp> {
        match self.fields.get(column) {
            Some(FieldValue::Timestamp(ts)) => Some(*ts),
            _ => None,
        }
    }

    pub fn details(&self, column: &str) -> Option<&Map<String, Value>> {
        match self.fields.get(column) {
            Some(FieldValue::Details(map)) => Some(map),
            _ => None,
        }
    }

    /// Reads `key` out of a parsed `*_details` column as text.
    pub fn detail_text(&self, column: &str, key: &str) -> Option<String> {
        match self.details(column)?.get(key)? {
            Value::Null => None,
            Value::String(value) => Some(value.clone()),
            other => Some(other.to_string()),
        }
    }
}
