//! Field values and record data
//!
//! This module defines:
//! - Value: tagged union over the four field value types
//! - RecordData: an ordered field-name → Value mapping
//!
//! ## Value Model
//!
//! Record fields carry exactly four types: Null, Bool, Int, Text. There are
//! no implicit coercions; `Int(1)` and `Text("1")` are never equal. The
//! accessors return `Option` and refuse cross-type reads, with the single
//! documented exception of `coerce_int`, which parses numeric text because
//! relation uid lists arrive as comma-separated text fields.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Tagged field value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Value {
    /// Null / absent value
    Null,
    /// Boolean value
    Bool(bool),
    /// 64-bit signed integer
    Int(i64),
    /// UTF-8 text
    Text(String),
}

impl Value {
    /// Get the type name as a string
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "Null",
            Value::Bool(_) => "Bool",
            Value::Int(_) => "Int",
            Value::Text(_) => "Text",
        }
    }

    /// Check if this is a null value
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Get as bool if this is a Bool value
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get as i64 if this is an Int value
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get as &str if this is a Text value
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Get as i64, parsing numeric text
    ///
    /// Relation uid lists are stored as comma-separated text; this is the
    /// one sanctioned place where text reads as a number.
    pub fn coerce_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Text(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Render the value the way it is written into a store field
    pub fn to_field_string(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Bool(b) => if *b { "1" } else { "0" }.to_string(),
            Value::Int(i) => i.to_string(),
            Value::Text(s) => s.clone(),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// Ordered field map of one record row
///
/// Field order is deterministic (sorted by name) so serialized archives are
/// reproducible. The owning table name is carried by the caller and drives
/// schema lookups; RecordData itself is schema-unaware storage.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordData {
    fields: BTreeMap<String, Value>,
}

impl RecordData {
    /// Create an empty field map
    pub fn new() -> Self {
        Self::default()
    }

    /// Set a field value, replacing any previous value
    pub fn set(&mut self, name: impl Into<String>, value: impl Into<Value>) {
        self.fields.insert(name.into(), value.into());
    }

    /// Builder-style set
    pub fn with(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.set(name, value);
        self
    }

    /// Get a field value
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Get a text field
    pub fn text(&self, name: &str) -> Option<&str> {
        self.fields.get(name).and_then(Value::as_text)
    }

    /// Get an integer field, parsing numeric text
    pub fn int(&self, name: &str) -> Option<i64> {
        self.fields.get(name).and_then(Value::coerce_int)
    }

    /// The record's own uid, from the `uid` field
    pub fn uid(&self) -> Option<i64> {
        self.int("uid")
    }

    /// The record's parent page id, from the `pid` field
    pub fn pid(&self) -> Option<i64> {
        self.int("pid")
    }

    /// Remove a field, returning its previous value
    pub fn remove(&mut self, name: &str) -> Option<Value> {
        self.fields.remove(name)
    }

    /// True if the field exists
    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Iterate fields in deterministic (name) order
    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.fields.iter()
    }

    /// Field names in deterministic order
    pub fn field_names(&self) -> impl Iterator<Item = &String> {
        self.fields.keys()
    }

    /// Number of fields
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True if there are no fields
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl FromIterator<(String, Value)> for RecordData {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Self {
            fields: iter.into_iter().collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_implicit_coercion() {
        assert_ne!(Value::Int(1), Value::Text("1".to_string()));
        assert_eq!(Value::Int(1).as_text(), None);
        assert_eq!(Value::Text("x".into()).as_int(), None);
    }

    #[test]
    fn test_coerce_int_parses_text() {
        assert_eq!(Value::Text(" 42 ".into()).coerce_int(), Some(42));
        assert_eq!(Value::Text("nope".into()).coerce_int(), None);
        assert_eq!(Value::Int(7).coerce_int(), Some(7));
        assert_eq!(Value::Bool(true).coerce_int(), None);
    }

    #[test]
    fn test_to_field_string() {
        assert_eq!(Value::Null.to_field_string(), "");
        assert_eq!(Value::Bool(true).to_field_string(), "1");
        assert_eq!(Value::Int(-3).to_field_string(), "-3");
        assert_eq!(Value::Text("abc".into()).to_field_string(), "abc");
    }

    #[test]
    fn test_record_data_accessors() {
        let row = RecordData::new()
            .with("uid", 12)
            .with("pid", 3)
            .with("title", "Home");

        assert_eq!(row.uid(), Some(12));
        assert_eq!(row.pid(), Some(3));
        assert_eq!(row.text("title"), Some("Home"));
        assert_eq!(row.int("missing"), None);
    }

    #[test]
    fn test_field_order_is_deterministic() {
        let mut a = RecordData::new();
        a.set("zeta", 1);
        a.set("alpha", 2);
        let names: Vec<_> = a.field_names().cloned().collect();
        assert_eq!(names, vec!["alpha".to_string(), "zeta".to_string()]);
    }

    #[test]
    fn test_serde_roundtrip() {
        let row = RecordData::new().with("uid", 1).with("title", "t");
        let json = serde_json::to_string(&row).unwrap();
        let back: RecordData = serde_json::from_str(&json).unwrap();
        assert_eq!(row, back);
    }
}
