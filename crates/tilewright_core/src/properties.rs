//! Typed property values and the string-keyed property bag

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

/// An RGBA color property value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }
}

/// A property value of one of the supported kinds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Value {
    Bool(bool),
    Int(i64),
    Float(f64),
    String(String),
    Color(Color),
    /// Reference to a file, stored as a path string
    File(String),
    /// Reference to a map object by id
    Object(u32),
}

impl Value {
    /// Name of this value's kind, for diagnostics
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::String(_) => "string",
            Value::Color(_) => "color",
            Value::File(_) => "file",
            Value::Object(_) => "object",
        }
    }

    /// Get value as boolean
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get value as integer
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            _ => None,
        }
    }

    /// Get value as float, accepting integer values as well
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(f) => Some(*f),
            Value::Int(i) => Some(*i as f64),
            _ => None,
        }
    }

    /// Get value as string reference
    pub fn as_string(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    /// Get value as color
    pub fn as_color(&self) -> Option<Color> {
        match self {
            Value::Color(c) => Some(*c),
            _ => None,
        }
    }

    /// Get value as file path reference
    pub fn as_file(&self) -> Option<&str> {
        match self {
            Value::File(p) => Some(p),
            _ => None,
        }
    }

    /// Get value as object-id reference
    pub fn as_object(&self) -> Option<u32> {
        match self {
            Value::Object(id) => Some(*id),
            _ => None,
        }
    }

    /// Convert from serde_json::Value, mapping numbers to Int or Float
    pub fn from_json(json: serde_json::Value) -> Option<Self> {
        match json {
            serde_json::Value::Bool(b) => Some(Value::Bool(b)),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Some(Value::Int(i))
                } else {
                    n.as_f64().map(Value::Float)
                }
            }
            serde_json::Value::String(s) => Some(Value::String(s)),
            _ => None,
        }
    }

    /// Convert to serde_json::Value
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Int(i) => serde_json::json!(*i),
            Value::Float(f) => serde_json::json!(*f),
            Value::String(s) | Value::File(s) => serde_json::Value::String(s.clone()),
            Value::Color(c) => {
                serde_json::Value::String(format!("#{:02x}{:02x}{:02x}{:02x}", c.a, c.r, c.g, c.b))
            }
            Value::Object(id) => serde_json::json!(*id),
        }
    }
}

// Convenience conversions
impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Int(i)
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Int(i as i64)
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Float(f)
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Color> for Value {
    fn from(c: Color) -> Self {
        Value::Color(c)
    }
}

/// Errors reported by the typed property accessors
#[derive(Debug, Error, PartialEq, Eq)]
pub enum PropertyError {
    #[error("property '{key}' expects {expected}, found {actual}")]
    TypeMismatch {
        key: String,
        expected: &'static str,
        actual: &'static str,
    },
}

/// A string-keyed bag of typed property values.
///
/// Attached to maps, layers, tilesets, and objects. The typed lookups match
/// keys ignoring ASCII case, the way editing tools write the well-known
/// keys, and distinguish an absent key (callers fall back to a default)
/// from a key that is present with the wrong type, which is a
/// [`PropertyError`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct Properties {
    values: HashMap<String, Value>,
}

impl Properties {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Look up a key ignoring ASCII case; used for the well-known
    /// automapping keys, which tools write with varying capitalization.
    pub fn get_ignore_case(&self, key: &str) -> Option<&Value> {
        self.values
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v)
    }

    pub fn set(&mut self, key: impl Into<String>, value: impl Into<Value>) {
        self.values.insert(key.into(), value.into());
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.values.remove(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.values.iter()
    }

    /// Typed bool lookup: `Ok(None)` when absent, error on a wrong type
    pub fn bool_value(&self, key: &str) -> Result<Option<bool>, PropertyError> {
        self.typed(key, "bool", Value::as_bool)
    }

    /// Typed int lookup: `Ok(None)` when absent, error on a wrong type
    pub fn int_value(&self, key: &str) -> Result<Option<i64>, PropertyError> {
        self.typed(key, "int", Value::as_int)
    }

    /// Typed string lookup: `Ok(None)` when absent, error on a wrong type
    pub fn string_value(&self, key: &str) -> Result<Option<&str>, PropertyError> {
        match self.get_ignore_case(key) {
            None => Ok(None),
            Some(value) => match value.as_string() {
                Some(s) => Ok(Some(s)),
                None => Err(PropertyError::TypeMismatch {
                    key: key.to_string(),
                    expected: "string",
                    actual: value.kind(),
                }),
            },
        }
    }

    fn typed<T>(
        &self,
        key: &str,
        expected: &'static str,
        convert: impl Fn(&Value) -> Option<T>,
    ) -> Result<Option<T>, PropertyError> {
        match self.get_ignore_case(key) {
            None => Ok(None),
            Some(value) => match convert(value) {
                Some(v) => Ok(Some(v)),
                None => Err(PropertyError::TypeMismatch {
                    key: key.to_string(),
                    expected,
                    actual: value.kind(),
                }),
            },
        }
    }
}
