//! Dynamic value type carried through execution contexts.
//!
//! Wraps `serde_json::Value` to give node implementations a single dynamic
//! payload type with cheap kind classification for port validation.

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use std::fmt;

/// Classification of a [`Value`], used by field validators.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValueKind {
    /// JSON null.
    Null,
    /// Boolean.
    Bool,
    /// Integer or floating-point number.
    Number,
    /// UTF-8 string.
    String,
    /// Ordered sequence of values.
    Array,
    /// String-keyed map of values.
    Object,
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Number => "number",
            Self::String => "string",
            Self::Array => "array",
            Self::Object => "object",
        };
        write!(f, "{name}")
    }
}

/// Dynamic value passed between nodes through contexts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Value(pub JsonValue);

impl Value {
    /// Create a null value.
    #[must_use]
    pub fn null() -> Self {
        Self(JsonValue::Null)
    }

    /// Create a boolean value.
    #[must_use]
    pub fn bool(v: bool) -> Self {
        Self(JsonValue::Bool(v))
    }

    /// Create an integer value.
    #[must_use]
    pub fn int(v: i64) -> Self {
        Self(JsonValue::Number(v.into()))
    }

    /// Create a floating-point value.
    ///
    /// Non-finite floats collapse to null, mirroring JSON semantics.
    #[must_use]
    pub fn float(v: f64) -> Self {
        Self(serde_json::Number::from_f64(v).map_or(JsonValue::Null, JsonValue::Number))
    }

    /// Create a string value.
    #[must_use]
    pub fn string(v: impl Into<String>) -> Self {
        Self(JsonValue::String(v.into()))
    }

    /// Get the kind of this value.
    #[must_use]
    pub fn kind(&self) -> ValueKind {
        match &self.0 {
            JsonValue::Null => ValueKind::Null,
            JsonValue::Bool(_) => ValueKind::Bool,
            JsonValue::Number(_) => ValueKind::Number,
            JsonValue::String(_) => ValueKind::String,
            JsonValue::Array(_) => ValueKind::Array,
            JsonValue::Object(_) => ValueKind::Object,
        }
    }

    /// Check if the value is null.
    #[must_use]
    pub fn is_null(&self) -> bool {
        self.0.is_null()
    }

    /// Interpret as a bool, if it is one.
    #[must_use]
    pub fn as_bool(&self) -> Option<bool> {
        self.0.as_bool()
    }

    /// Interpret as an i64, if it is a number representable as one.
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        self.0.as_i64()
    }

    /// Interpret as an f64, if it is a number.
    #[must_use]
    pub fn as_f64(&self) -> Option<f64> {
        self.0.as_f64()
    }

    /// Interpret as a string slice, if it is a string.
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        self.0.as_str()
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Self::bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Self::int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Self::float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Self::string(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Self::string(v)
    }
}

impl From<JsonValue> for Value {
    fn from(v: JsonValue) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_classification() {
        assert_eq!(Value::null().kind(), ValueKind::Null);
        assert_eq!(Value::bool(true).kind(), ValueKind::Bool);
        assert_eq!(Value::int(7).kind(), ValueKind::Number);
        assert_eq!(Value::float(1.5).kind(), ValueKind::Number);
        assert_eq!(Value::string("hi").kind(), ValueKind::String);
        assert_eq!(Value(serde_json::json!([1, 2])).kind(), ValueKind::Array);
        assert_eq!(Value(serde_json::json!({"a": 1})).kind(), ValueKind::Object);
    }

    #[test]
    fn accessors() {
        assert_eq!(Value::int(42).as_i64(), Some(42));
        assert_eq!(Value::int(42).as_f64(), Some(42.0));
        assert_eq!(Value::bool(false).as_bool(), Some(false));
        assert_eq!(Value::string("x").as_str(), Some("x"));
        assert_eq!(Value::string("x").as_bool(), None);
    }

    #[test]
    fn non_finite_float_is_null() {
        assert!(Value::float(f64::NAN).is_null());
    }
}
