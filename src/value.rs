//! Caller-side values and documents.
//!
//! A [`Value`] is what an application reads and writes. Field types turn it into
//! the backend's tagged `AttributeValue` and back.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use aws_sdk_dynamodb::types::AttributeValue;
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Number;

/// A document as seen by the application, keyed by field name.
pub type Document = BTreeMap<String, Value>;

/// A document in the backend's wire format.
pub type WireDocument = HashMap<String, AttributeValue>;

/// A dynamically typed field value.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    /// Explicit absent marker.
    Null,
    Text(String),
    Number(Number),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Binary(Vec<u8>),
    Json(serde_json::Value),
    TextSet(Vec<String>),
    NumberSet(Vec<Number>),
    BinarySet(Vec<Vec<u8>>),
    /// A plain sequence, used for multi-operand conditions and coerced into sets.
    List(Vec<Value>),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Build a value from JSON without any schema knowledge.
    ///
    /// Objects stay JSON blobs; arrays become [`Value::List`].
    pub fn from_json(json: &serde_json::Value) -> Value {
        match json {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => Value::Number(n.clone()),
            serde_json::Value::String(s) => Value::Text(s.clone()),
            serde_json::Value::Array(items) => Value::List(items.iter().map(Value::from_json).collect()),
            serde_json::Value::Object(_) => Value::Json(json.clone()),
        }
    }

    /// Convert to JSON. Timestamps become RFC 3339 text and bytes become base64.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            Value::Null => serde_json::Value::Null,
            Value::Text(s) => serde_json::Value::String(s.clone()),
            Value::Number(n) => serde_json::Value::Number(n.clone()),
            Value::Bool(b) => serde_json::Value::Bool(*b),
            Value::Timestamp(t) => serde_json::Value::String(format_timestamp(t)),
            Value::Binary(b) => serde_json::Value::String(STANDARD.encode(b)),
            Value::Json(v) => v.clone(),
            Value::TextSet(items) => items.iter().cloned().map(serde_json::Value::String).collect(),
            Value::NumberSet(items) => items.iter().cloned().map(serde_json::Value::Number).collect(),
            Value::BinarySet(items) => items
                .iter()
                .map(|b| serde_json::Value::String(STANDARD.encode(b)))
                .collect(),
            Value::List(items) => items.iter().map(Value::to_json).collect(),
        }
    }

    /// Short name of the variant, for error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Text(_) => "text",
            Value::Number(_) => "number",
            Value::Bool(_) => "boolean",
            Value::Timestamp(_) => "timestamp",
            Value::Binary(_) => "binary",
            Value::Json(_) => "json",
            Value::TextSet(_) => "text set",
            Value::NumberSet(_) => "number set",
            Value::BinarySet(_) => "binary set",
            Value::List(_) => "list",
        }
    }
}

pub(crate) fn format_timestamp(t: &DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Text(s) => f.write_str(s),
            Value::Number(n) => write!(f, "{}", n),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Timestamp(t) => f.write_str(&format_timestamp(t)),
            other => write!(f, "{}", other.to_json()),
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_string())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

macro_rules! impl_from_integer {
    ($($t:ty),*) => {
        $(
            impl From<$t> for Value {
                fn from(value: $t) -> Self {
                    Value::Number(Number::from(value))
                }
            }
        )*
    };
}

impl_from_integer!(i32, i64, u32, u64);

impl From<f64> for Value {
    /// Non-finite floats have no number representation and become `Null`.
    fn from(value: f64) -> Self {
        Number::from_f64(value).map_or(Value::Null, Value::Number)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(value: DateTime<Utc>) -> Self {
        Value::Timestamp(value)
    }
}

impl From<Vec<u8>> for Value {
    fn from(value: Vec<u8>) -> Self {
        Value::Binary(value)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}

/// Build a [`Document`] from field/value pairs.
pub fn document<I, K, V>(pairs: I) -> Document
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<Value>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}
