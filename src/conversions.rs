//! Type conversions between application values and DynamoDB AttributeValue.
//!
//! Every schema field resolves to a [`FieldType`]: the wire tag it is stored
//! under plus an encode/decode pair. Built-in field types live in a
//! [`MapperRegistry`]; callers can override entries or supply their own pair.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use aws_sdk_dynamodb::primitives::Blob;
use aws_sdk_dynamodb::types::{AttributeValue, ScalarAttributeType};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use serde_json::Number;

use crate::errors::{Error, Result};
use crate::value::Value;

/// Wire tags a field can be stored under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WireTag {
    String,
    Number,
    Binary,
    StringSet,
    NumberSet,
    BinarySet,
}

impl WireTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            WireTag::String => "S",
            WireTag::Number => "N",
            WireTag::Binary => "B",
            WireTag::StringSet => "SS",
            WireTag::NumberSet => "NS",
            WireTag::BinarySet => "BS",
        }
    }

    /// Attribute type for key definitions. Sets cannot be keys.
    pub fn scalar_attribute_type(&self) -> Option<ScalarAttributeType> {
        match self {
            WireTag::String => Some(ScalarAttributeType::S),
            WireTag::Number => Some(ScalarAttributeType::N),
            WireTag::Binary => Some(ScalarAttributeType::B),
            _ => None,
        }
    }
}

/// Semantic type tags understood by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TypeTag {
    Text,
    Number,
    Boolean,
    Timestamp,
    Binary,
    Json,
    /// Fallback: stores anything as a string.
    Any,
}

impl TypeTag {
    /// Parse a tag name, accepting the common aliases.
    pub fn parse(name: &str) -> Option<TypeTag> {
        match name.to_ascii_lowercase().as_str() {
            "text" | "string" => Some(TypeTag::Text),
            "number" => Some(TypeTag::Number),
            "boolean" | "bool" => Some(TypeTag::Boolean),
            "timestamp" | "date" => Some(TypeTag::Timestamp),
            "binary" | "buffer" => Some(TypeTag::Binary),
            "json" => Some(TypeTag::Json),
            "any" | "default" => Some(TypeTag::Any),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TypeTag::Text => "text",
            TypeTag::Number => "number",
            TypeTag::Boolean => "boolean",
            TypeTag::Timestamp => "timestamp",
            TypeTag::Binary => "binary",
            TypeTag::Json => "json",
            TypeTag::Any => "any",
        }
    }
}

type EncodeFn = dyn Fn(&Value) -> Result<AttributeValue> + Send + Sync;
type DecodeFn = dyn Fn(&AttributeValue) -> Result<Value> + Send + Sync;

/// A resolved field type: wire tag plus encode/decode pair.
#[derive(Clone)]
pub struct FieldType {
    wire_tag: WireTag,
    encoder: Arc<EncodeFn>,
    decoder: Arc<DecodeFn>,
}

impl FieldType {
    /// Build a field type from an explicit encode/decode pair.
    pub fn new<E, D>(wire_tag: WireTag, encode: E, decode: D) -> Self
    where
        E: Fn(&Value) -> Result<AttributeValue> + Send + Sync + 'static,
        D: Fn(&AttributeValue) -> Result<Value> + Send + Sync + 'static,
    {
        FieldType {
            wire_tag,
            encoder: Arc::new(encode),
            decoder: Arc::new(decode),
        }
    }

    pub fn wire_tag(&self) -> WireTag {
        self.wire_tag
    }

    pub fn encode(&self, value: &Value) -> Result<AttributeValue> {
        (self.encoder)(value)
    }

    pub fn decode(&self, value: &AttributeValue) -> Result<Value> {
        (self.decoder)(value)
    }
}

impl fmt::Debug for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldType")
            .field("wire_tag", &self.wire_tag.as_str())
            .finish_non_exhaustive()
    }
}

/// How a field's type was declared, before resolution.
///
/// The variant order follows resolution precedence: an explicit pair wins over
/// a type option, which wins over a bare tag, then set-of-tag, then the JSON
/// shorthand.
#[derive(Debug, Clone)]
pub enum TypeSpec {
    Custom(FieldType),
    Tag(TypeTag),
    SetOf(TypeTag),
    JsonBlob,
}

/// Resolves type declarations to field types.
#[derive(Debug, Clone)]
pub struct MapperRegistry {
    scalars: HashMap<TypeTag, FieldType>,
    sets: HashMap<TypeTag, FieldType>,
}

static BUILTIN: Lazy<MapperRegistry> = Lazy::new(MapperRegistry::new);

impl MapperRegistry {
    /// A registry with every built-in field type.
    pub fn new() -> Self {
        let scalars = HashMap::from([
            (TypeTag::Text, FieldType::new(WireTag::String, encode_text, decode_text)),
            (TypeTag::Number, FieldType::new(WireTag::Number, encode_number, decode_number)),
            (TypeTag::Boolean, FieldType::new(WireTag::String, encode_boolean, decode_boolean)),
            (
                TypeTag::Timestamp,
                FieldType::new(WireTag::Number, encode_timestamp, decode_timestamp),
            ),
            (TypeTag::Binary, FieldType::new(WireTag::Binary, encode_binary, decode_binary)),
            (TypeTag::Json, FieldType::new(WireTag::String, encode_json, decode_json)),
            (TypeTag::Any, FieldType::new(WireTag::String, encode_any, decode_any)),
        ]);
        let sets = HashMap::from([
            (TypeTag::Text, FieldType::new(WireTag::StringSet, encode_text_set, decode_text_set)),
            (
                TypeTag::Number,
                FieldType::new(WireTag::NumberSet, encode_number_set, decode_number_set),
            ),
            (
                TypeTag::Binary,
                FieldType::new(WireTag::BinarySet, encode_binary_set, decode_binary_set),
            ),
        ]);
        MapperRegistry { scalars, sets }
    }

    /// The shared built-in registry.
    pub fn builtin() -> &'static MapperRegistry {
        &BUILTIN
    }

    /// Replace the scalar field type registered for `tag`.
    pub fn register(&mut self, tag: TypeTag, field_type: FieldType) -> &mut Self {
        self.scalars.insert(tag, field_type);
        self
    }

    /// Replace the set field type registered for `tag`.
    pub fn register_set(&mut self, tag: TypeTag, field_type: FieldType) -> &mut Self {
        self.sets.insert(tag, field_type);
        self
    }

    pub fn resolve(&self, field: &str, spec: &TypeSpec) -> Result<FieldType> {
        let resolved = match spec {
            TypeSpec::Custom(field_type) => Some(field_type.clone()),
            TypeSpec::Tag(tag) => self.scalars.get(tag).cloned(),
            TypeSpec::SetOf(tag) => self.sets.get(tag).cloned(),
            TypeSpec::JsonBlob => self.scalars.get(&TypeTag::Json).cloned(),
        };
        resolved.ok_or_else(|| {
            Error::schema(format!(
                "unable to map field \"{}\": no mapper can handle {}",
                field,
                describe_spec(spec)
            ))
        })
    }
}

impl Default for MapperRegistry {
    fn default() -> Self {
        Self::new()
    }
}

fn describe_spec(spec: &TypeSpec) -> String {
    match spec {
        TypeSpec::Custom(_) => "the custom mapper".to_string(),
        TypeSpec::Tag(tag) => format!("type \"{}\"", tag.name()),
        TypeSpec::SetOf(tag) => format!("a set of \"{}\"", tag.name()),
        TypeSpec::JsonBlob => "a JSON blob".to_string(),
    }
}

fn mismatch(expected: &str, value: &Value) -> Error {
    Error::validation(format!("expected {}, got {}", expected, value.kind()))
}

fn wrong_wire(expected: &str, value: &AttributeValue) -> Error {
    Error::validation(format!("expected {} attribute, got {:?}", expected, value))
}

fn parse_number(raw: &str) -> Result<Number> {
    serde_json::from_str::<Number>(raw.trim())
        .map_err(|_| Error::validation(format!("invalid number: {}", raw)))
}

fn decode_base64(raw: &str) -> Result<Vec<u8>> {
    STANDARD
        .decode(raw)
        .map_err(|e| Error::validation(format!("invalid base64 binary value: {}", e)))
}

// ========== SCALARS ==========

fn encode_text(value: &Value) -> Result<AttributeValue> {
    match value {
        Value::Text(s) => Ok(AttributeValue::S(s.clone())),
        Value::Number(_) | Value::Bool(_) | Value::Timestamp(_) => {
            Ok(AttributeValue::S(value.to_string()))
        }
        other => Err(mismatch("text", other)),
    }
}

fn decode_text(value: &AttributeValue) -> Result<Value> {
    match value {
        AttributeValue::S(s) => Ok(Value::Text(s.clone())),
        other => Err(wrong_wire("S", other)),
    }
}

fn encode_number(value: &Value) -> Result<AttributeValue> {
    match value {
        Value::Number(n) => Ok(AttributeValue::N(n.to_string())),
        Value::Text(s) => Ok(AttributeValue::N(parse_number(s)?.to_string())),
        other => Err(mismatch("number", other)),
    }
}

fn decode_number(value: &AttributeValue) -> Result<Value> {
    match value {
        AttributeValue::N(n) => Ok(Value::Number(parse_number(n)?)),
        other => Err(wrong_wire("N", other)),
    }
}

fn encode_boolean(value: &Value) -> Result<AttributeValue> {
    match value {
        Value::Bool(b) => Ok(AttributeValue::S(if *b { "Y" } else { "N" }.to_string())),
        other => Err(mismatch("boolean", other)),
    }
}

fn decode_boolean(value: &AttributeValue) -> Result<Value> {
    match value {
        AttributeValue::S(s) if s == "Y" => Ok(Value::Bool(true)),
        AttributeValue::S(s) if s == "N" => Ok(Value::Bool(false)),
        AttributeValue::S(_) => Ok(Value::Null),
        other => Err(wrong_wire("S", other)),
    }
}

fn encode_timestamp(value: &Value) -> Result<AttributeValue> {
    let millis = match value {
        Value::Timestamp(t) => t.timestamp_millis(),
        Value::Number(n) => n
            .as_i64()
            .ok_or_else(|| Error::validation(format!("timestamp must be whole milliseconds: {}", n)))?,
        Value::Text(s) => DateTime::parse_from_rfc3339(s)
            .map_err(|e| Error::validation(format!("invalid timestamp \"{}\": {}", s, e)))?
            .timestamp_millis(),
        other => return Err(mismatch("timestamp", other)),
    };
    Ok(AttributeValue::N(millis.to_string()))
}

fn decode_timestamp(value: &AttributeValue) -> Result<Value> {
    match value {
        AttributeValue::N(n) => {
            let millis: i64 = n
                .parse()
                .map_err(|_| Error::validation(format!("invalid timestamp: {}", n)))?;
            DateTime::<Utc>::from_timestamp_millis(millis)
                .map(Value::Timestamp)
                .ok_or_else(|| Error::validation(format!("timestamp out of range: {}", n)))
        }
        other => Err(wrong_wire("N", other)),
    }
}

fn encode_binary(value: &Value) -> Result<AttributeValue> {
    match value {
        Value::Binary(b) => Ok(AttributeValue::B(Blob::new(b.clone()))),
        Value::Text(s) => Ok(AttributeValue::B(Blob::new(decode_base64(s)?))),
        other => Err(mismatch("binary", other)),
    }
}

fn decode_binary(value: &AttributeValue) -> Result<Value> {
    match value {
        AttributeValue::B(b) => Ok(Value::Binary(b.as_ref().to_vec())),
        other => Err(wrong_wire("B", other)),
    }
}

fn encode_json(value: &Value) -> Result<AttributeValue> {
    let json = value.to_json();
    serde_json::to_string(&json)
        .map(AttributeValue::S)
        .map_err(|e| Error::validation(format!("failed to serialize JSON value: {}", e)))
}

fn decode_json(value: &AttributeValue) -> Result<Value> {
    match value {
        AttributeValue::S(s) => serde_json::from_str(s)
            .map(Value::Json)
            .map_err(|e| Error::validation(format!("invalid JSON payload: {}", e))),
        other => Err(wrong_wire("S", other)),
    }
}

/// Fallback: anything non-null is stored as its string form.
fn encode_any(value: &Value) -> Result<AttributeValue> {
    match value {
        Value::Null => Err(mismatch("a value", value)),
        other => Ok(AttributeValue::S(other.to_string())),
    }
}

/// Fallback: return whichever wire variant is populated.
fn decode_any(value: &AttributeValue) -> Result<Value> {
    match value {
        AttributeValue::S(s) => Ok(Value::Text(s.clone())),
        AttributeValue::N(n) => Ok(Value::Number(parse_number(n)?)),
        AttributeValue::B(b) => Ok(Value::Binary(b.as_ref().to_vec())),
        AttributeValue::Ss(ss) => Ok(Value::TextSet(ss.clone())),
        AttributeValue::Ns(ns) => Ok(Value::NumberSet(
            ns.iter().map(|n| parse_number(n)).collect::<Result<Vec<_>>>()?,
        )),
        AttributeValue::Bs(bs) => Ok(Value::BinarySet(
            bs.iter().map(|b| b.as_ref().to_vec()).collect(),
        )),
        AttributeValue::Bool(b) => Ok(Value::Bool(*b)),
        AttributeValue::Null(_) => Ok(Value::Null),
        other => Err(Error::validation(format!(
            "unsupported attribute value: {:?}",
            other
        ))),
    }
}

// ========== SETS ==========

fn non_empty<T>(items: Vec<T>) -> Result<Vec<T>> {
    if items.is_empty() {
        return Err(Error::validation("DynamoDB does not support empty sets"));
    }
    Ok(items)
}

fn encode_text_set(value: &Value) -> Result<AttributeValue> {
    let items = match value {
        Value::TextSet(items) => items.clone(),
        Value::List(items) => items
            .iter()
            .map(|item| match item {
                Value::Text(s) => Ok(s.clone()),
                other => Err(mismatch("text set element", other)),
            })
            .collect::<Result<Vec<_>>>()?,
        other => return Err(mismatch("text set", other)),
    };
    Ok(AttributeValue::Ss(non_empty(items)?))
}

fn decode_text_set(value: &AttributeValue) -> Result<Value> {
    match value {
        AttributeValue::Ss(ss) => Ok(Value::TextSet(ss.clone())),
        other => Err(wrong_wire("SS", other)),
    }
}

fn encode_number_set(value: &Value) -> Result<AttributeValue> {
    let items = match value {
        Value::NumberSet(items) => items.iter().map(Number::to_string).collect(),
        Value::List(items) => items
            .iter()
            .map(|item| match item {
                Value::Number(n) => Ok(n.to_string()),
                Value::Text(s) => Ok(parse_number(s)?.to_string()),
                other => Err(mismatch("number set element", other)),
            })
            .collect::<Result<Vec<_>>>()?,
        other => return Err(mismatch("number set", other)),
    };
    Ok(AttributeValue::Ns(non_empty(items)?))
}

fn decode_number_set(value: &AttributeValue) -> Result<Value> {
    match value {
        AttributeValue::Ns(ns) => Ok(Value::NumberSet(
            ns.iter().map(|n| parse_number(n)).collect::<Result<Vec<_>>>()?,
        )),
        other => Err(wrong_wire("NS", other)),
    }
}

fn encode_binary_set(value: &Value) -> Result<AttributeValue> {
    let items = match value {
        Value::BinarySet(items) => items.iter().map(|b| Blob::new(b.clone())).collect(),
        Value::List(items) => items
            .iter()
            .map(|item| match item {
                Value::Binary(b) => Ok(Blob::new(b.clone())),
                Value::Text(s) => Ok(Blob::new(decode_base64(s)?)),
                other => Err(mismatch("binary set element", other)),
            })
            .collect::<Result<Vec<_>>>()?,
        other => return Err(mismatch("binary set", other)),
    };
    Ok(AttributeValue::Bs(non_empty(items)?))
}

fn decode_binary_set(value: &AttributeValue) -> Result<Value> {
    match value {
        AttributeValue::Bs(bs) => Ok(Value::BinarySet(
            bs.iter().map(|b| b.as_ref().to_vec()).collect(),
        )),
        other => Err(wrong_wire("BS", other)),
    }
}
