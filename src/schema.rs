//! Typed field schemas.
//!
//! A [`Schema`] is built once from field specs and never changes afterwards.
//! It encodes application documents into wire documents, decodes them back
//! (filling defaults), and describes the table key for table creation.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use aws_sdk_dynamodb::types::{KeyType, ScalarAttributeType};
use serde_json::Value as JsonValue;

use crate::conversions::{FieldType, MapperRegistry, TypeSpec, TypeTag};
use crate::errors::{Error, Result};
use crate::value::{Document, Value, WireDocument};

/// Role a field plays in the table key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyRole {
    Hash,
    Range,
}

impl KeyRole {
    pub fn key_type(&self) -> KeyType {
        match self {
            KeyRole::Hash => KeyType::Hash,
            KeyRole::Range => KeyType::Range,
        }
    }
}

type GeneratorFn = dyn Fn(&WireDocument) -> Value + Send + Sync;

/// Value used when a decoded document lacks a field.
#[derive(Clone)]
pub enum FieldDefault {
    Static(Value),
    /// Called with the raw wire document being decoded.
    Generator(Arc<GeneratorFn>),
}

impl fmt::Debug for FieldDefault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldDefault::Static(v) => f.debug_tuple("Static").field(v).finish(),
            FieldDefault::Generator(_) => f.write_str("Generator(..)"),
        }
    }
}

/// Declaration of one schema field.
#[derive(Debug, Clone)]
pub struct FieldSpec {
    type_spec: TypeSpec,
    key: Option<KeyRole>,
    default: Option<FieldDefault>,
}

impl FieldSpec {
    pub fn new(type_spec: TypeSpec) -> Self {
        FieldSpec {
            type_spec,
            key: None,
            default: None,
        }
    }

    pub fn tag(tag: TypeTag) -> Self {
        Self::new(TypeSpec::Tag(tag))
    }

    pub fn text() -> Self {
        Self::tag(TypeTag::Text)
    }

    pub fn number() -> Self {
        Self::tag(TypeTag::Number)
    }

    pub fn boolean() -> Self {
        Self::tag(TypeTag::Boolean)
    }

    pub fn timestamp() -> Self {
        Self::tag(TypeTag::Timestamp)
    }

    pub fn binary() -> Self {
        Self::tag(TypeTag::Binary)
    }

    pub fn json() -> Self {
        Self::new(TypeSpec::JsonBlob)
    }

    pub fn set_of(tag: TypeTag) -> Self {
        Self::new(TypeSpec::SetOf(tag))
    }

    pub fn custom(field_type: FieldType) -> Self {
        Self::new(TypeSpec::Custom(field_type))
    }

    pub fn hash_key(mut self) -> Self {
        self.key = Some(KeyRole::Hash);
        self
    }

    pub fn range_key(mut self) -> Self {
        self.key = Some(KeyRole::Range);
        self
    }

    pub fn with_default(mut self, value: impl Into<Value>) -> Self {
        self.default = Some(FieldDefault::Static(value.into()));
        self
    }

    pub fn with_default_fn<F>(mut self, generator: F) -> Self
    where
        F: Fn(&WireDocument) -> Value + Send + Sync + 'static,
    {
        self.default = Some(FieldDefault::Generator(Arc::new(generator)));
        self
    }
}

#[derive(Debug, Clone)]
struct SchemaField {
    name: String,
    field_type: FieldType,
    key: Option<KeyRole>,
    default: Option<FieldDefault>,
}

/// An immutable, ordered set of typed fields with one hash key and an optional range key.
#[derive(Debug, Clone)]
pub struct Schema {
    fields: Vec<SchemaField>,
    index: HashMap<String, usize>,
    hash_key: String,
    range_key: Option<String>,
}

impl Schema {
    /// Build a schema against the built-in mapper registry.
    pub fn new<I, K>(fields: I) -> Result<Self>
    where
        I: IntoIterator<Item = (K, FieldSpec)>,
        K: Into<String>,
    {
        Self::with_registry(fields, MapperRegistry::builtin())
    }

    pub fn with_registry<I, K>(fields: I, registry: &MapperRegistry) -> Result<Self>
    where
        I: IntoIterator<Item = (K, FieldSpec)>,
        K: Into<String>,
    {
        let mut resolved = Vec::new();
        let mut index = HashMap::new();
        let mut hash_key = None;
        let mut range_key = None;

        for (name, spec) in fields {
            let name = name.into();
            if index.contains_key(&name) {
                return Err(Error::schema(format!("field \"{}\" is declared twice", name)));
            }
            let field_type = registry.resolve(&name, &spec.type_spec)?;

            if let Some(role) = spec.key {
                if field_type.wire_tag().scalar_attribute_type().is_none() {
                    return Err(Error::schema(format!(
                        "key field \"{}\" must be stored as S, N or B, not {}",
                        name,
                        field_type.wire_tag().as_str()
                    )));
                }
                let slot = match role {
                    KeyRole::Hash => &mut hash_key,
                    KeyRole::Range => &mut range_key,
                };
                if let Some(existing) = slot.replace(name.clone()) {
                    return Err(Error::schema(format!(
                        "fields \"{}\" and \"{}\" both declare a {:?} key",
                        existing, name, role
                    )));
                }
            }

            index.insert(name.clone(), resolved.len());
            resolved.push(SchemaField {
                name,
                field_type,
                key: spec.key,
                default: spec.default,
            });
        }

        let hash_key = hash_key.ok_or_else(|| Error::schema("schema must declare a hash key"))?;

        Ok(Schema {
            fields: resolved,
            index,
            hash_key,
            range_key,
        })
    }

    /// Build a schema from a JSON declaration.
    ///
    /// Each field is one of `"text"`, `["number"]`, `{}` or
    /// `{"type": ..., "key": true | "hash" | "range", "default": ...}`.
    pub fn from_json(declaration: &JsonValue) -> Result<Self> {
        let object = declaration
            .as_object()
            .ok_or_else(|| Error::schema("schema declaration must be a JSON object"))?;
        let registry = MapperRegistry::builtin();

        let mut specs = Vec::with_capacity(object.len());
        for (name, raw) in object {
            let mut spec = parse_field_spec(name, raw)?;
            // Normalize JSON defaults through the field's own mapper so they
            // come back typed like stored values.
            if let Some(FieldDefault::Static(value)) = &spec.default {
                let field_type = registry.resolve(name, &spec.type_spec)?;
                let normalized = field_type.decode(&field_type.encode(value)?)?;
                spec.default = Some(FieldDefault::Static(normalized));
            }
            specs.push((name.clone(), spec));
        }
        Self::with_registry(specs, registry)
    }

    pub fn hash_key(&self) -> &str {
        &self.hash_key
    }

    pub fn range_key(&self) -> Option<&str> {
        self.range_key.as_deref()
    }

    /// Field names in declaration order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|f| f.name.as_str())
    }

    pub fn contains(&self, field: &str) -> bool {
        self.index.contains_key(field)
    }

    /// Look up a field's type, failing with a field error when it is unknown.
    pub fn field_type(&self, field: &str) -> Result<&FieldType> {
        self.index
            .get(field)
            .map(|&i| &self.fields[i].field_type)
            .ok_or_else(|| Error::UnknownField(field.to_string()))
    }

    /// Key fields in key-schema order (hash first).
    pub fn key_schema(&self) -> Vec<(String, KeyType)> {
        let mut keys = vec![(self.hash_key.clone(), KeyRole::Hash.key_type())];
        if let Some(range) = &self.range_key {
            keys.push((range.clone(), KeyRole::Range.key_type()));
        }
        keys
    }

    /// Attribute definitions for the key fields.
    pub fn attribute_definitions(&self) -> Vec<(String, ScalarAttributeType)> {
        self.fields
            .iter()
            .filter(|f| f.key.is_some())
            .filter_map(|f| {
                f.field_type
                    .wire_tag()
                    .scalar_attribute_type()
                    .map(|t| (f.name.clone(), t))
            })
            .collect()
    }

    /// Encode the fields present on `document`.
    ///
    /// Absent fields, `Null` values and names the schema does not know are left
    /// out; defaults are never applied here.
    pub fn encode(&self, document: &Document) -> Result<WireDocument> {
        let mut wire = WireDocument::with_capacity(document.len());
        for (name, value) in document {
            if value.is_null() {
                continue;
            }
            let Some(&i) = self.index.get(name) else {
                continue;
            };
            let encoded = self.fields[i]
                .field_type
                .encode(value)
                .map_err(|e| in_field(name, e))?;
            wire.insert(name.clone(), encoded);
        }
        Ok(wire)
    }

    pub fn encode_optional(&self, document: Option<&Document>) -> Result<Option<WireDocument>> {
        document.map(|d| self.encode(d)).transpose()
    }

    /// Encode only the key attributes of `document`, requiring all of them.
    pub fn encode_key(&self, document: &Document) -> Result<WireDocument> {
        let mut wire = WireDocument::new();
        let names = std::iter::once(self.hash_key.as_str()).chain(self.range_key.as_deref());
        for name in names {
            let value = document
                .get(name)
                .filter(|v| !v.is_null())
                .ok_or_else(|| Error::validation(format!("key is missing attribute \"{}\"", name)))?;
            let encoded = self
                .field_type(name)?
                .encode(value)
                .map_err(|e| in_field(name, e))?;
            wire.insert(name.to_string(), encoded);
        }
        Ok(wire)
    }

    /// Decode a full document, filling defaults for absent fields.
    ///
    /// `None` decodes to `None`.
    pub fn decode(&self, wire: Option<&WireDocument>) -> Result<Option<Document>> {
        let Some(wire) = wire else {
            return Ok(None);
        };
        let mut document = Document::new();
        for field in &self.fields {
            let value = match (wire.get(&field.name), &field.default) {
                (Some(raw), _) => field
                    .field_type
                    .decode(raw)
                    .map_err(|e| in_field(&field.name, e))?,
                (None, Some(FieldDefault::Static(value))) => value.clone(),
                (None, Some(FieldDefault::Generator(generate))) => generate(wire),
                (None, None) => Value::Null,
            };
            document.insert(field.name.clone(), value);
        }
        Ok(Some(document))
    }

    /// Decode only the attributes present in `wire` that the schema knows.
    pub fn decode_present(&self, wire: &WireDocument) -> Result<Document> {
        let mut document = Document::new();
        for (name, raw) in wire {
            if let Some(&i) = self.index.get(name) {
                let value = self.fields[i]
                    .field_type
                    .decode(raw)
                    .map_err(|e| in_field(name, e))?;
                document.insert(name.clone(), value);
            }
        }
        Ok(document)
    }
}

fn in_field(field: &str, err: Error) -> Error {
    match err {
        Error::Validation(msg) => Error::Validation(format!("field \"{}\": {}", field, msg)),
        other => other,
    }
}

fn parse_type_spec(field: &str, raw: &JsonValue) -> Result<TypeSpec> {
    match raw {
        JsonValue::String(tag) => TypeTag::parse(tag)
            .map(TypeSpec::Tag)
            .ok_or_else(|| unmappable(field, &format!("unknown type \"{}\"", tag))),
        JsonValue::Array(items) => match items.as_slice() {
            [JsonValue::String(tag)] => TypeTag::parse(tag)
                .map(TypeSpec::SetOf)
                .ok_or_else(|| unmappable(field, &format!("unknown set type \"{}\"", tag))),
            _ => Err(unmappable(field, "set types take exactly one element type")),
        },
        JsonValue::Object(map) if map.is_empty() => Ok(TypeSpec::JsonBlob),
        _ => Err(unmappable(field, "missing data type")),
    }
}

fn parse_field_spec(field: &str, raw: &JsonValue) -> Result<FieldSpec> {
    let JsonValue::Object(options) = raw else {
        return parse_type_spec(field, raw).map(FieldSpec::new);
    };
    if options.is_empty() {
        return Ok(FieldSpec::json());
    }
    let type_raw = options
        .get("type")
        .ok_or_else(|| unmappable(field, "missing data type"))?;
    let mut spec = FieldSpec::new(parse_type_spec(field, type_raw)?);

    spec.key = match options.get("key") {
        None | Some(JsonValue::Null) | Some(JsonValue::Bool(false)) => None,
        Some(JsonValue::Bool(true)) => Some(KeyRole::Hash),
        Some(JsonValue::String(s)) if s == "hash" => Some(KeyRole::Hash),
        Some(JsonValue::String(s)) if s == "range" => Some(KeyRole::Range),
        Some(other) => {
            return Err(Error::schema(format!(
                "field \"{}\": unsupported key role {}",
                field, other
            )));
        }
    };

    if let Some(default) = options.get("default").filter(|d| !d.is_null()) {
        spec.default = Some(FieldDefault::Static(Value::from_json(default)));
    }
    Ok(spec)
}

fn unmappable(field: &str, reason: &str) -> Error {
    Error::schema(format!("unable to map field \"{}\": {}", field, reason))
}
