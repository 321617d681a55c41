//! The in-memory document representation shared by every layer of the
//! provider: the codec, the index, the write queue and the sync channel all
//! pass `Document` values around rather than raw JSON.
//!
//! A document is split into two halves on purpose, mirroring how it is laid
//! out on disk (§4.2, §6): `fields` are the scalar/complex-type values that
//! land in `config.json`, and `properties` are the schema-flagged
//! document-property fields that are written to their own file. Keeping the
//! split in memory means the codec never has to guess which bucket a field
//! belongs to - the schema already told it once, at insert time.

use std::fmt;

use indexmap::IndexMap;
use serde_json::Value;

/// Name of a registered entity set, e.g. `"templates"`.
pub type EntitySetName = String;

/// Attribute name injected into persisted records and sync envelopes to
/// identify the owning entity set. Never present on a `Document` handed back
/// to a caller (§3 "Document").
pub const ENTITY_SET_ATTR: &str = "$entitySet";

/// Tombstone marker appended to flat-mode records on remove (§4.2).
pub const DELETED_ATTR: &str = "$$deleted";

/// The value of a document-property field: either UTF-8 text or raw bytes,
/// depending on the field's declared semantic type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PropertyValue {
    Text(String),
    Binary(Vec<u8>),
}

impl PropertyValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s),
            PropertyValue::Binary(_) => None,
        }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            PropertyValue::Text(s) => s.as_bytes(),
            PropertyValue::Binary(b) => b,
        }
    }
}

/// A single document: a mapping from field name to value, split into scalar
/// `fields` and file-backed `properties` (§3 "Document").
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    pub fields: IndexMap<String, Value>,
    pub properties: IndexMap<String, PropertyValue>,
}

impl Document {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a document from a flat JSON object, treating every key as a
    /// scalar field. Convenience for tests and for callers constructing a
    /// document purely from user input before document-property fields are
    /// split out by the schema.
    pub fn from_fields(fields: serde_json::Map<String, Value>) -> Self {
        Self {
            fields: fields.into_iter().collect(),
            properties: IndexMap::new(),
        }
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.fields.get(field)
    }

    pub fn set(&mut self, field: impl Into<String>, value: Value) {
        self.fields.insert(field.into(), value);
    }

    pub fn remove_field(&mut self, field: &str) -> Option<Value> {
        self.fields.shift_remove(field)
    }

    pub fn get_property(&self, field: &str) -> Option<&PropertyValue> {
        self.properties.get(field)
    }

    pub fn set_property(&mut self, field: impl Into<String>, value: PropertyValue) {
        self.properties.insert(field.into(), value);
    }

    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.get(field).and_then(Value::as_str)
    }

    /// Clone the whole document, fields and properties alike. Used at the
    /// clone-on-read / clone-on-write boundary (§4.4): callers never hand out
    /// or receive a reference into the index's stored copy.
    pub fn deep_clone(&self) -> Self {
        self.clone()
    }
}

impl fmt::Display for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Document({} fields, {} properties)", self.fields.len(), self.properties.len())
    }
}
