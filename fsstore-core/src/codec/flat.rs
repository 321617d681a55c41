//! Flat codec: append-only newline-delimited JSON records in a single file
//! (§4.2 "Flat codec"). Unlike the directory codec, a flat-mode record
//! carries every field - including document-property fields - inline: there
//! is nowhere else to put them, since an entity set of this mode is a single
//! file rather than a directory per document.

use std::path::Path;

use base64::Engine as _;
use fsstore_common::{Document, Error, PropertyValue, Result, DELETED_ATTR, ENTITY_SET_ATTR};
use indexmap::IndexMap;
use serde_json::Value;

use crate::schema::{EntitySetSchema, FieldType};

/// Encode `doc` as a single JSON line for an insert or update record.
pub fn encode_record(schema: &EntitySetSchema, doc: &Document) -> Result<String> {
    let mut record: serde_json::Map<String, Value> = doc.fields.clone().into_iter().collect();
    for field in schema.entity_type.document_fields() {
        if let Some(value) = doc.get_property(&field.name) {
            record.insert(field.name.clone(), property_to_json(value));
        }
    }
    record.insert(ENTITY_SET_ATTR.to_string(), Value::String(schema.name.clone()));
    Ok(serde_json::to_string(&record)?)
}

/// Encode a tombstone record: just the key and the deletion marker (§4.2).
pub fn encode_tombstone(schema: &EntitySetSchema, key_value: &Value) -> Result<String> {
    let mut record = serde_json::Map::new();
    record.insert(schema.key_field().to_string(), key_value.clone());
    record.insert(DELETED_ATTR.to_string(), Value::Bool(true));
    record.insert(ENTITY_SET_ATTR.to_string(), Value::String(schema.name.clone()));
    Ok(serde_json::to_string(&record)?)
}

/// Replay every line of a flat file, applying inserts/updates/tombstones in
/// order, and return the resulting documents (last-write-wins, §4.2).
pub async fn decode(schema: &EntitySetSchema, path: &Path) -> Result<Vec<Document>> {
    if tokio::fs::try_exists(path).await.unwrap_or(false) {
        let content = tokio::fs::read_to_string(path).await.map_err(Error::Io)?;
        decode_str(schema, &content)
    } else {
        Ok(Vec::new())
    }
}

pub fn decode_str(schema: &EntitySetSchema, content: &str) -> Result<Vec<Document>> {
    let mut live: IndexMap<String, Document> = IndexMap::new();

    for (lineno, line) in content.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let record: serde_json::Map<String, Value> = match serde_json::from_str(line) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(line = lineno + 1, error = %e, "skipping malformed flat record");
                continue;
            }
        };

        let Some(key_value) = record.get(schema.key_field()) else {
            tracing::warn!(line = lineno + 1, "skipping record with no key field");
            continue;
        };
        let key = key_value.to_string();

        if record.get(DELETED_ATTR).and_then(Value::as_bool) == Some(true) {
            live.shift_remove(&key);
            continue;
        }

        match decode_record(schema, record) {
            Ok(doc) => {
                live.insert(key, doc);
            }
            Err(e) => tracing::warn!(line = lineno + 1, error = %e, "skipping malformed flat record"),
        }
    }

    Ok(live.into_values().collect())
}

/// Turn one decoded JSON record (a flat-file line, or a sync envelope's
/// `document` payload, which shares the same shape) into a `Document`.
pub fn decode_record(schema: &EntitySetSchema, mut record: serde_json::Map<String, Value>) -> Result<Document> {
    record.remove(ENTITY_SET_ATTR);

    let mut doc = Document::new();
    let property_names: Vec<&str> = schema.entity_type.document_fields().map(|f| f.name.as_str()).collect();

    for (name, value) in record {
        if let Some(field) = property_names.iter().find(|p| **p == name) {
            let field_type = &schema.entity_type.field(field).expect("resolved from schema").field_type;
            doc.set_property(name, json_to_property(field_type, value)?);
        } else {
            doc.set(name, value);
        }
    }

    Ok(doc)
}

fn property_to_json(value: &PropertyValue) -> Value {
    match value {
        PropertyValue::Text(text) => Value::String(text.clone()),
        PropertyValue::Binary(bytes) => {
            Value::String(base64::engine::general_purpose::STANDARD.encode(bytes))
        }
    }
}

fn json_to_property(field_type: &FieldType, value: Value) -> Result<PropertyValue> {
    match field_type {
        FieldType::Binary => {
            let encoded = value
                .as_str()
                .ok_or_else(|| Error::Decode("expected base64 string for binary property".into()))?;
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(encoded)
                .map_err(|e| Error::Decode(format!("invalid base64 property: {e}")))?;
            Ok(PropertyValue::Binary(bytes))
        }
        _ => {
            let text = value
                .as_str()
                .ok_or_else(|| Error::Decode("expected string for text property".into()))?;
            Ok(PropertyValue::Text(text.to_string()))
        }
    }
}
