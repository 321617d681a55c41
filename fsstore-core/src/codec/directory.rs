//! Directory codec: one directory per document, a `config.json` for scalar
//! fields, and one file per document-property field (§4.2 "Directory
//! codec").

use std::path::Path;

use fsstore_common::{Document, Error, PropertyValue, Result, ENTITY_SET_ATTR};

use crate::schema::{EntitySetSchema, SchemaView};

use super::{FileBody, StagedFile};

pub const CONFIG_FILE: &str = "config.json";

/// Produce the files that make up `doc`'s directory: `config.json` plus one
/// file per populated document-property field. Fields with no value produce
/// no file, matching the decode side's rule that an absent file decodes to
/// an absent field rather than an empty string.
pub fn encode(schema_view: &SchemaView, schema: &EntitySetSchema, doc: &Document) -> Result<Vec<StagedFile>> {
    let mut files = Vec::new();

    let mut config = doc.fields.clone();
    config.insert(ENTITY_SET_ATTR.to_string(), serde_json::Value::String(schema.name.clone()));
    let config_json = serde_json::to_string_pretty(&config)?;
    files.push(StagedFile::text(CONFIG_FILE, config_json));

    for field in schema.entity_type.document_fields() {
        let Some(value) = doc.get_property(&field.name) else {
            continue;
        };
        let extension = schema_view.resolve_extension(doc, &field.name, schema);
        let file_name = format!("{}.{}", field.name, extension);
        let staged = match value {
            PropertyValue::Text(text) => StagedFile::text(file_name, text.clone()),
            PropertyValue::Binary(bytes) => StagedFile::bytes(file_name, bytes.clone()),
        };
        files.push(staged);
    }

    Ok(files)
}

/// Read a finalized (non-staging) document directory back into memory.
/// `config.json`'s `$entitySet` attribute is validated then stripped, per
/// the rule that it never appears on a document returned to a caller (§3).
pub async fn decode(schema: &EntitySetSchema, dir: &Path) -> Result<Document> {
    let config_path = dir.join(CONFIG_FILE);
    let content = tokio::fs::read_to_string(&config_path)
        .await
        .map_err(|e| Error::Decode(format!("reading {}: {e}", config_path.display())))?;

    let mut fields: indexmap::IndexMap<String, serde_json::Value> = serde_json::from_str(&content)
        .map_err(|e| Error::Decode(format!("parsing {}: {e}", config_path.display())))?;

    match fields.shift_remove(ENTITY_SET_ATTR) {
        Some(serde_json::Value::String(set)) if set == schema.name => {}
        Some(other) => {
            return Err(Error::Decode(format!(
                "{} declares entity set {other:?}, expected {:?}",
                config_path.display(),
                schema.name
            )))
        }
        None => {
            return Err(Error::Decode(format!(
                "{} is missing {ENTITY_SET_ATTR}",
                config_path.display()
            )))
        }
    }

    let mut doc = Document { fields, properties: indexmap::IndexMap::new() };

    for field in schema.entity_type.document_fields() {
        let Some(extension) = find_property_file(dir, &field.name).await? else {
            continue;
        };
        let path = dir.join(format!("{}.{extension}", field.name));
        let value = match field.field_type {
            crate::schema::FieldType::Binary => {
                PropertyValue::Binary(tokio::fs::read(&path).await.map_err(Error::Io)?)
            }
            _ => PropertyValue::Text(tokio::fs::read_to_string(&path).await.map_err(Error::Io)?),
        };
        doc.set_property(field.name.clone(), value);
    }

    Ok(doc)
}

/// A document-property file may have been written with any resolved
/// extension, so decode has to find it by stem rather than assume the
/// schema default.
async fn find_property_file(dir: &Path, field: &str) -> Result<Option<String>> {
    let mut entries = tokio::fs::read_dir(dir).await.map_err(Error::Io)?;
    let prefix = format!("{field}.");
    while let Some(entry) = entries.next_entry().await.map_err(Error::Io)? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if let Some(extension) = name.strip_prefix(&prefix) {
            return Ok(Some(extension.to_string()));
        }
    }
    Ok(None)
}
