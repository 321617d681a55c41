//! Schema view (§4.1): a read-only projection of the registered entity sets.
//!
//! Registration of entity types and entity sets is, per the spec, the
//! type registry's job and lives outside this crate's scope. What the core
//! needs is a small, already-built descriptor to consult on every
//! operation: storage mode, key/publicKey fields, and which fields are
//! document properties. [`SchemaView`] is that descriptor; building one is
//! the thinnest possible registration API so the crate is usable on its
//! own, not a reimplementation of the registry.

use std::collections::HashMap;
use std::sync::Arc;

use fsstore_common::{Document, Error, Result};

/// Semantic type of a field, per §3 "Entity type".
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FieldType {
    String,
    Binary,
    DateTimeOffset,
    /// Reference to a registered complex type, named but not modeled here -
    /// complex-type validation is the type registry's concern.
    Complex(String),
}

/// How a document-property field is materialized to its own file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentPropertySpec {
    pub extension: String,
    pub engine_hint: Option<String>,
}

/// A single field of an entity type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldDef {
    pub name: String,
    pub field_type: FieldType,
    pub key: bool,
    pub public_key: bool,
    pub document: Option<DocumentPropertySpec>,
}

impl FieldDef {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            key: false,
            public_key: false,
            document: None,
        }
    }

    pub fn key(mut self) -> Self {
        self.key = true;
        self
    }

    pub fn public_key(mut self) -> Self {
        self.public_key = true;
        self
    }

    pub fn document(mut self, extension: impl Into<String>) -> Self {
        self.document = Some(DocumentPropertySpec {
            extension: extension.into(),
            engine_hint: None,
        });
        self
    }

    pub fn document_with_hint(mut self, extension: impl Into<String>, engine_hint: impl Into<String>) -> Self {
        self.document = Some(DocumentPropertySpec {
            extension: extension.into(),
            engine_hint: Some(engine_hint.into()),
        });
        self
    }
}

/// An ordered set of named fields (§3 "Entity type").
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityType {
    pub name: String,
    pub fields: Vec<FieldDef>,
}

impl EntityType {
    pub fn new(name: impl Into<String>, fields: Vec<FieldDef>) -> Self {
        Self { name: name.into(), fields }
    }

    /// The field carrying the primary key. Every entity type must have
    /// exactly one; this is enforced at registration, not on every lookup.
    pub fn key_field(&self) -> &str {
        self.fields
            .iter()
            .find(|f| f.key)
            .map(|f| f.name.as_str())
            .expect("entity type must declare exactly one key field")
    }

    /// The field used as the filesystem name. Falls back to the key field
    /// when no field is flagged `publicKey` (§3 "Entity type").
    pub fn public_key_field(&self) -> &str {
        self.fields
            .iter()
            .find(|f| f.public_key)
            .map(|f| f.name.as_str())
            .unwrap_or_else(|| self.key_field())
    }

    pub fn document_fields(&self) -> impl Iterator<Item = &FieldDef> {
        self.fields.iter().filter(|f| f.document.is_some())
    }

    pub fn field(&self, name: &str) -> Option<&FieldDef> {
        self.fields.iter().find(|f| f.name == name)
    }
}

/// How an entity set is persisted (§3 "Entity set").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageMode {
    /// One directory per document.
    Directory,
    /// A single append-only newline-delimited file.
    Flat,
}

/// A named collection bound to an entity type and a storage mode.
#[derive(Debug, Clone)]
pub struct EntitySetSchema {
    pub name: String,
    pub mode: StorageMode,
    pub entity_type: EntityType,
}

impl EntitySetSchema {
    pub fn new(name: impl Into<String>, mode: StorageMode, entity_type: EntityType) -> Self {
        Self { name: name.into(), mode, entity_type }
    }

    pub fn key_field(&self) -> &str {
        self.entity_type.key_field()
    }

    pub fn public_key_field(&self) -> &str {
        self.entity_type.public_key_field()
    }
}

/// A resolver consulted, in registration order, for the on-disk extension of
/// a document-property file. The first non-`None` result wins; otherwise the
/// schema's default extension is used (§4.1).
pub type ExtensionResolver =
    Arc<dyn Fn(&Document, &str, &EntitySetSchema) -> Option<String> + Send + Sync>;

/// Read-only projection over the registered entity sets (§4.1).
#[derive(Clone, Default)]
pub struct SchemaView {
    sets: HashMap<String, EntitySetSchema>,
    resolvers: Vec<ExtensionResolver>,
}

impl SchemaView {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity set. Call once per set before `init()`; this is
    /// the thin stand-in for the external type registry (§4.1, out of
    /// scope proper).
    pub fn register_entity_set(&mut self, schema: EntitySetSchema) -> &mut Self {
        self.sets.insert(schema.name.clone(), schema);
        self
    }

    /// Register an extension resolver, appended to the chain consulted in
    /// order on every document-property write.
    pub fn register_extension_resolver(&mut self, resolver: ExtensionResolver) -> &mut Self {
        self.resolvers.push(resolver);
        self
    }

    pub fn get(&self, set: &str) -> Result<&EntitySetSchema> {
        self.sets
            .get(set)
            .ok_or_else(|| Error::SchemaUnknown(set.to_string()))
    }

    pub fn contains(&self, set: &str) -> bool {
        self.sets.contains_key(set)
    }

    pub fn set_names(&self) -> impl Iterator<Item = &str> {
        self.sets.keys().map(String::as_str)
    }

    /// Resolve the extension for a document-property field, consulting the
    /// resolver chain before falling back to the schema default.
    pub fn resolve_extension(&self, doc: &Document, field: &str, schema: &EntitySetSchema) -> String {
        for resolver in &self.resolvers {
            if let Some(ext) = resolver(doc, field, schema) {
                return ext;
            }
        }
        schema
            .entity_type
            .field(field)
            .and_then(|f| f.document.as_ref())
            .map(|d| d.extension.clone())
            .unwrap_or_else(|| "txt".to_string())
    }
}
