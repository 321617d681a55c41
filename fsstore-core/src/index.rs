//! In-memory index (§4.4): a clone-on-read, clone-on-write cache of every
//! document in one entity set, keyed by `publicKey`. `load()` populates it
//! from disk (running crash recovery first, for directory mode); `insert`,
//! `update` and `remove` mutate the on-disk state and the in-memory copy
//! together, persisting before the index is updated so a reader never
//! observes a document the commit hasn't actually landed yet.
//!
//! `update` validates every target document's post-patch `publicKey` before
//! persisting any of them (§9 Open Question: this crate takes the
//! validate-the-whole-batch-first option), so a multi-document update either
//! commits in full or leaves every target untouched.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use fsstore_common::{Document, Error, Result};
use indexmap::IndexMap;
use parking_lot::RwLock;
use serde_json::Value;

use crate::codec::{directory, flat, StagedFile};
use crate::matcher::{flatten_query, Matcher};
use crate::schema::{EntitySetSchema, SchemaView, StorageMode};
use crate::txn::{self, DirectoryStaging};

/// Called with every path the index is about to write or has just removed,
/// so a caller can record it against a filesystem watcher's self-write
/// suppression window before the matching notify event arrives.
pub type WriteObserver = Arc<dyn Fn(&Path) + Send + Sync>;

pub struct Index {
    schema: EntitySetSchema,
    schema_view: Arc<SchemaView>,
    base: PathBuf,
    documents: RwLock<IndexMap<String, Document>>,
    write_observer: Option<WriteObserver>,
}

impl Index {
    pub fn new(schema_view: Arc<SchemaView>, schema: EntitySetSchema, base: PathBuf) -> Self {
        Self { schema, schema_view, base, documents: RwLock::new(IndexMap::new()), write_observer: None }
    }

    /// Attach a hook invoked with every path this index writes to or removes,
    /// before the corresponding filesystem operation runs.
    pub fn with_write_observer(mut self, observer: WriteObserver) -> Self {
        self.write_observer = Some(observer);
        self
    }

    fn note_write(&self, path: &Path) {
        if let Some(observer) = &self.write_observer {
            observer(path);
        }
    }

    fn note_directory_write(&self, dir: &Path, files: &[StagedFile]) {
        self.note_write(dir);
        for file in files {
            self.note_write(&dir.join(&file.name));
        }
    }

    pub fn schema(&self) -> &EntitySetSchema {
        &self.schema
    }

    pub fn base(&self) -> &PathBuf {
        &self.base
    }

    /// (Re)populate the index from disk. Safe to call again after an
    /// external change is detected by the watcher (§4.5 reload).
    pub async fn load(&self) -> Result<()> {
        let loaded = match self.schema.mode {
            StorageMode::Directory => {
                txn::recover_directory_set(&self.base).await?;
                self.load_directory().await?
            }
            StorageMode::Flat => flat::decode(&self.schema, &self.base).await?,
        };

        let mut map = IndexMap::new();
        for doc in loaded {
            match public_key_of(&self.schema, &doc) {
                Ok(key) => {
                    map.insert(key, doc);
                }
                Err(e) => tracing::warn!(error = %e, "skipping document with no usable publicKey"),
            }
        }
        *self.documents.write() = map;
        Ok(())
    }

    async fn load_directory(&self) -> Result<Vec<Document>> {
        if !tokio::fs::try_exists(&self.base).await.unwrap_or(false) {
            return Ok(Vec::new());
        }
        tokio::fs::create_dir_all(&self.base).await.map_err(Error::Io)?;

        let mut out = Vec::new();
        let mut entries = tokio::fs::read_dir(&self.base).await.map_err(Error::Io)?;
        while let Some(entry) = entries.next_entry().await.map_err(Error::Io)? {
            let name = entry.file_name().to_string_lossy().into_owned();
            if name.starts_with('~') {
                continue;
            }
            if !entry.file_type().await.map_err(Error::Io)?.is_dir() {
                continue;
            }
            match directory::decode(&self.schema, &entry.path()).await {
                Ok(doc) => out.push(doc),
                Err(e) => tracing::warn!(document = %name, error = %e, "skipping undecodable document"),
            }
        }
        Ok(out)
    }

    /// Every document currently held, cloned (§4.4 clone-on-read).
    pub fn all(&self) -> Vec<Document> {
        self.documents.read().values().cloned().collect()
    }

    pub fn find(&self, matcher: &dyn Matcher) -> Vec<Document> {
        self.documents.read().values().filter(|d| matcher.matches(d)).cloned().collect()
    }

    pub fn count(&self, matcher: &dyn Matcher) -> usize {
        self.documents.read().values().filter(|d| matcher.matches(d)).count()
    }

    pub fn get(&self, public_key: &str) -> Option<Document> {
        self.documents.read().get(public_key).cloned()
    }

    pub fn len(&self) -> usize {
        self.documents.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn validate_public_key(&self, key: &str) -> Result<()> {
        if key.is_empty() || key.contains('/') || key.contains('\\') || key.starts_with('~') {
            return Err(Error::InvalidName(key.to_string()));
        }
        Ok(())
    }

    /// Insert a new document. `doc` must already carry a `publicKey`
    /// (callers needing one generated should do so before calling in).
    pub async fn insert(&self, mut doc: Document) -> Result<Document> {
        self.assign_key_if_missing(&mut doc);

        let key = public_key_of(&self.schema, &doc)?;
        self.validate_public_key(&key)?;
        if self.documents.read().contains_key(&key) {
            return Err(Error::DuplicateKey(key));
        }

        self.persist_insert(&key, &doc).await?;

        self.documents.write().insert(key, doc.clone());
        Ok(doc)
    }

    /// Generate the primary key when a caller doesn't supply one (§3,
    /// §4.4 "assigns `_id` if missing"). Only the key field is ever
    /// auto-assigned; a missing `publicKey` field is a caller error.
    fn assign_key_if_missing(&self, doc: &mut Document) {
        let key_field = self.schema.key_field();
        if doc.get(key_field).is_none() {
            doc.set(key_field.to_string(), Value::String(uuid::Uuid::new_v4().to_string()));
        }
    }

    async fn persist_insert(&self, key: &str, doc: &Document) -> Result<()> {
        match self.schema.mode {
            StorageMode::Directory => {
                let staging = DirectoryStaging::begin_insert(&self.base, key).await?;
                let files = directory::encode(&self.schema_view, &self.schema, doc)?;
                let final_dir = self.base.join(key);
                self.note_directory_write(&final_dir, &files);
                staging.write_files(&files).await?;
                staging.commit().await?;
            }
            StorageMode::Flat => {
                let line = flat::encode_record(&self.schema, doc)?;
                self.note_write(&self.base);
                txn::append_flat_record(&self.base, &line).await?;
            }
        }
        Ok(())
    }

    async fn persist_update(&self, old_key: &str, new_key: &str, doc: &Document) -> Result<()> {
        match self.schema.mode {
            StorageMode::Directory => {
                let staging = DirectoryStaging::begin_update(&self.base, new_key, old_key).await?;
                let files = directory::encode(&self.schema_view, &self.schema, doc)?;
                let final_dir = self.base.join(new_key);
                self.note_write(&self.base.join(old_key));
                self.note_directory_write(&final_dir, &files);
                staging.write_files(&files).await?;
                staging.commit().await?;
            }
            StorageMode::Flat => {
                let line = flat::encode_record(&self.schema, doc)?;
                self.note_write(&self.base);
                txn::append_flat_record(&self.base, &line).await?;
            }
        }
        Ok(())
    }

    /// Apply `patch` to every document matching `matcher`. If nothing
    /// matches and `upsert_seed` is `Some`, a new document is derived from
    /// the seed query's flat equality fields plus the patch and inserted.
    pub async fn update(
        &self,
        matcher: &dyn Matcher,
        patch: &serde_json::Map<String, Value>,
        upsert_seed: Option<&serde_json::Map<String, Value>>,
    ) -> Result<Vec<Document>> {
        let targets: Vec<(String, Document)> = {
            let map = self.documents.read();
            map.iter().filter(|(_, d)| matcher.matches(d)).map(|(k, d)| (k.clone(), d.clone())).collect()
        };

        if targets.is_empty() {
            return match upsert_seed {
                Some(seed) => {
                    let doc = build_upsert_document(seed, patch);
                    self.insert(doc).await.map(|d| vec![d])
                }
                None => Ok(Vec::new()),
            };
        }

        // Compute every patched document and validate the whole batch before
        // persisting any of it.
        let mut patched = Vec::with_capacity(targets.len());
        for (old_key, doc) in &targets {
            let mut next = doc.clone();
            apply_patch(&mut next, patch);
            let new_key = public_key_of(&self.schema, &next)?;
            self.validate_public_key(&new_key)?;
            patched.push((old_key.clone(), new_key, next));
        }

        {
            let map = self.documents.read();
            let target_keys: HashSet<&str> = targets.iter().map(|(k, _)| k.as_str()).collect();
            let mut new_keys_in_batch = HashSet::new();
            for (old_key, new_key, _) in &patched {
                if new_key != old_key
                    && map.contains_key(new_key.as_str())
                    && !target_keys.contains(new_key.as_str())
                {
                    return Err(Error::DuplicateKey(new_key.clone()));
                }
                if !new_keys_in_batch.insert(new_key.clone()) {
                    return Err(Error::DuplicateKey(new_key.clone()));
                }
            }
        }

        let mut results = Vec::with_capacity(patched.len());
        for (old_key, new_key, doc) in patched {
            self.persist_update(&old_key, &new_key, &doc).await?;
            {
                let mut map = self.documents.write();
                if new_key != old_key {
                    map.shift_remove(&old_key);
                }
                map.insert(new_key, doc.clone());
            }
            results.push(doc);
        }
        Ok(results)
    }

    /// Remove every document matching `matcher`, returning how many were
    /// removed.
    pub async fn remove(&self, matcher: &dyn Matcher) -> Result<usize> {
        let targets: Vec<(String, Document)> = {
            let map = self.documents.read();
            map.iter().filter(|(_, d)| matcher.matches(d)).map(|(k, d)| (k.clone(), d.clone())).collect()
        };

        for (key, doc) in &targets {
            match self.schema.mode {
                StorageMode::Directory => {
                    let dir = self.base.join(key);
                    if tokio::fs::try_exists(&dir).await.unwrap_or(false) {
                        if let Ok(files) = directory::encode(&self.schema_view, &self.schema, doc) {
                            self.note_directory_write(&dir, &files);
                        } else {
                            self.note_write(&dir);
                        }
                        tokio::fs::remove_dir_all(&dir).await.map_err(Error::Io)?;
                    }
                }
                StorageMode::Flat => {
                    let key_value = doc.get(self.schema.key_field()).cloned().unwrap_or_else(|| Value::String(key.clone()));
                    let line = flat::encode_tombstone(&self.schema, &key_value)?;
                    self.note_write(&self.base);
                    txn::append_flat_record(&self.base, &line).await?;
                }
            }
        }

        let mut map = self.documents.write();
        for (key, _) in &targets {
            map.shift_remove(key);
        }
        Ok(targets.len())
    }

    /// Insert or remove a document in response to an external write (watch
    /// reload, or an inbound sync action): replaces the in-memory copy only,
    /// the on-disk state is assumed already authoritative.
    pub fn reindex(&self, key: String, doc: Option<Document>) {
        let mut map = self.documents.write();
        match doc {
            Some(doc) => {
                map.insert(key, doc);
            }
            None => {
                map.shift_remove(&key);
            }
        }
    }
}

fn public_key_of(schema: &EntitySetSchema, doc: &Document) -> Result<String> {
    let field = schema.public_key_field();
    doc.get(field)
        .map(value_to_key_string)
        .ok_or_else(|| Error::InvalidName(format!("document missing {field}")))
}

fn value_to_key_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn apply_patch(doc: &mut Document, patch: &serde_json::Map<String, Value>) {
    if let Some(Value::Object(set_fields)) = patch.get("$set") {
        for (k, v) in set_fields {
            doc.set(k.clone(), v.clone());
        }
    }
    for (k, v) in patch {
        if k == "$set" {
            continue;
        }
        doc.set(k.clone(), v.clone());
    }
}

fn build_upsert_document(seed: &serde_json::Map<String, Value>, patch: &serde_json::Map<String, Value>) -> Document {
    let mut doc = Document::from_fields(flatten_query(seed));
    apply_patch(&mut doc, patch);
    doc
}
