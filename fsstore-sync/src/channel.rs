//! Sync channel (§4.7): publishes every local mutation to every other
//! subscriber sharing this process (and, via whatever transport a caller
//! bridges `broadcast::Receiver` onto, other processes watching the same
//! data directory). An envelope normally carries the document's full record
//! - the same shape the flat codec would write to disk - so a receiver can
//! apply it without touching the filesystem at all. When that payload would
//! exceed `message_size_limit`, the envelope degrades to a locator-only
//! `refresh`, and the receiver is expected to reload the document from disk
//! instead (§4.7 "oversized payload").

use fsstore_common::{Document, Result};
use fsstore_core::EntitySetSchema;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SyncAction {
    Insert,
    Update,
    Remove,
    Refresh,
    /// A whole entity set was reloaded from disk after an external edit was
    /// detected by the filesystem watcher (§4.5, §8 scenario 7). Carries no
    /// `public_key` or `document` - the receiver already holds the current
    /// on-disk state and should treat this the same as a local reload.
    Reload,
}

/// A single change, as published to or received from the sync channel.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncEnvelope {
    pub action: SyncAction,
    pub entity_set: String,
    /// Empty for `reload`, which has no single document to name.
    pub public_key: String,
    /// Present for `insert`/`update` under the size limit; `None` for
    /// `remove`, `reload`, and for payloads that degraded to `refresh`.
    pub document: Option<Value>,
}

const DEFAULT_CAPACITY: usize = 1024;

pub struct SyncChannel {
    sender: broadcast::Sender<SyncEnvelope>,
    message_size_limit: usize,
}

impl SyncChannel {
    pub fn new(message_size_limit: usize) -> Self {
        let (sender, _) = broadcast::channel(DEFAULT_CAPACITY);
        Self { sender, message_size_limit }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEnvelope> {
        self.sender.subscribe()
    }

    /// Publish an insert or update. Builds the envelope from the same record
    /// shape the flat codec would persist, so the receiving side's apply
    /// logic is shared with replay-from-disk.
    pub fn publish_upsert(&self, schema: &EntitySetSchema, action: SyncAction, public_key: &str, doc: &Document) -> Result<()> {
        debug_assert!(matches!(action, SyncAction::Insert | SyncAction::Update));
        let line = fsstore_core::codec::flat::encode_record(schema, doc)?;
        let envelope = if line.len() <= self.message_size_limit {
            SyncEnvelope {
                action,
                entity_set: schema.name.clone(),
                public_key: public_key.to_string(),
                document: Some(serde_json::from_str(&line)?),
            }
        } else {
            tracing::debug!(
                entity_set = %schema.name,
                public_key,
                size = line.len(),
                limit = self.message_size_limit,
                "document exceeds message size limit, publishing refresh instead"
            );
            SyncEnvelope {
                action: SyncAction::Refresh,
                entity_set: schema.name.clone(),
                public_key: public_key.to_string(),
                document: None,
            }
        };
        let _ = self.sender.send(envelope);
        Ok(())
    }

    pub fn publish_remove(&self, entity_set: &str, public_key: &str) {
        let _ = self.sender.send(SyncEnvelope {
            action: SyncAction::Remove,
            entity_set: entity_set.to_string(),
            public_key: public_key.to_string(),
            document: None,
        });
    }

    /// Publish a whole-entity-set reload triggered by an external edit the
    /// filesystem watcher picked up.
    pub fn publish_reload(&self, entity_set: &str) {
        let _ = self.sender.send(SyncEnvelope {
            action: SyncAction::Reload,
            entity_set: entity_set.to_string(),
            public_key: String::new(),
            document: None,
        });
    }
}
