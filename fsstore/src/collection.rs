//! Collection: the per-entity-set handle callers actually mutate and query.
//! Every operation is funneled through the provider's [`WriteQueue`] so
//! concurrent callers - and inbound sync envelopes applied by the provider -
//! observe a single, serialized order of mutations (§4.6), and every insert
//! or update that succeeds is published on the [`SyncChannel`] before it
//! returns (§4.7).

use std::sync::Arc;

use fsstore_common::{Document, Result};
use fsstore_core::{EqualityMatcher, Index};
use fsstore_sync::{SyncAction, SyncChannel, WriteQueue};
use serde_json::Value;

pub struct Collection {
    index: Arc<Index>,
    queue: WriteQueue,
    channel: Arc<SyncChannel>,
}

impl Collection {
    pub(crate) fn new(index: Arc<Index>, queue: WriteQueue, channel: Arc<SyncChannel>) -> Self {
        Self { index, queue, channel }
    }

    pub async fn insert(&self, doc: Document) -> Result<Document> {
        let index = self.index.clone();
        let inserted = self.queue.enqueue(move || async move { index.insert(doc).await }).await?;

        let public_key = self.index.schema().public_key_field();
        if let Some(key) = inserted.get_str(public_key) {
            if let Err(e) = self.channel.publish_upsert(self.index.schema(), SyncAction::Insert, key, &inserted) {
                tracing::warn!(error = %e, "failed to publish insert to sync channel");
            }
        }
        Ok(inserted)
    }

    pub async fn update(
        &self,
        query: serde_json::Map<String, Value>,
        patch: serde_json::Map<String, Value>,
        upsert: bool,
    ) -> Result<Vec<Document>> {
        let index = self.index.clone();
        let query_for_match = query.clone();
        let updated = self
            .queue
            .enqueue(move || async move {
                let matcher = EqualityMatcher::new(query_for_match.clone());
                let seed = if upsert { Some(&query_for_match) } else { None };
                index.update(&matcher, &patch, seed).await
            })
            .await?;

        let public_key = self.index.schema().public_key_field();
        for doc in &updated {
            if let Some(key) = doc.get_str(public_key) {
                if let Err(e) = self.channel.publish_upsert(self.index.schema(), SyncAction::Update, key, doc) {
                    tracing::warn!(error = %e, "failed to publish update to sync channel");
                }
            }
        }
        Ok(updated)
    }

    pub async fn remove(&self, query: serde_json::Map<String, Value>) -> Result<usize> {
        let index = self.index.clone();
        let public_key = self.index.schema().public_key_field().to_string();

        let (count, keys) = self
            .queue
            .enqueue(move || async move {
                let matcher = EqualityMatcher::new(query);
                let targets = index.find(&matcher);
                let keys: Vec<String> = targets.iter().filter_map(|d| d.get_str(&public_key).map(str::to_string)).collect();
                index.remove(&matcher).await.map(|count| (count, keys))
            })
            .await?;

        for key in keys {
            self.channel.publish_remove(&self.index.schema().name, &key);
        }
        Ok(count)
    }

    pub fn find(&self, query: serde_json::Map<String, Value>) -> Vec<Document> {
        self.index.find(&EqualityMatcher::new(query))
    }

    pub fn find_all(&self) -> Vec<Document> {
        self.index.all()
    }

    pub fn count(&self, query: serde_json::Map<String, Value>) -> usize {
        self.index.count(&EqualityMatcher::new(query))
    }

    pub fn get(&self, public_key: &str) -> Option<Document> {
        self.index.get(public_key)
    }
}
