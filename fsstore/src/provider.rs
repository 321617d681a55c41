//! Provider: wires a [`SchemaView`] and a [`ProviderConfig`] into a running
//! store - one [`Index`] per registered entity set, a single [`WriteQueue`]
//! serializing every mutation across all of them, an optional [`FsWatcher`]
//! translating external edits into reloads, and a [`SyncChannel`] for
//! publishing to (and applying from) other instances sharing the same data
//! directory.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use fsstore_common::{Error, ProviderConfig, Result};
use fsstore_core::{EntitySetSchema, Index, SchemaView, StorageMode, WriteObserver};
use fsstore_sync::{FsWatcher, SyncAction, SyncChannel, SyncEnvelope, WriteQueue};

use crate::collection::Collection;

pub struct Provider {
    queue: WriteQueue,
    channel: Arc<SyncChannel>,
    indexes: HashMap<String, Arc<Index>>,
    // Kept alive for as long as the provider runs; dropping it stops watching.
    _watcher: Option<Arc<FsWatcher>>,
}

impl Provider {
    /// Initialize every registered entity set: run crash recovery (directory
    /// mode) or replay the append log (flat mode), then start watching for
    /// external edits if configured to.
    pub async fn init(config: ProviderConfig, schema_view: SchemaView) -> Result<Arc<Self>> {
        let schema_view = Arc::new(schema_view);
        tokio::fs::create_dir_all(&config.data_directory).await.map_err(Error::Io)?;

        // Started before any index exists, so the write observer below can
        // record every index write against the watcher's self-write window
        // from the very first insert.
        let watcher_handle = if config.watch_enabled {
            let (watcher, reload_rx) = FsWatcher::spawn(
                &config.data_directory,
                Duration::from_millis(config.watch_debounce_ms),
                Duration::from_millis(config.self_write_skip_threshold_ms),
            )?;
            Some((Arc::new(watcher), reload_rx))
        } else {
            None
        };

        let write_observer: Option<WriteObserver> = watcher_handle.as_ref().map(|(watcher, _)| {
            let watcher = watcher.clone();
            Arc::new(move |path: &std::path::Path| watcher.note_self_write(path.to_path_buf())) as WriteObserver
        });

        let mut indexes = HashMap::new();
        for name in schema_view.set_names() {
            let schema = schema_view.get(name)?.clone();
            let base = entity_set_path(&config, &schema);
            if let StorageMode::Directory = schema.mode {
                tokio::fs::create_dir_all(&base).await.map_err(Error::Io)?;
            }
            let mut index = Index::new(schema_view.clone(), schema, base);
            if let Some(observer) = &write_observer {
                index = index.with_write_observer(observer.clone());
            }
            let index = Arc::new(index);
            index.load().await?;
            indexes.insert(name.to_string(), index);
        }

        let queue = WriteQueue::spawn();
        let channel = Arc::new(SyncChannel::new(config.message_size_limit));

        let watcher = if let Some((watcher, mut reload_rx)) = watcher_handle {
            let indexes_for_task = indexes.clone();
            let queue_for_task = queue.clone();
            let channel_for_task = channel.clone();
            tokio::spawn(async move {
                while let Some(event) = reload_rx.recv().await {
                    let Some(index) = indexes_for_task.get(&event.entity_set).cloned() else {
                        continue;
                    };
                    let entity_set = event.entity_set.clone();
                    let channel_for_reload = channel_for_task.clone();
                    queue_for_task
                        .enqueue(move || async move {
                            match index.load().await {
                                Ok(()) => channel_for_reload.publish_reload(&entity_set),
                                Err(e) => tracing::warn!(entity_set = %entity_set, error = %e, "reload after external edit failed"),
                            }
                        })
                        .await;
                }
            });

            Some(watcher)
        } else {
            None
        };

        Ok(Arc::new(Self { queue, channel, indexes, _watcher: watcher }))
    }

    /// A handle to one registered entity set's documents.
    pub fn collection(&self, name: &str) -> Result<Collection> {
        let index = self.indexes.get(name).cloned().ok_or_else(|| Error::SchemaUnknown(name.to_string()))?;
        Ok(Collection::new(index, self.queue.clone(), self.channel.clone()))
    }

    /// Subscribe to every change this provider publishes, for bridging onto
    /// whatever transport carries sync envelopes to other instances.
    pub fn sync(&self) -> tokio::sync::broadcast::Receiver<SyncEnvelope> {
        self.channel.subscribe()
    }

    /// Apply an envelope received from another instance. Queued like any
    /// other mutation so it's serialized against concurrent local writes
    /// (§4.7).
    pub async fn apply_sync(&self, envelope: SyncEnvelope) -> Result<()> {
        let index = self
            .indexes
            .get(&envelope.entity_set)
            .cloned()
            .ok_or_else(|| Error::SchemaUnknown(envelope.entity_set.clone()))?;

        self.queue
            .enqueue(move || async move {
                match envelope.action {
                    SyncAction::Insert | SyncAction::Update => {
                        let Some(serde_json::Value::Object(record)) = envelope.document else {
                            tracing::warn!(public_key = %envelope.public_key, "inbound sync envelope missing document");
                            return;
                        };
                        match fsstore_core::codec::flat::decode_record(index.schema(), record) {
                            Ok(doc) => index.reindex(envelope.public_key, Some(doc)),
                            Err(e) => tracing::warn!(error = %e, "dropping malformed inbound sync document"),
                        }
                    }
                    SyncAction::Remove => index.reindex(envelope.public_key, None),
                    SyncAction::Refresh | SyncAction::Reload => {
                        if let Err(e) = index.load().await {
                            tracing::warn!(error = %e, "reload after refresh/reload envelope failed");
                        }
                    }
                }
            })
            .await;
        Ok(())
    }

    /// Force an out-of-band reload of one entity set from disk.
    pub async fn reload(&self, entity_set: &str) -> Result<()> {
        let index = self
            .indexes
            .get(entity_set)
            .cloned()
            .ok_or_else(|| Error::SchemaUnknown(entity_set.to_string()))?;
        self.queue.enqueue(move || async move { index.load().await }).await
    }
}

fn entity_set_path(config: &ProviderConfig, schema: &EntitySetSchema) -> std::path::PathBuf {
    config.data_directory.join(&schema.name)
}
