//! Filesystem watcher (§4.5): turns external filesystem edits into `reload`
//! events. Writes the store makes itself are suppressed for a short window
//! so they don't bounce back as a spurious external edit - `Provider` wires
//! [`FsWatcher::note_self_write`] into every index as a write-observer
//! closure, called before each path is written or removed, and consulted
//! here as `notify` events arrive.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use fsstore_common::{Error, Result};
use notify::{Event, RecommendedWatcher, RecursiveMode, Watcher};
use parking_lot::Mutex;
use tokio::sync::mpsc;

/// An external change, resolved to the entity set (and document, where the
/// path is specific enough to tell) it affects.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReloadEvent {
    pub entity_set: String,
    pub public_key: Option<String>,
}

/// Paths this process just wrote, pruned of anything older than the skip
/// threshold on every touch so the map stays bounded regardless of how long
/// the watcher runs (§4.5, §8 scenario 7).
#[derive(Default)]
struct SelfWrites {
    threshold: Duration,
    recent: HashMap<PathBuf, Instant>,
}

impl SelfWrites {
    fn new(threshold: Duration) -> Self {
        Self { threshold, recent: HashMap::new() }
    }

    fn record(&mut self, path: PathBuf) {
        let now = Instant::now();
        self.recent.insert(path, now);
        self.prune(now);
    }

    fn take_if_recent(&mut self, path: &Path) -> bool {
        let now = Instant::now();
        self.prune(now);
        if let Some(&when) = self.recent.get(path) {
            if now.duration_since(when) <= self.threshold {
                self.recent.remove(path);
                return true;
            }
        }
        false
    }

    fn prune(&mut self, now: Instant) {
        let threshold = self.threshold;
        self.recent.retain(|_, when| now.duration_since(*when) <= threshold);
    }
}

pub struct FsWatcher {
    _watcher: RecommendedWatcher,
    self_writes: Arc<Mutex<SelfWrites>>,
}

impl FsWatcher {
    /// Start watching `root` (a provider's data directory) and return the
    /// watcher plus a channel of debounced reload events. `debounce`
    /// coalesces the several file-level events one directory-mode commit
    /// produces into a single reload per path.
    pub fn spawn(
        root: &Path,
        debounce: Duration,
        self_write_skip_threshold: Duration,
    ) -> Result<(Self, mpsc::UnboundedReceiver<ReloadEvent>)> {
        let self_writes = Arc::new(Mutex::new(SelfWrites::new(self_write_skip_threshold)));
        let (tx, rx) = mpsc::unbounded_channel();
        let (raw_tx, mut raw_rx) = mpsc::unbounded_channel::<Event>();

        let mut watcher = notify::recommended_watcher(move |res: notify::Result<Event>| {
            if let Ok(event) = res {
                let _ = raw_tx.send(event);
            }
        })
        .map_err(|e| Error::Internal(format!("failed to start filesystem watcher: {e}")))?;

        watcher
            .watch(root, RecursiveMode::Recursive)
            .map_err(|e| Error::Internal(format!("failed to watch {}: {e}", root.display())))?;

        let root = root.to_path_buf();
        let watch_self_writes = self_writes.clone();
        tokio::spawn(async move {
            let mut pending: HashMap<PathBuf, tokio::time::Instant> = HashMap::new();
            loop {
                let sleep = tokio::time::sleep(debounce);
                tokio::select! {
                    event = raw_rx.recv() => {
                        let Some(event) = event else { break };
                        for path in event.paths {
                            if is_staging_path(&root, &path) {
                                continue;
                            }
                            if watch_self_writes.lock().take_if_recent(&path) {
                                continue;
                            }
                            pending.insert(path, tokio::time::Instant::now() + debounce);
                        }
                    }
                    _ = sleep, if !pending.is_empty() => {
                        let now = tokio::time::Instant::now();
                        let ready: Vec<PathBuf> = pending
                            .iter()
                            .filter(|(_, at)| **at <= now)
                            .map(|(p, _)| p.clone())
                            .collect();
                        for path in ready {
                            pending.remove(&path);
                            if let Some(reload) = resolve_reload(&root, &path) {
                                if tx.send(reload).is_err() {
                                    return;
                                }
                            }
                        }
                    }
                }
            }
        });

        Ok((Self { _watcher: watcher, self_writes }, rx))
    }

    /// Record a path this process is about to write, so the matching notify
    /// event is dropped instead of producing a self-inflicted reload.
    pub fn note_self_write(&self, path: PathBuf) {
        self.self_writes.lock().record(path);
    }
}

fn is_staging_path(root: &Path, path: &Path) -> bool {
    path.strip_prefix(root)
        .ok()
        .and_then(|rel| rel.components().next())
        .map(|c| c.as_os_str().to_string_lossy().starts_with('~'))
        .unwrap_or(false)
}

/// Resolve a changed path to the entity set (and, for directory mode, the
/// document) it belongs to: `root/<entity_set>/<public_key>/...` for
/// directory mode, `root/<entity_set>` for flat mode.
fn resolve_reload(root: &Path, path: &Path) -> Option<ReloadEvent> {
    let rel = path.strip_prefix(root).ok()?;
    let parts: Vec<String> = rel.components().map(|c| c.as_os_str().to_string_lossy().into_owned()).collect();
    let first = parts.first()?.clone();

    if parts.len() == 1 {
        let entity_set = match first.rfind('.') {
            Some(dot) => first[..dot].to_string(),
            None => first,
        };
        return Some(ReloadEvent { entity_set, public_key: None });
    }

    Some(ReloadEvent { entity_set: first, public_key: parts.get(1).cloned() })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn resolves_directory_mode_path() {
        let root = Path::new("/data");
        let path = Path::new("/data/templates/alice/config.json");
        let event = resolve_reload(root, path).unwrap();
        assert_eq!(event.entity_set, "templates");
        assert_eq!(event.public_key.as_deref(), Some("alice"));
    }

    #[test]
    fn resolves_flat_mode_path() {
        let root = Path::new("/data");
        let path = Path::new("/data/templates");
        let event = resolve_reload(root, path).unwrap();
        assert_eq!(event.entity_set, "templates");
        assert_eq!(event.public_key, None);
    }

    #[test]
    fn staging_paths_are_recognized() {
        let root = Path::new("/data");
        assert!(is_staging_path(root, Path::new("/data/~~alice/config.json")));
        assert!(!is_staging_path(root, Path::new("/data/alice/config.json")));
    }

    #[test]
    fn self_write_suppression_expires() {
        let mut writes = SelfWrites::new(Duration::from_millis(0));
        let path = PathBuf::from("/data/templates/alice/config.json");
        writes.record(path.clone());
        std::thread::sleep(Duration::from_millis(5));
        assert!(!writes.take_if_recent(&path));
    }

    #[test]
    fn self_write_suppression_within_threshold() {
        let mut writes = SelfWrites::new(Duration::from_secs(5));
        let path = PathBuf::from("/data/templates/alice/config.json");
        writes.record(path.clone());
        assert!(writes.take_if_recent(&path));
        assert!(!writes.take_if_recent(&path));
    }
}
