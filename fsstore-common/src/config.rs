//! Configuration for the fs-store persistence provider.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Provider configuration (§6 "Provider configuration" of the data model).
///
/// `logger` is intentionally absent here: this crate treats logging as an
/// ambient concern handled through `tracing`, not a value threaded through
/// config. Callers install a subscriber the way any `tracing`-instrumented
/// binary does.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Root directory the provider owns exclusively.
    pub data_directory: PathBuf,

    /// How recently a path must have been written by this provider instance
    /// for a matching filesystem event to be suppressed as self-inflicted.
    #[serde(default = "default_self_write_skip_threshold_ms")]
    pub self_write_skip_threshold_ms: u64,

    /// Debounce window applied to raw filesystem events before they are
    /// turned into `reload` actions.
    #[serde(default = "default_watch_debounce_ms")]
    pub watch_debounce_ms: u64,

    /// Sync envelopes serializing larger than this many bytes are
    /// republished as a `refresh` pointer instead of carrying the payload.
    #[serde(default = "default_message_size_limit")]
    pub message_size_limit: usize,

    /// Whether to start the filesystem watcher during `init()`. Disabled in
    /// most tests, where external edits are simulated directly.
    #[serde(default = "default_watch_enabled")]
    pub watch_enabled: bool,
}

fn default_self_write_skip_threshold_ms() -> u64 {
    500
}

fn default_watch_debounce_ms() -> u64 {
    50
}

fn default_message_size_limit() -> usize {
    64 * 1024
}

fn default_watch_enabled() -> bool {
    true
}

impl ProviderConfig {
    /// Build a config rooted at `data_directory` with every other field at
    /// its default.
    pub fn new(data_directory: impl Into<PathBuf>) -> Self {
        Self {
            data_directory: data_directory.into(),
            self_write_skip_threshold_ms: default_self_write_skip_threshold_ms(),
            watch_debounce_ms: default_watch_debounce_ms(),
            message_size_limit: default_message_size_limit(),
            watch_enabled: default_watch_enabled(),
        }
    }

    pub fn with_self_write_skip_threshold_ms(mut self, ms: u64) -> Self {
        self.self_write_skip_threshold_ms = ms;
        self
    }

    pub fn with_message_size_limit(mut self, limit: usize) -> Self {
        self.message_size_limit = limit;
        self
    }

    pub fn with_watch_enabled(mut self, enabled: bool) -> Self {
        self.watch_enabled = enabled;
        self
    }

    /// Load a config from a JSON file on disk.
    pub async fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = tokio::fs::read_to_string(path.as_ref())
            .await
            .map_err(Error::Io)?;
        serde_json::from_str(&content).map_err(Error::from)
    }
}
