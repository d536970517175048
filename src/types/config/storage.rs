use std::path::PathBuf;
use std::time::Duration;

use alloy_primitives::Address;
use serde::Deserialize;

/// Configuration for the storage-diff watcher process.
#[derive(Debug, Clone, Deserialize)]
pub struct StorageWatcherConfig {
    /// Append-only diff feed to tail.
    pub diff_path: PathBuf,

    /// How long the tailer sleeps at end of file before polling again.
    #[serde(default = "default_tail_poll_ms")]
    pub tail_poll_interval_ms: u64,

    /// Interval between replays of queued (previously failed) rows.
    #[serde(default = "default_queue_retry_secs")]
    pub queue_retry_interval_secs: u64,

    /// Contracts whose raw diffs are recorded.
    #[serde(default)]
    pub contracts: Vec<Address>,
}

fn default_tail_poll_ms() -> u64 {
    500
}

fn default_queue_retry_secs() -> u64 {
    60
}

impl StorageWatcherConfig {
    pub fn tail_poll_interval(&self) -> Duration {
        Duration::from_millis(self.tail_poll_interval_ms)
    }

    pub fn queue_retry_interval(&self) -> Duration {
        Duration::from_secs(self.queue_retry_interval_secs)
    }
}
