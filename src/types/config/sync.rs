//! Configuration for block/header sync, validation and backfill.

use std::time::Duration;

use serde::Deserialize;

/// What the sync loop does after a backfill sweep reports completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(tag = "policy", rename_all = "snake_case")]
pub enum RearmPolicy {
    /// Relaunch the next sweep as soon as the previous one finishes.
    Immediate,
    /// Relaunch immediately after a productive sweep, but wait `delay_secs`
    /// after a sweep that filled nothing.
    Debounced { delay_secs: u64 },
}

impl RearmPolicy {
    /// Delay before relaunching, given how many rows the last sweep filled.
    pub fn delay_after(&self, filled: usize) -> Duration {
        match self {
            RearmPolicy::Immediate => Duration::ZERO,
            RearmPolicy::Debounced { delay_secs } if filled == 0 => {
                Duration::from_secs(*delay_secs)
            }
            RearmPolicy::Debounced { .. } => Duration::ZERO,
        }
    }
}

impl Default for RearmPolicy {
    fn default() -> Self {
        RearmPolicy::Debounced { delay_secs: 3 }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SyncConfig {
    /// First block number the backfill sweep covers.
    #[serde(default)]
    pub starting_block: i64,

    /// Number of blocks behind head re-checked on every validator tick.
    #[serde(default = "default_validation_window")]
    pub validation_window: i64,

    /// Blocks older than `head - finality_lag` are marked final.
    #[serde(default = "default_finality_lag")]
    pub finality_lag: i64,

    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    #[serde(default)]
    pub backfill_rearm: RearmPolicy,

    /// Status file written when a sync process starts.
    #[serde(default)]
    pub health_check_path: Option<String>,
}

fn default_validation_window() -> i64 {
    15
}

fn default_finality_lag() -> i64 {
    20
}

fn default_poll_interval_secs() -> u64 {
    7
}

impl SyncConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            starting_block: 0,
            validation_window: default_validation_window(),
            finality_lag: default_finality_lag(),
            poll_interval_secs: default_poll_interval_secs(),
            backfill_rearm: RearmPolicy::default(),
            health_check_path: None,
        }
    }
}
