//! Configuration for the transformation system.

use std::time::Duration;

use serde::Deserialize;

/// Configuration for the transformer watcher.
///
/// Each entry in `event_transformers` binds a set of log filter names to the
/// built-in watched-event recorder.
#[derive(Debug, Clone, Deserialize)]
pub struct TransformationConfig {
    /// Seconds between two `Watcher::execute` passes.
    #[serde(default = "default_watch_interval_secs")]
    pub watch_interval_secs: u64,

    #[serde(default)]
    pub event_transformers: Vec<EventTransformerConfig>,

    /// Records the miner reward of every stored block from this block on.
    #[serde(default)]
    pub miner_rewards: Option<MinerRewardsConfig>,

    #[serde(default)]
    pub event_source: EventSource,
}

/// Where event transformers read their watched events from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// Logs stored by full sync, matched by the `watched_event_logs` view.
    #[default]
    Database,
    /// `eth_getLogs` per filter, for header-only deployments.
    Chain,
}

/// A named transformer consuming the watched events of one or more filters.
#[derive(Debug, Clone, Deserialize)]
pub struct EventTransformerConfig {
    pub name: String,
    pub filters: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinerRewardsConfig {
    #[serde(default)]
    pub starting_block: i64,
}

fn default_watch_interval_secs() -> u64 {
    7
}

impl TransformationConfig {
    pub fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch_interval_secs)
    }
}

impl Default for TransformationConfig {
    fn default() -> Self {
        Self {
            watch_interval_secs: default_watch_interval_secs(),
            event_transformers: Vec::new(),
            miner_rewards: None,
            event_source: EventSource::default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_source_defaults_to_database() {
        let config: TransformationConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.event_source, EventSource::Database);

        let config: TransformationConfig =
            serde_json::from_str(r#"{"event_source": "chain"}"#).unwrap();
        assert_eq!(config.event_source, EventSource::Chain);
    }
}
