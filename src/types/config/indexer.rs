use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::types::chain::LogFilter;
use crate::types::config::chain::ChainConfig;
use crate::types::config::filters::{resolve_filters, FiltersOrPath};
use crate::types::config::storage::StorageWatcherConfig;
use crate::types::config::sync::SyncConfig;
use crate::types::config::transformations::TransformationConfig;

#[derive(Debug, Deserialize)]
pub struct IndexerConfigRaw {
    pub chain: ChainConfig,
    #[serde(default = "default_database_url_env_var")]
    pub database_url_env_var: String,
    #[serde(default)]
    pub sync: SyncConfig,
    #[serde(default)]
    pub filters: FiltersOrPath,
    #[serde(default)]
    pub transformations: TransformationConfig,
    #[serde(default)]
    pub storage: Option<StorageWatcherConfig>,
}

#[derive(Debug, Clone)]
pub struct IndexerConfig {
    pub chain: ChainConfig,
    pub database_url_env_var: String,
    pub sync: SyncConfig,
    pub filters: Vec<LogFilter>,
    pub transformations: TransformationConfig,
    pub storage: Option<StorageWatcherConfig>,
}

fn default_database_url_env_var() -> String {
    "DATABASE_URL".to_string()
}

impl IndexerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let base_dir = path.parent().unwrap_or(Path::new("."));
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;
        Self::from_json(&content, base_dir)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))
    }

    pub fn from_json(content: &str, base_dir: &Path) -> anyhow::Result<Self> {
        let mut raw: IndexerConfigRaw = serde_json::from_str(content)?;
        let filters = resolve_filters(std::mem::take(&mut raw.filters), base_dir)?;

        for transformer in &raw.transformations.event_transformers {
            for name in &transformer.filters {
                if !filters.iter().any(|f| &f.name == name) {
                    anyhow::bail!(
                        "Transformer '{}' references unknown log filter '{}'",
                        transformer.name,
                        name
                    );
                }
            }
        }

        validate_intervals(&raw)?;

        Ok(IndexerConfig {
            chain: raw.chain,
            database_url_env_var: raw.database_url_env_var,
            sync: raw.sync,
            filters,
            transformations: raw.transformations,
            storage: raw.storage,
        })
    }
}

/// Zero intervals would panic the tickers or spin the tailer.
fn validate_intervals(raw: &IndexerConfigRaw) -> anyhow::Result<()> {
    let sync = &raw.sync;
    anyhow::ensure!(sync.poll_interval_secs > 0, "sync.poll_interval_secs must be positive");
    anyhow::ensure!(
        sync.validation_window >= 0,
        "sync.validation_window must not be negative, got {}",
        sync.validation_window
    );
    anyhow::ensure!(
        sync.finality_lag >= 0,
        "sync.finality_lag must not be negative, got {}",
        sync.finality_lag
    );
    anyhow::ensure!(
        sync.starting_block >= 0,
        "sync.starting_block must not be negative, got {}",
        sync.starting_block
    );
    anyhow::ensure!(
        raw.transformations.watch_interval_secs > 0,
        "transformations.watch_interval_secs must be positive"
    );
    if let Some(storage) = &raw.storage {
        anyhow::ensure!(
            storage.queue_retry_interval_secs > 0,
            "storage.queue_retry_interval_secs must be positive"
        );
        anyhow::ensure!(
            storage.tail_poll_interval_ms > 0,
            "storage.tail_poll_interval_ms must be positive"
        );
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_minimal_config_uses_defaults() {
        let json = r#"{"chain": {"name": "mainnet", "rpc_url_env_var": "MAINNET_RPC_URL"}}"#;
        let config = IndexerConfig::from_json(json, Path::new(".")).unwrap();

        assert_eq!(config.chain.name, "mainnet");
        assert_eq!(config.chain.max_retries, 10);
        assert_eq!(config.database_url_env_var, "DATABASE_URL");
        assert_eq!(config.sync.finality_lag, 20);
        assert!(config.filters.is_empty());
        assert!(config.storage.is_none());
    }

    #[test]
    fn test_full_config() {
        let json = r#"{
            "chain": {"name": "mainnet", "rpc_url_env_var": "RPC", "requests_per_second": 25},
            "sync": {"starting_block": 100, "validation_window": 10,
                     "backfill_rearm": {"policy": "immediate"}},
            "filters": [{"name": "Transfers", "fromBlock": "0x10",
                         "address": "0x8888f1f195afa192cfee860698584c030f4c9db1"}],
            "transformations": {"event_transformers": [{"name": "transfers", "filters": ["Transfers"]}]},
            "storage": {"diff_path": "/tmp/diffs.csv",
                        "contracts": ["0x8888f1f195afa192cfee860698584c030f4c9db1"]}
        }"#;
        let config = IndexerConfig::from_json(json, Path::new(".")).unwrap();

        assert_eq!(config.chain.requests_per_second, Some(25));
        assert_eq!(config.sync.starting_block, 100);
        assert_eq!(config.filters[0].from_block, 16);
        assert_eq!(config.transformations.event_transformers[0].filters, vec!["Transfers"]);
        let storage = config.storage.unwrap();
        assert_eq!(storage.contracts.len(), 1);
        assert_eq!(storage.queue_retry_interval_secs, 60);
    }

    #[test]
    fn test_unknown_filter_reference_rejected() {
        let json = r#"{
            "chain": {"name": "mainnet", "rpc_url_env_var": "RPC"},
            "transformations": {"event_transformers": [{"name": "t", "filters": ["Missing"]}]}
        }"#;
        let err = IndexerConfig::from_json(json, Path::new(".")).unwrap_err();
        assert!(err.to_string().contains("Missing"));
    }

    #[test]
    fn test_zero_intervals_rejected() {
        let cases = [
            (r#""sync": {"poll_interval_secs": 0}"#, "poll_interval_secs"),
            (r#""transformations": {"watch_interval_secs": 0}"#, "watch_interval_secs"),
            (
                r#""storage": {"diff_path": "/tmp/d.csv", "queue_retry_interval_secs": 0}"#,
                "queue_retry_interval_secs",
            ),
            (
                r#""storage": {"diff_path": "/tmp/d.csv", "tail_poll_interval_ms": 0}"#,
                "tail_poll_interval_ms",
            ),
        ];
        for (section, field) in cases {
            let json = format!(
                r#"{{"chain": {{"name": "mainnet", "rpc_url_env_var": "RPC"}}, {}}}"#,
                section
            );
            let err = IndexerConfig::from_json(&json, Path::new(".")).unwrap_err();
            assert!(err.to_string().contains(field), "{}: {}", field, err);
        }
    }

    #[test]
    fn test_negative_window_and_lag_rejected() {
        for section in [
            r#""sync": {"validation_window": -1}"#,
            r#""sync": {"finality_lag": -5}"#,
            r#""sync": {"starting_block": -2}"#,
        ] {
            let json = format!(
                r#"{{"chain": {{"name": "mainnet", "rpc_url_env_var": "RPC"}}, {}}}"#,
                section
            );
            assert!(IndexerConfig::from_json(&json, Path::new(".")).is_err(), "{}", section);
        }

        let json = r#"{"chain": {"name": "mainnet", "rpc_url_env_var": "RPC"},
                       "sync": {"validation_window": 0, "finality_lag": 0}}"#;
        assert!(IndexerConfig::from_json(json, Path::new(".")).is_ok());
    }

    #[test]
    fn test_bundled_config_loads() {
        let config = IndexerConfig::load(Path::new("config/config.json")).unwrap();
        assert_eq!(config.filters.len(), 1);
        assert!(config.transformations.miner_rewards.is_some());
        assert!(config.storage.is_some());
    }
}
