//! Watched events read from the node with `eth_getLogs`.
//!
//! Header-only deployments store no logs, so the `watched_event_logs` view is
//! always empty for them. This source asks the node for each filter's logs
//! instead and matches them locally.

use std::sync::Arc;

use async_trait::async_trait;

use crate::db::{FilterRepository, RepositoryError, WatchedEventRepository};
use crate::rpc::BlockChain;
use crate::types::chain::{match_logs, Log, WatchedEvent};

/// Low bits of a [`log_key`] reserved for the log index.
const LOG_INDEX_BITS: u32 = 24;

/// Stable id for a log that has no `logs` row: the block number in the high
/// bits and the index within the block in the low 24.
pub fn log_key(log: &Log) -> i64 {
    (log.block_number << LOG_INDEX_BITS) | (log.index & ((1 << LOG_INDEX_BITS) - 1))
}

pub struct ChainWatchedEvents {
    chain: Arc<dyn BlockChain>,
    filters: Arc<dyn FilterRepository>,
}

impl ChainWatchedEvents {
    pub fn new(chain: Arc<dyn BlockChain>, filters: Arc<dyn FilterRepository>) -> Self {
        Self { chain, filters }
    }
}

#[async_trait]
impl WatchedEventRepository for ChainWatchedEvents {
    async fn get_watched_events(
        &self,
        filter_name: &str,
    ) -> Result<Vec<WatchedEvent>, RepositoryError> {
        let filter = self.filters.get_filter(filter_name).await?;
        let logs = self
            .chain
            .get_logs(&filter)
            .await
            .map_err(|e| RepositoryError::Backend(e.to_string()))?;

        let keyed = logs.iter().map(|log| (log_key(log), log));
        let mut events = match_logs(std::slice::from_ref(&filter), keyed);
        events.sort_by_key(|e| (e.block_number, e.log_id));

        tracing::debug!(
            "Fetched {} of {} logs for filter '{}' from the node",
            events.len(),
            logs.len(),
            filter_name
        );
        Ok(events)
    }
}
