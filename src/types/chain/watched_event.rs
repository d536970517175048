use alloy_primitives::{Address, Bytes, B256};
use serde::{Deserialize, Serialize};

use super::block::{Log, Topics};
use super::filter::LogFilter;

/// A stored log that matched a registered [`LogFilter`].
///
/// One log produces one watched event per matching filter. `log_id` is the
/// key downstream transformers use to make re-delivery harmless.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatchedEvent {
    /// Name of the filter that matched.
    pub name: String,
    pub log_id: i64,
    pub block_number: i64,
    pub address: Address,
    pub tx_hash: B256,
    pub index: i64,
    pub topics: Topics,
    pub data: Bytes,
}

impl WatchedEvent {
    pub fn from_log(filter_name: &str, log_id: i64, log: &Log) -> Self {
        Self {
            name: filter_name.to_string(),
            log_id,
            block_number: log.block_number,
            address: log.address,
            tx_hash: log.tx_hash,
            index: log.index,
            topics: log.topics,
            data: log.data.clone(),
        }
    }
}

/// Evaluates every `(log_id, log)` against every filter.
///
/// Output is grouped by log in input order, then by filter in registration
/// order.
pub fn match_logs<'a, I>(filters: &[LogFilter], logs: I) -> Vec<WatchedEvent>
where
    I: IntoIterator<Item = (i64, &'a Log)>,
{
    let mut events = Vec::new();
    for (log_id, log) in logs {
        for filter in filters.iter().filter(|f| f.matches(log)) {
            events.push(WatchedEvent::from_log(&filter.name, log_id, log));
        }
    }
    events
}
