//! Named log subscriptions.

use std::str::FromStr;

use alloy_primitives::{Address, B256};
use serde::Deserialize;
use thiserror::Error;

use super::block::{Log, Topics};

/// Sentinel for an open block bound.
pub const UNBOUNDED: i64 = -1;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FilterDecodeError {
    #[error("log filter requires a name")]
    MissingName,

    #[error("invalid filter address: {0}")]
    InvalidAddress(String),

    #[error("invalid block number: {0}")]
    InvalidBlockNumber(String),

    #[error("invalid topic: {0}")]
    InvalidTopic(String),

    #[error("log filter supports at most 4 topics, got {0}")]
    TooManyTopics(usize),
}

/// A named, persistent subscription describing which contract logs to watch.
///
/// `name` is the natural key. `from_block`/`to_block` use [`UNBOUNDED`] for an
/// open range and `None` topics are wildcards.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "RawLogFilter")]
pub struct LogFilter {
    pub name: String,
    pub from_block: i64,
    pub to_block: i64,
    pub address: Address,
    pub topics: Topics,
}

impl LogFilter {
    /// Whether `log` satisfies this filter: exact address, block range, and
    /// every non-wildcard topic equal to the log's topic in the same slot.
    pub fn matches(&self, log: &Log) -> bool {
        if log.address != self.address {
            return false;
        }
        if self.from_block != UNBOUNDED && log.block_number < self.from_block {
            return false;
        }
        if self.to_block != UNBOUNDED && log.block_number > self.to_block {
            return false;
        }
        self.topics
            .iter()
            .zip(log.topics.iter())
            .all(|(wanted, actual)| match wanted {
                Some(topic) => actual.as_ref() == Some(topic),
                None => true,
            })
    }
}

/// Web3-style JSON shape: hex block numbers, `null` topic wildcards.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawLogFilter {
    name: Option<String>,
    from_block: Option<String>,
    to_block: Option<String>,
    address: String,
    #[serde(default)]
    topics: Vec<Option<String>>,
}

impl TryFrom<RawLogFilter> for LogFilter {
    type Error = FilterDecodeError;

    fn try_from(raw: RawLogFilter) -> Result<Self, Self::Error> {
        let name = raw
            .name
            .filter(|n| !n.trim().is_empty())
            .ok_or(FilterDecodeError::MissingName)?;

        let address = Address::from_str(raw.address.trim())
            .map_err(|_| FilterDecodeError::InvalidAddress(raw.address.clone()))?;

        if raw.topics.len() > 4 {
            return Err(FilterDecodeError::TooManyTopics(raw.topics.len()));
        }
        let mut topics: Topics = [None; 4];
        for (slot, topic) in topics.iter_mut().zip(raw.topics) {
            *slot = match topic {
                Some(t) if !t.is_empty() => Some(
                    B256::from_str(&t).map_err(|_| FilterDecodeError::InvalidTopic(t.clone()))?,
                ),
                _ => None,
            };
        }

        Ok(LogFilter {
            name,
            from_block: parse_block_number(raw.from_block.as_deref())?,
            to_block: parse_block_number(raw.to_block.as_deref())?,
            address,
            topics,
        })
    }
}

fn parse_block_number(value: Option<&str>) -> Result<i64, FilterDecodeError> {
    let Some(value) = value else {
        return Ok(UNBOUNDED);
    };
    let digits = value.strip_prefix("0x").unwrap_or(value);
    i64::from_str_radix(digits, 16)
        .map_err(|_| FilterDecodeError::InvalidBlockNumber(value.to_string()))
}
