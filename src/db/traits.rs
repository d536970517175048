//! Repository contracts used by the sync engine and transformers.
//!
//! Every write is idempotent: re-delivering the same fact either leaves the
//! stored row untouched or replaces it atomically.

use async_trait::async_trait;

use super::error::RepositoryError;
use super::types::DbOperation;
use crate::types::chain::{Block, Header, LogFilter, StorageDiffRow, WatchedEvent};

/// Result of a create-or-update call keyed by block number.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    /// Nothing was stored at this number yet.
    Inserted,
    /// A row with a different hash was deleted (with its children) and the new
    /// one inserted, as a single transaction.
    Replaced,
    /// The stored row already has this hash; nothing was written.
    Unchanged,
}

#[async_trait]
pub trait BlockRepository: Send + Sync {
    async fn create_or_update_block(&self, block: &Block) -> Result<UpsertOutcome, RepositoryError>;

    /// Block numbers in `[start, end]` not yet stored for this node.
    async fn missing_block_numbers(&self, start: i64, end: i64) -> Result<Vec<i64>, RepositoryError>;

    /// Marks final every non-final block numbered below `chain_head - finality_lag`.
    /// Returns the number of blocks that became final.
    async fn set_blocks_status(
        &self,
        chain_head: i64,
        finality_lag: i64,
    ) -> Result<u64, RepositoryError>;
}

#[async_trait]
pub trait HeaderRepository: Send + Sync {
    async fn create_or_update_header(&self, header: &Header)
        -> Result<UpsertOutcome, RepositoryError>;

    async fn header_exists(&self, block_number: i64) -> Result<bool, RepositoryError>;

    /// Header numbers in `[start, end]` not yet stored for this node.
    async fn missing_block_numbers(&self, start: i64, end: i64) -> Result<Vec<i64>, RepositoryError>;
}

#[async_trait]
pub trait FilterRepository: Send + Sync {
    /// Rejects empty and duplicate names.
    async fn create_filter(&self, filter: &LogFilter) -> Result<(), RepositoryError>;

    async fn get_filter(&self, name: &str) -> Result<LogFilter, RepositoryError>;
}

#[async_trait]
pub trait WatchedEventRepository: Send + Sync {
    /// Every stored log currently matching the named filter. Reading does not
    /// consume the events.
    async fn get_watched_events(&self, filter_name: &str)
        -> Result<Vec<WatchedEvent>, RepositoryError>;
}

/// A queued storage diff with its queue id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueuedStorageDiff {
    pub id: i64,
    pub row: StorageDiffRow,
}

/// Durable holding area for storage diffs that could not be transformed yet.
#[async_trait]
pub trait StorageQueue: Send + Sync {
    /// Adding an identical row twice keeps a single entry.
    async fn add(&self, row: &StorageDiffRow) -> Result<(), RepositoryError>;

    async fn get_all(&self) -> Result<Vec<QueuedStorageDiff>, RepositoryError>;

    async fn delete(&self, id: i64) -> Result<(), RepositoryError>;
}

/// Executes transformer output as one transaction.
#[async_trait]
pub trait OperationSink: Send + Sync {
    async fn execute(&self, operations: Vec<DbOperation>) -> Result<(), RepositoryError>;
}

/// Gap queries for transformers that persist one fact per block.
#[async_trait]
pub trait BlockFactRepository: Send + Sync {
    /// Block numbers in `[start, end]` that are stored as blocks but have no
    /// row in `fact_table` yet.
    async fn missing_fact_blocks(
        &self,
        fact_table: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<i64>, RepositoryError>;
}
