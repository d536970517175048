use std::sync::Arc;

use async_trait::async_trait;

use super::{get_address, get_b256, get_topics};
use crate::db::traits::WatchedEventRepository;
use crate::db::{DbPool, RepositoryError};
use crate::types::chain::WatchedEvent;

/// Reads the `watched_event_logs` view, which joins stored logs against
/// registered filters.
pub struct PgWatchedEventRepository {
    pool: Arc<DbPool>,
}

impl PgWatchedEventRepository {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WatchedEventRepository for PgWatchedEventRepository {
    async fn get_watched_events(
        &self,
        filter_name: &str,
    ) -> Result<Vec<WatchedEvent>, RepositoryError> {
        let client = self.pool.inner().get().await?;
        let rows = client
            .query(
                "SELECT name, log_id, block_number, address, tx_hash, index,
                        topic0, topic1, topic2, topic3, data
                 FROM watched_event_logs
                 WHERE name = $1
                 ORDER BY block_number, log_id",
                &[&filter_name],
            )
            .await?;

        rows.iter()
            .map(|row| {
                let data: Vec<u8> = row.try_get("data")?;
                Ok(WatchedEvent {
                    name: row.try_get("name")?,
                    log_id: row.try_get("log_id")?,
                    block_number: row.try_get("block_number")?,
                    address: get_address(row, "address")?,
                    tx_hash: get_b256(row, "tx_hash")?,
                    index: row.try_get("index")?,
                    topics: get_topics(row)?,
                    data: data.into(),
                })
            })
            .collect()
    }
}
