use std::sync::Arc;

use async_trait::async_trait;

use super::lock_number;
use crate::db::traits::{HeaderRepository, UpsertOutcome};
use crate::db::{DbPool, RepositoryError};
use crate::types::chain::Header;

pub struct PgHeaderRepository {
    pool: Arc<DbPool>,
    node_id: i32,
}

impl PgHeaderRepository {
    pub fn new(pool: Arc<DbPool>, node_id: i32) -> Self {
        Self { pool, node_id }
    }

    async fn upsert_header(&self, header: &Header) -> Result<UpsertOutcome, RepositoryError> {
        let raw: serde_json::Value = serde_json::from_slice(&header.raw).map_err(|e| {
            RepositoryError::Decode {
                column: "raw".to_string(),
                message: e.to_string(),
            }
        })?;
        let timestamp = header.timestamp as i64;

        let mut client = self.pool.inner().get().await?;
        let tx = client.transaction().await?;
        lock_number(&tx, "headers", self.node_id, header.block_number).await?;

        let existing = tx
            .query_opt(
                "SELECT hash FROM headers WHERE block_number = $1 AND eth_node_id = $2 FOR UPDATE",
                &[&header.block_number, &self.node_id],
            )
            .await?;

        let outcome = match existing {
            Some(row) => {
                let stored: Vec<u8> = row.try_get(0)?;
                if stored.as_slice() == header.hash.as_slice() {
                    return Ok(UpsertOutcome::Unchanged);
                }
                tx.execute(
                    "DELETE FROM headers WHERE block_number = $1 AND eth_node_id = $2",
                    &[&header.block_number, &self.node_id],
                )
                .await?;
                UpsertOutcome::Replaced
            }
            None => UpsertOutcome::Inserted,
        };

        tx.execute(
            "INSERT INTO headers (eth_node_id, block_number, hash, raw, block_timestamp)
             VALUES ($1, $2, $3, $4, $5)",
            &[
                &self.node_id,
                &header.block_number,
                &header.hash.as_slice(),
                &raw,
                &timestamp,
            ],
        )
        .await?;
        tx.commit().await?;

        Ok(outcome)
    }
}

#[async_trait]
impl HeaderRepository for PgHeaderRepository {
    async fn create_or_update_header(
        &self,
        header: &Header,
    ) -> Result<UpsertOutcome, RepositoryError> {
        match self.upsert_header(header).await {
            Err(e) if e.is_unique_violation() => {
                tracing::debug!(
                    "Header {} was written concurrently, keeping stored row",
                    header.block_number
                );
                Ok(UpsertOutcome::Unchanged)
            }
            result => result,
        }
    }

    async fn header_exists(&self, block_number: i64) -> Result<bool, RepositoryError> {
        let client = self.pool.inner().get().await?;
        let row = client
            .query_one(
                "SELECT EXISTS (
                    SELECT 1 FROM headers WHERE block_number = $1 AND eth_node_id = $2
                 )",
                &[&block_number, &self.node_id],
            )
            .await?;
        Ok(row.try_get(0)?)
    }

    async fn missing_block_numbers(&self, start: i64, end: i64) -> Result<Vec<i64>, RepositoryError> {
        let client = self.pool.inner().get().await?;
        let rows = client
            .query(
                "SELECT series.number
                 FROM generate_series($1::BIGINT, $2::BIGINT) AS series(number)
                 LEFT JOIN headers
                    ON headers.block_number = series.number AND headers.eth_node_id = $3
                 WHERE headers.id IS NULL
                 ORDER BY series.number",
                &[&start, &end, &self.node_id],
            )
            .await?;
        rows.iter()
            .map(|row| row.try_get(0).map_err(RepositoryError::from))
            .collect()
    }
}
