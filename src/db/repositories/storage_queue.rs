use std::sync::Arc;

use async_trait::async_trait;

use super::{get_address, get_b256};
use crate::db::traits::{QueuedStorageDiff, StorageQueue};
use crate::db::{DbPool, RepositoryError};
use crate::types::chain::StorageDiffRow;

/// `queued_storage` table. Duplicate rows are absorbed by its unique
/// constraint.
pub struct PgStorageQueue {
    pool: Arc<DbPool>,
}

impl PgStorageQueue {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl StorageQueue for PgStorageQueue {
    async fn add(&self, row: &StorageDiffRow) -> Result<(), RepositoryError> {
        let client = self.pool.inner().get().await?;
        client
            .execute(
                "INSERT INTO queued_storage
                    (contract, block_hash, block_height, storage_key, storage_value)
                 VALUES ($1, $2, $3, $4, $5)
                 ON CONFLICT ON CONSTRAINT queued_storage_uc DO NOTHING",
                &[
                    &row.contract.as_slice(),
                    &row.block_hash.as_slice(),
                    &row.block_height,
                    &row.storage_key.as_slice(),
                    &row.storage_value.as_slice(),
                ],
            )
            .await?;
        Ok(())
    }

    async fn get_all(&self) -> Result<Vec<QueuedStorageDiff>, RepositoryError> {
        let client = self.pool.inner().get().await?;
        let rows = client
            .query(
                "SELECT id, contract, block_hash, block_height, storage_key, storage_value
                 FROM queued_storage ORDER BY id",
                &[],
            )
            .await?;

        rows.iter()
            .map(|row| {
                Ok(QueuedStorageDiff {
                    id: row.try_get("id")?,
                    row: StorageDiffRow {
                        contract: get_address(row, "contract")?,
                        block_hash: get_b256(row, "block_hash")?,
                        block_height: row.try_get("block_height")?,
                        storage_key: get_b256(row, "storage_key")?,
                        storage_value: get_b256(row, "storage_value")?,
                    },
                })
            })
            .collect()
    }

    async fn delete(&self, id: i64) -> Result<(), RepositoryError> {
        let client = self.pool.inner().get().await?;
        client
            .execute("DELETE FROM queued_storage WHERE id = $1", &[&id])
            .await?;
        Ok(())
    }
}
