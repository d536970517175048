use std::sync::Arc;

use async_trait::async_trait;
use deadpool_postgres::Transaction as PgTransaction;

use super::{lock_number, topic_param};
use crate::db::traits::{BlockRepository, UpsertOutcome};
use crate::db::{DbPool, RepositoryError};
use crate::types::chain::{Block, Log, Receipt, Transaction};

pub struct PgBlockRepository {
    pool: Arc<DbPool>,
    node_id: i32,
}

impl PgBlockRepository {
    pub fn new(pool: Arc<DbPool>, node_id: i32) -> Self {
        Self { pool, node_id }
    }

    async fn upsert_block(&self, block: &Block) -> Result<UpsertOutcome, RepositoryError> {
        let mut client = self.pool.inner().get().await?;
        let tx = client.transaction().await?;
        lock_number(&tx, "blocks", self.node_id, block.number).await?;

        let existing = tx
            .query_opt(
                "SELECT hash FROM blocks WHERE number = $1 AND eth_node_id = $2 FOR UPDATE",
                &[&block.number, &self.node_id],
            )
            .await?;

        let outcome = match existing {
            Some(row) => {
                let stored: Vec<u8> = row.try_get(0)?;
                if stored.as_slice() == block.hash.as_slice() {
                    return Ok(UpsertOutcome::Unchanged);
                }
                // Children go with the parent via ON DELETE CASCADE.
                tx.execute(
                    "DELETE FROM blocks WHERE number = $1 AND eth_node_id = $2",
                    &[&block.number, &self.node_id],
                )
                .await?;
                UpsertOutcome::Replaced
            }
            None => UpsertOutcome::Inserted,
        };

        self.insert_block(&tx, block).await?;
        tx.commit().await?;

        Ok(outcome)
    }

    async fn insert_block(&self, tx: &PgTransaction<'_>, block: &Block) -> Result<i64, RepositoryError> {
        let time = block.time as i64;
        let difficulty = block.difficulty.to_string();
        let gas_limit = block.gas_limit as i64;
        let gas_used = block.gas_used as i64;
        let reward = block.reward.to_string();
        let uncles_reward = block.uncles_reward.to_string();
        let size = block.size.map(|s| s as i64);

        let row = tx
            .query_one(
                "INSERT INTO blocks
                    (eth_node_id, number, hash, parent_hash, nonce, time, difficulty, gas_limit,
                     gas_used, miner, extra_data, uncle_hash, reward, uncles_reward, size, is_final)
                 VALUES ($1, $2, $3, $4, $5, $6, $7::text::numeric, $8, $9, $10, $11, $12,
                         $13::text::numeric, $14::text::numeric, $15, $16)
                 RETURNING id",
                &[
                    &self.node_id,
                    &block.number,
                    &block.hash.as_slice(),
                    &block.parent_hash.as_slice(),
                    &block.nonce.as_slice(),
                    &time,
                    &difficulty,
                    &gas_limit,
                    &gas_used,
                    &block.miner.as_slice(),
                    &block.extra_data.as_ref(),
                    &block.uncle_hash.as_slice(),
                    &reward,
                    &uncles_reward,
                    &size,
                    &block.is_final,
                ],
            )
            .await?;
        let block_id: i64 = row.try_get(0)?;

        for transaction in &block.transactions {
            insert_transaction(tx, block_id, transaction).await?;
        }

        Ok(block_id)
    }
}

async fn insert_transaction(
    tx: &PgTransaction<'_>,
    block_id: i64,
    transaction: &Transaction,
) -> Result<(), RepositoryError> {
    let nonce = transaction.nonce.to_string();
    let gas_limit = transaction.gas_limit.to_string();
    let gas_price = transaction.gas_price.to_string();
    let value = transaction.value.to_string();
    let to = transaction.to.as_ref().map(|a| a.as_slice());

    tx.execute(
        "INSERT INTO transactions
            (block_id, hash, nonce, tx_from, tx_to, gas_limit, gas_price, value, input_data)
         VALUES ($1, $2, $3::text::numeric, $4, $5, $6::text::numeric, $7::text::numeric,
                 $8::text::numeric, $9)",
        &[
            &block_id,
            &transaction.hash.as_slice(),
            &nonce,
            &transaction.from.as_slice(),
            &to,
            &gas_limit,
            &gas_price,
            &value,
            &transaction.input.as_ref(),
        ],
    )
    .await?;

    if let Some(receipt) = &transaction.receipt {
        let receipt_id = insert_receipt(tx, block_id, receipt).await?;
        for log in &receipt.logs {
            insert_log(tx, receipt_id, log).await?;
        }
    }

    Ok(())
}

async fn insert_receipt(
    tx: &PgTransaction<'_>,
    block_id: i64,
    receipt: &Receipt,
) -> Result<i64, RepositoryError> {
    let contract_address = receipt.contract_address.as_ref().map(|a| a.as_slice());
    let cumulative_gas_used = receipt.cumulative_gas_used.to_string();
    let gas_used = receipt.gas_used.to_string();

    let row = tx
        .query_one(
            "INSERT INTO receipts
                (block_id, tx_hash, contract_address, cumulative_gas_used, gas_used, status)
             VALUES ($1, $2, $3, $4::text::numeric, $5::text::numeric, $6)
             RETURNING id",
            &[
                &block_id,
                &receipt.tx_hash.as_slice(),
                &contract_address,
                &cumulative_gas_used,
                &gas_used,
                &receipt.status,
            ],
        )
        .await?;
    Ok(row.try_get(0)?)
}

async fn insert_log(tx: &PgTransaction<'_>, receipt_id: i64, log: &Log) -> Result<(), RepositoryError> {
    tx.execute(
        "INSERT INTO logs
            (receipt_id, block_number, address, tx_hash, index, topic0, topic1, topic2, topic3, data)
         VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
        &[
            &receipt_id,
            &log.block_number,
            &log.address.as_slice(),
            &log.tx_hash.as_slice(),
            &log.index,
            &topic_param(&log.topics, 0),
            &topic_param(&log.topics, 1),
            &topic_param(&log.topics, 2),
            &topic_param(&log.topics, 3),
            &log.data.as_ref(),
        ],
    )
    .await?;
    Ok(())
}

#[async_trait]
impl BlockRepository for PgBlockRepository {
    async fn create_or_update_block(&self, block: &Block) -> Result<UpsertOutcome, RepositoryError> {
        match self.upsert_block(block).await {
            // A writer that did not take the lock.
            Err(e) if e.is_unique_violation() => {
                tracing::debug!("Block {} was written concurrently, keeping stored row", block.number);
                Ok(UpsertOutcome::Unchanged)
            }
            result => result,
        }
    }

    async fn missing_block_numbers(&self, start: i64, end: i64) -> Result<Vec<i64>, RepositoryError> {
        let client = self.pool.inner().get().await?;
        let rows = client
            .query(
                "SELECT series.number
                 FROM generate_series($1::BIGINT, $2::BIGINT) AS series(number)
                 LEFT JOIN blocks
                    ON blocks.number = series.number AND blocks.eth_node_id = $3
                 WHERE blocks.id IS NULL
                 ORDER BY series.number",
                &[&start, &end, &self.node_id],
            )
            .await?;
        rows.iter()
            .map(|row| row.try_get(0).map_err(RepositoryError::from))
            .collect()
    }

    async fn set_blocks_status(
        &self,
        chain_head: i64,
        finality_lag: i64,
    ) -> Result<u64, RepositoryError> {
        let cutoff = chain_head - finality_lag;
        let client = self.pool.inner().get().await?;
        let updated = client
            .execute(
                "UPDATE blocks SET is_final = TRUE
                 WHERE is_final = FALSE AND number < $1 AND eth_node_id = $2",
                &[&cutoff, &self.node_id],
            )
            .await?;
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::test_database;
    use alloy_primitives::{Address, B256};

    fn block_with_transactions(number: i64, count: u8) -> Block {
        let transactions = (0..count)
            .map(|i| {
                let hash = B256::repeat_byte(i);
                Transaction {
                    hash,
                    from: Address::repeat_byte(0x11),
                    to: Some(Address::repeat_byte(0x22)),
                    receipt: Some(Receipt {
                        tx_hash: hash,
                        status: true,
                        logs: vec![Log {
                            block_number: number,
                            address: Address::repeat_byte(0x22),
                            tx_hash: hash,
                            index: i as i64,
                            topics: [Some(B256::repeat_byte(0xdd)), None, None, None],
                            ..Default::default()
                        }],
                        ..Default::default()
                    }),
                    ..Default::default()
                }
            })
            .collect();
        Block {
            number,
            hash: B256::repeat_byte(0xab),
            transactions,
            ..Default::default()
        }
    }

    // Needs a disposable Postgres in TEST_DATABASE_URL; skipped otherwise.
    #[tokio::test]
    async fn test_concurrent_upserts_of_new_block_both_succeed() {
        let Some((pool, node_id)) = test_database().await else {
            return;
        };
        let first = PgBlockRepository::new(pool.clone(), node_id);
        let second = PgBlockRepository::new(pool.clone(), node_id);

        for number in 0..20 {
            let block = block_with_transactions(number, 50);
            let (a, b) = tokio::join!(
                first.create_or_update_block(&block),
                second.create_or_update_block(&block)
            );

            let mut outcomes = vec![a.unwrap(), b.unwrap()];
            outcomes.sort_by_key(|o| *o != UpsertOutcome::Inserted);
            assert_eq!(outcomes, vec![UpsertOutcome::Inserted, UpsertOutcome::Unchanged]);
        }

        assert!(first.missing_block_numbers(0, 19).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_upsert_replaces_block_with_new_hash() {
        let Some((pool, node_id)) = test_database().await else {
            return;
        };
        let repository = PgBlockRepository::new(pool, node_id);
        let block = block_with_transactions(7, 2);
        let reorged = Block {
            hash: B256::repeat_byte(0xcd),
            ..block.clone()
        };

        assert_eq!(repository.create_or_update_block(&block).await.unwrap(), UpsertOutcome::Inserted);
        assert_eq!(repository.create_or_update_block(&block).await.unwrap(), UpsertOutcome::Unchanged);
        assert_eq!(
            repository.create_or_update_block(&reorged).await.unwrap(),
            UpsertOutcome::Replaced
        );
    }
}
