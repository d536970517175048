use std::sync::Arc;

use async_trait::async_trait;

use crate::db::traits::BlockFactRepository;
use crate::db::{DbPool, RepositoryError};

pub struct PgBlockFactRepository {
    pool: Arc<DbPool>,
    node_id: i32,
}

impl PgBlockFactRepository {
    pub fn new(pool: Arc<DbPool>, node_id: i32) -> Self {
        Self { pool, node_id }
    }
}

/// Table names are interpolated into SQL, so only plain identifiers pass.
fn is_plain_identifier(name: &str) -> bool {
    !name.is_empty()
        && name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
        && !name.starts_with(|c: char| c.is_ascii_digit())
}

#[async_trait]
impl BlockFactRepository for PgBlockFactRepository {
    async fn missing_fact_blocks(
        &self,
        fact_table: &str,
        start: i64,
        end: i64,
    ) -> Result<Vec<i64>, RepositoryError> {
        if !is_plain_identifier(fact_table) {
            return Err(RepositoryError::Backend(format!(
                "invalid fact table name: {}",
                fact_table
            )));
        }

        let sql = format!(
            "SELECT blocks.number
             FROM blocks
             LEFT JOIN \"{table}\" AS facts ON facts.block_number = blocks.number
             WHERE blocks.eth_node_id = $3
               AND blocks.number BETWEEN $1 AND $2
               AND facts.block_number IS NULL
             ORDER BY blocks.number",
            table = fact_table
        );

        let client = self.pool.inner().get().await?;
        let rows = client.query(&sql, &[&start, &end, &self.node_id]).await?;
        rows.iter()
            .map(|row| row.try_get(0).map_err(RepositoryError::from))
            .collect()
    }
}
