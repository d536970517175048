//! PostgreSQL implementations of the repository traits.
//!
//! Blocks and headers are scoped by the `eth_nodes` row of the node being
//! indexed; filters, watched events and the storage queue are global.

pub mod block_facts;
pub mod blocks;
pub mod filters;
pub mod headers;
pub mod nodes;
pub mod storage_queue;
pub mod watched_events;

pub use block_facts::PgBlockFactRepository;
pub use blocks::PgBlockRepository;
pub use filters::PgFilterRepository;
pub use headers::PgHeaderRepository;
pub use nodes::register_node;
pub use storage_queue::PgStorageQueue;
pub use watched_events::PgWatchedEventRepository;

use alloy_primitives::{Address, B256};
use deadpool_postgres::Transaction as PgTransaction;
use tokio_postgres::Row;

use super::error::RepositoryError;
use crate::types::chain::Topics;

fn decode_error(column: &str, message: impl ToString) -> RepositoryError {
    RepositoryError::Decode {
        column: column.to_string(),
        message: message.to_string(),
    }
}

pub(crate) fn get_b256(row: &Row, column: &str) -> Result<B256, RepositoryError> {
    let bytes: Vec<u8> = row.try_get(column)?;
    B256::try_from(bytes.as_slice()).map_err(|e| decode_error(column, e))
}

pub(crate) fn get_address(row: &Row, column: &str) -> Result<Address, RepositoryError> {
    let bytes: Vec<u8> = row.try_get(column)?;
    Address::try_from(bytes.as_slice()).map_err(|e| decode_error(column, e))
}

pub(crate) fn get_topics(row: &Row) -> Result<Topics, RepositoryError> {
    let mut topics: Topics = [None; 4];
    for (i, slot) in topics.iter_mut().enumerate() {
        let column = format!("topic{}", i);
        let bytes: Option<Vec<u8>> = row.try_get(column.as_str())?;
        *slot = bytes
            .map(|b| B256::try_from(b.as_slice()).map_err(|e| decode_error(&column, e)))
            .transpose()?;
    }
    Ok(topics)
}

pub(crate) fn topic_param(topics: &Topics, i: usize) -> Option<&[u8]> {
    topics[i].as_ref().map(|t| t.as_slice())
}

/// Key of the advisory lock guarding one `(node, number)` row of `table`.
fn number_lock_key(table: &str, node_id: i32, number: i64) -> String {
    format!("{}:{}:{}", table, node_id, number)
}

/// Serializes writers of one block number until `tx` ends. Taken before the
/// existence check, so a second writer waits and then sees the first one's
/// row.
pub(crate) async fn lock_number(
    tx: &PgTransaction<'_>,
    table: &str,
    node_id: i32,
    number: i64,
) -> Result<(), RepositoryError> {
    tx.execute(
        "SELECT pg_advisory_xact_lock(hashtextextended($1, 0))",
        &[&number_lock_key(table, node_id, number)],
    )
    .await?;
    Ok(())
}

/// Connects to the database named by `TEST_DATABASE_URL` and registers a
/// fresh node, so each test writes into its own block range scope. `None`
/// when the variable is unset.
#[cfg(test)]
pub(crate) async fn test_database() -> Option<(std::sync::Arc<super::DbPool>, i32)> {
    use std::time::{SystemTime, UNIX_EPOCH};

    use crate::types::chain::Node;

    static MIGRATED: tokio::sync::OnceCell<()> = tokio::sync::OnceCell::const_new();

    let url = std::env::var("TEST_DATABASE_URL").ok()?;
    let pool = super::DbPool::new(&url, 4).await.unwrap();
    MIGRATED
        .get_or_init(|| async { pool.run_migrations().await.unwrap() })
        .await;

    let nanos = SystemTime::now().duration_since(UNIX_EPOCH).unwrap().as_nanos();
    let node = Node {
        id: format!("test-node-{}", nanos),
        genesis_block: "0xd4e5".to_string(),
        network_id: 1,
        client_name: "test".to_string(),
    };
    let node_id = register_node(&pool, &node).await.unwrap();
    Some((std::sync::Arc::new(pool), node_id))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_number_lock_key_is_scoped_by_table_and_node() {
        assert_eq!(number_lock_key("blocks", 1, 42), "blocks:1:42");
        assert_ne!(number_lock_key("blocks", 1, 42), number_lock_key("headers", 1, 42));
        assert_ne!(number_lock_key("blocks", 1, 42), number_lock_key("blocks", 2, 42));
    }
}
