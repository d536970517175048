use crate::db::{DbPool, RepositoryError};
use crate::types::chain::Node;

/// Upserts the node identity and returns its row id, which scopes every block
/// and header written through this process.
pub async fn register_node(pool: &DbPool, node: &Node) -> Result<i32, RepositoryError> {
    let client = pool.inner().get().await?;
    let network_id = node.network_id.to_string();
    let row = client
        .query_one(
            "INSERT INTO eth_nodes (genesis_block, network_id, eth_node_id, client_name)
             VALUES ($1, $2::text::numeric, $3, $4)
             ON CONFLICT (genesis_block, network_id, eth_node_id)
             DO UPDATE SET client_name = EXCLUDED.client_name
             RETURNING id",
            &[&node.genesis_block, &network_id, &node.id, &node.client_name],
        )
        .await?;
    Ok(row.try_get(0)?)
}
