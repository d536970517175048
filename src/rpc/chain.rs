//! The chain as seen by the sync engine and transformers.

use async_trait::async_trait;

use alloy::consensus::Transaction as ConsensusTransaction;
use alloy::network::TransactionResponse;
use alloy::rpc::types::{self as rpc_types, BlockNumberOrTag, Filter};
use thiserror::Error;

use super::rewards::{block_reward, uncles_reward};
use super::rpc::{RpcClient, RpcError};
use crate::types::chain::{Block, Header, Log, LogFilter, Node, Receipt, Transaction};

#[derive(Debug, Error)]
pub enum ChainError {
    #[error("RPC error at block {block}: {source}")]
    Fetch {
        block: i64,
        #[source]
        source: RpcError,
    },

    #[error("RPC error: {0}")]
    Rpc(#[from] RpcError),

    #[error("block {0} not found")]
    BlockNotFound(i64),

    #[error("failed to encode header {block}: {source}")]
    Encode {
        block: i64,
        #[source]
        source: serde_json::Error,
    },
}

#[async_trait]
pub trait BlockChain: Send + Sync {
    /// Current chain head.
    async fn last_block(&self) -> Result<i64, ChainError>;

    /// Full block with transactions, receipts and logs, rewards filled in.
    async fn get_block_by_number(&self, number: i64) -> Result<Block, ChainError>;

    async fn get_header_by_number(&self, number: i64) -> Result<Header, ChainError>;

    /// Logs matching `filter`, over its block range.
    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>, ChainError>;

    fn node(&self) -> &Node;
}

/// [`BlockChain`] over an HTTP JSON-RPC node.
pub struct RpcBlockChain {
    client: RpcClient,
    node: Node,
}

impl RpcBlockChain {
    /// Wraps `client` and resolves the node's identity.
    pub async fn connect(client: RpcClient) -> Result<Self, ChainError> {
        let node = fetch_node(&client).await?;
        tracing::info!(
            "Connected to {} (network {}, genesis {})",
            node.client_name,
            node.network_id,
            node.genesis_block
        );
        Ok(Self { client, node })
    }

    async fn fetch_block(&self, number: i64, full: bool) -> Result<rpc_types::Block, ChainError> {
        let height = u64::try_from(number).map_err(|_| ChainError::BlockNotFound(number))?;
        let tag = BlockNumberOrTag::Number(height);
        self.client
            .get_block_by_number(tag, full)
            .await
            .map_err(|source| ChainError::Fetch { block: number, source })?
            .ok_or(ChainError::BlockNotFound(number))
    }
}

async fn fetch_node(client: &RpcClient) -> Result<Node, ChainError> {
    let genesis = client
        .get_block_by_number(BlockNumberOrTag::Number(0), false)
        .await
        .map_err(|source| ChainError::Fetch { block: 0, source })?
        .ok_or(ChainError::BlockNotFound(0))?;
    let network_id = client.chain_id().await?;
    let client_name = client.client_version().await?;

    let id = match client.admin_node_id().await {
        Ok(id) => id,
        Err(e) => {
            tracing::debug!("admin_nodeInfo unavailable, using client version as node id: {}", e);
            client_name.clone()
        }
    };

    Ok(Node {
        genesis_block: format!("{:#x}", genesis.header.hash),
        network_id,
        id,
        client_name,
    })
}

#[async_trait]
impl BlockChain for RpcBlockChain {
    async fn last_block(&self) -> Result<i64, ChainError> {
        Ok(self.client.get_block_number().await? as i64)
    }

    async fn get_block_by_number(&self, number: i64) -> Result<Block, ChainError> {
        let raw = self.fetch_block(number, true).await?;

        let hashes: Vec<_> = raw.transactions.txns().map(|tx| tx.tx_hash()).collect();
        let receipts = self
            .client
            .get_transaction_receipts(&hashes)
            .await
            .map_err(|source| ChainError::Fetch { block: number, source })?;

        let mut uncle_numbers = Vec::with_capacity(raw.uncles.len());
        for index in 0..raw.uncles.len() {
            let uncle = self
                .client
                .get_uncle_number(number as u64, index)
                .await
                .map_err(|source| ChainError::Fetch { block: number, source })?;
            uncle_numbers.push(uncle as i64);
        }

        let mut block = convert_block(&raw);
        block.transactions = raw
            .transactions
            .txns()
            .zip(receipts.iter())
            .map(|(tx, receipt)| convert_transaction(tx, receipt))
            .collect();
        block.reward = block_reward(&block, uncle_numbers.len());
        block.uncles_reward = uncles_reward(block.number, &uncle_numbers);

        Ok(block)
    }

    async fn get_header_by_number(&self, number: i64) -> Result<Header, ChainError> {
        let raw = self.fetch_block(number, false).await?;
        let encoded = serde_json::to_vec(&raw.header)
            .map_err(|source| ChainError::Encode { block: number, source })?;

        Ok(Header {
            block_number: raw.header.inner.number as i64,
            hash: raw.header.hash,
            raw: encoded,
            timestamp: raw.header.inner.timestamp,
        })
    }

    async fn get_logs(&self, filter: &LogFilter) -> Result<Vec<Log>, ChainError> {
        let logs = self.client.get_logs(&to_rpc_filter(filter)).await?;
        Ok(logs.iter().map(convert_log).collect())
    }

    fn node(&self) -> &Node {
        &self.node
    }
}

fn to_rpc_filter(filter: &LogFilter) -> Filter {
    let from = if filter.from_block < 0 {
        BlockNumberOrTag::Earliest
    } else {
        BlockNumberOrTag::Number(filter.from_block as u64)
    };
    let to = if filter.to_block < 0 {
        BlockNumberOrTag::Latest
    } else {
        BlockNumberOrTag::Number(filter.to_block as u64)
    };

    let mut rpc_filter = Filter::new()
        .address(filter.address)
        .from_block(from)
        .to_block(to);
    if let Some(topic) = filter.topics[0] {
        rpc_filter = rpc_filter.event_signature(topic);
    }
    if let Some(topic) = filter.topics[1] {
        rpc_filter = rpc_filter.topic1(topic);
    }
    if let Some(topic) = filter.topics[2] {
        rpc_filter = rpc_filter.topic2(topic);
    }
    if let Some(topic) = filter.topics[3] {
        rpc_filter = rpc_filter.topic3(topic);
    }
    rpc_filter
}

/// Header fields only; transactions and rewards are filled in by the caller.
fn convert_block(raw: &rpc_types::Block) -> Block {
    let header = &raw.header.inner;
    Block {
        number: header.number as i64,
        hash: raw.header.hash,
        parent_hash: header.parent_hash,
        nonce: header.nonce,
        time: header.timestamp,
        difficulty: header.difficulty,
        gas_limit: header.gas_limit,
        gas_used: header.gas_used,
        miner: header.beneficiary,
        extra_data: header.extra_data.clone(),
        uncle_hash: header.ommers_hash,
        size: raw.header.size.and_then(|s| s.try_into().ok()),
        ..Default::default()
    }
}

fn convert_transaction(
    tx: &rpc_types::Transaction,
    receipt: &rpc_types::TransactionReceipt,
) -> Transaction {
    let gas_price = tx
        .effective_gas_price
        .unwrap_or_else(|| ConsensusTransaction::max_fee_per_gas(tx));

    Transaction {
        hash: TransactionResponse::tx_hash(tx),
        nonce: ConsensusTransaction::nonce(tx),
        from: TransactionResponse::from(tx),
        to: ConsensusTransaction::to(tx),
        gas_limit: ConsensusTransaction::gas_limit(tx),
        gas_price,
        value: ConsensusTransaction::value(tx),
        input: ConsensusTransaction::input(tx).clone(),
        receipt: Some(convert_receipt(receipt)),
    }
}

fn convert_receipt(receipt: &rpc_types::TransactionReceipt) -> Receipt {
    Receipt {
        tx_hash: receipt.transaction_hash,
        contract_address: receipt.contract_address,
        cumulative_gas_used: receipt.inner.cumulative_gas_used(),
        gas_used: receipt.gas_used,
        status: receipt.status(),
        logs: receipt.inner.logs().iter().map(convert_log).collect(),
    }
}

fn convert_log(log: &rpc_types::Log) -> Log {
    Log {
        block_number: log.block_number.unwrap_or_default() as i64,
        address: log.address(),
        tx_hash: log.transaction_hash.unwrap_or_default(),
        index: log.log_index.unwrap_or_default() as i64,
        topics: Log::topics_from_slice(log.topics()),
        data: log.data().data.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::chain::filter::UNBOUNDED;
    use alloy_primitives::{address, Address, Bytes, LogData, B256};

    #[test]
    fn test_convert_log() {
        let topic = B256::repeat_byte(0xaa);
        let rpc_log = rpc_types::Log {
            inner: alloy_primitives::Log {
                address: address!("0x000000000000000000000000000000000000beef"),
                data: LogData::new_unchecked(vec![topic], Bytes::from_static(&[1, 2])),
            },
            block_number: Some(42),
            transaction_hash: Some(B256::repeat_byte(0x11)),
            log_index: Some(3),
            ..Default::default()
        };

        let log = convert_log(&rpc_log);
        assert_eq!(log.block_number, 42);
        assert_eq!(log.index, 3);
        assert_eq!(log.topics, [Some(topic), None, None, None]);
        assert_eq!(log.data, Bytes::from_static(&[1, 2]));
    }

    #[test]
    fn test_unbounded_filter_spans_whole_chain() {
        let filter = LogFilter {
            name: "transfers".to_string(),
            from_block: UNBOUNDED,
            to_block: UNBOUNDED,
            address: Address::ZERO,
            topics: [None; 4],
        };
        let rpc_filter = to_rpc_filter(&filter);
        assert_eq!(rpc_filter.get_from_block(), None);
        assert_eq!(rpc_filter.get_to_block(), None);
    }

    #[test]
    fn test_bounded_filter_keeps_range() {
        let filter = LogFilter {
            name: "transfers".to_string(),
            from_block: 10,
            to_block: 20,
            address: Address::ZERO,
            topics: [None; 4],
        };
        let rpc_filter = to_rpc_filter(&filter);
        assert_eq!(rpc_filter.get_from_block(), Some(10));
        assert_eq!(rpc_filter.get_to_block(), Some(20));
    }
}
