use alloy_primitives::{Address, Bytes, B256, B64, U256};
use serde::{Deserialize, Serialize};

/// Up to four indexed topic slots of a log. `None` marks an absent topic.
pub type Topics = [Option<B256>; 4];

/// A block with its transactions, receipts and logs.
///
/// A stored block is identified by `(number, node)`: two nodes tracked by the
/// same database may legitimately disagree at the same height.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub number: i64,
    pub hash: B256,
    pub parent_hash: B256,
    pub nonce: B64,
    pub time: u64,
    pub difficulty: U256,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub miner: Address,
    pub extra_data: Bytes,
    pub uncle_hash: B256,
    /// Miner reward in wei (static reward, fees and uncle inclusion).
    pub reward: U256,
    /// Sum of rewards paid to uncle miners, in wei.
    pub uncles_reward: U256,
    pub size: Option<u64>,
    /// Only ever flips from `false` to `true`.
    pub is_final: bool,
    pub transactions: Vec<Transaction>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    pub hash: B256,
    pub nonce: u64,
    pub from: Address,
    /// `None` for contract creations.
    pub to: Option<Address>,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub value: U256,
    pub input: Bytes,
    pub receipt: Option<Receipt>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Receipt {
    pub tx_hash: B256,
    pub contract_address: Option<Address>,
    pub cumulative_gas_used: u64,
    pub gas_used: u64,
    pub status: bool,
    pub logs: Vec<Log>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Log {
    pub block_number: i64,
    pub address: Address,
    pub tx_hash: B256,
    pub index: i64,
    pub topics: Topics,
    pub data: Bytes,
}

impl Log {
    /// Builds the fixed topic array from a node's variable-length topic list.
    /// Topics beyond the fourth are dropped.
    pub fn topics_from_slice(topics: &[B256]) -> Topics {
        let mut out: Topics = [None; 4];
        for (slot, topic) in out.iter_mut().zip(topics.iter()) {
            *slot = Some(*topic);
        }
        out
    }
}
