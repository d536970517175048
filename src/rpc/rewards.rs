//! Miner and uncle rewards, in wei.

use alloy_primitives::U256;

use crate::types::chain::Block;

const BYZANTIUM_BLOCK: i64 = 4_370_000;
const CONSTANTINOPLE_BLOCK: i64 = 7_280_000;

const ETHER: u128 = 1_000_000_000_000_000_000;

/// Base reward paid for mining a block at `number`.
pub fn static_block_reward(number: i64) -> U256 {
    let ether = if number >= CONSTANTINOPLE_BLOCK {
        2
    } else if number >= BYZANTIUM_BLOCK {
        3
    } else {
        5
    };
    U256::from(ether * ETHER)
}

/// Total fees paid by the block's transactions. Transactions without a
/// receipt contribute nothing.
pub fn transaction_fees(block: &Block) -> U256 {
    block
        .transactions
        .iter()
        .filter_map(|tx| {
            tx.receipt
                .as_ref()
                .map(|r| U256::from(r.gas_used) * U256::from(tx.gas_price))
        })
        .fold(U256::ZERO, |acc, fee| acc + fee)
}

/// Miner reward: static reward, plus fees, plus 1/32 of the static reward for
/// each included uncle.
pub fn block_reward(block: &Block, uncle_count: usize) -> U256 {
    let base = static_block_reward(block.number);
    let inclusion = base / U256::from(32) * U256::from(uncle_count);
    base + transaction_fees(block) + inclusion
}

/// Sum of rewards paid to the miners of the given uncles.
pub fn uncles_reward(block_number: i64, uncle_numbers: &[i64]) -> U256 {
    let base = static_block_reward(block_number);
    uncle_numbers
        .iter()
        .map(|&uncle| {
            let depth = (uncle + 8 - block_number).max(0) as u64;
            U256::from(depth) * base / U256::from(8)
        })
        .fold(U256::ZERO, |acc, r| acc + r)
}
