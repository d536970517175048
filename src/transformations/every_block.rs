//! Transformers that persist one fact per stored block.

use std::sync::Arc;

use alloy_primitives::{Address, U256};
use async_trait::async_trait;

use crate::db::{BlockFactRepository, DbOperation, DbValue, OperationSink};
use crate::rpc::BlockChain;

use super::error::TransformationError;
use super::traits::{Transformer, TransformerDeps, TransformerInitializer};

/// Produces the fact stored for a single block.
#[async_trait]
pub trait BlockFactFetcher: Send + Sync + 'static {
    type Fact: Send;

    /// Table holding one row per block, keyed by `block_number`.
    fn fact_table(&self) -> &str;

    async fn fetch(
        &self,
        chain: &dyn BlockChain,
        block_number: i64,
    ) -> Result<Self::Fact, TransformationError>;

    /// The insert for `fact`. Must ignore conflicts on `block_number`.
    fn to_operation(&self, block_number: i64, fact: Self::Fact) -> DbOperation;
}

/// Fills the fact table for every stored block from `starting_block` up to
/// the current head that does not have a row yet.
pub struct EveryBlockTransformer<F: BlockFactFetcher> {
    name: String,
    starting_block: i64,
    fetcher: F,
    chain: Arc<dyn BlockChain>,
    block_facts: Arc<dyn BlockFactRepository>,
    sink: Arc<dyn OperationSink>,
}

impl<F: BlockFactFetcher> EveryBlockTransformer<F> {
    pub fn new(name: &str, starting_block: i64, fetcher: F, deps: &TransformerDeps) -> Self {
        Self {
            name: name.to_string(),
            starting_block,
            fetcher,
            chain: deps.chain.clone(),
            block_facts: deps.block_facts.clone(),
            sink: deps.sink.clone(),
        }
    }
}

#[async_trait]
impl<F: BlockFactFetcher> Transformer for EveryBlockTransformer<F> {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self) -> Result<(), TransformationError> {
        let head = self.chain.last_block().await?;
        let missing = self
            .block_facts
            .missing_fact_blocks(self.fetcher.fact_table(), self.starting_block, head)
            .await?;

        for &number in &missing {
            let fact = self.fetcher.fetch(self.chain.as_ref(), number).await?;
            self.sink
                .execute(vec![self.fetcher.to_operation(number, fact)])
                .await?;
        }

        if !missing.is_empty() {
            tracing::info!("{}: recorded {} blocks", self.name, missing.len());
        }
        Ok(())
    }
}

pub const MINER_REWARDS_TABLE: &str = "block_miner_rewards";

/// Miner and total reward of each block.
pub struct MinerRewardFetcher;

impl MinerRewardFetcher {
    pub fn initializer(starting_block: i64) -> TransformerInitializer {
        Box::new(move |deps: &TransformerDeps| {
            let transformer: Arc<dyn Transformer> = Arc::new(EveryBlockTransformer::new(
                "miner_rewards",
                starting_block,
                MinerRewardFetcher,
                deps,
            ));
            transformer
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MinerReward {
    pub miner: Address,
    pub reward: U256,
    pub uncles_reward: U256,
}

#[async_trait]
impl BlockFactFetcher for MinerRewardFetcher {
    type Fact = MinerReward;

    fn fact_table(&self) -> &str {
        MINER_REWARDS_TABLE
    }

    async fn fetch(
        &self,
        chain: &dyn BlockChain,
        block_number: i64,
    ) -> Result<MinerReward, TransformationError> {
        let block = chain.get_block_by_number(block_number).await?;
        Ok(MinerReward {
            miner: block.miner,
            reward: block.reward,
            uncles_reward: block.uncles_reward,
        })
    }

    fn to_operation(&self, block_number: i64, fact: MinerReward) -> DbOperation {
        DbOperation::insert_ignore(
            MINER_REWARDS_TABLE,
            &["block_number", "miner", "reward", "uncles_reward"],
            vec![
                DbValue::Int64(block_number),
                DbValue::Address(fact.miner.into_array()),
                DbValue::Numeric(fact.reward.to_string()),
                DbValue::Numeric(fact.uncles_reward.to_string()),
            ],
            &["block_number"],
        )
    }
}
