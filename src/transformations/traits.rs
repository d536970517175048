//! Core traits for transformers.
//!
//! A [`Transformer`] turns watched events or per-block facts into domain
//! records on every `execute` call; a [`StorageTransformer`] handles the raw
//! storage diffs of one contract. Both are built from initializers that close
//! over the shared [`TransformerDeps`], so the watchers never see concrete
//! entity types.

use std::sync::Arc;

use alloy_primitives::Address;
use async_trait::async_trait;

use crate::db::{BlockFactRepository, OperationSink, WatchedEventRepository};
use crate::rpc::BlockChain;
use crate::types::chain::StorageDiffRow;

use super::error::TransformationError;

#[async_trait]
pub trait Transformer: Send + Sync {
    /// Name used in logs.
    fn name(&self) -> &str;

    /// One full pass over everything currently available. Writes are keyed by
    /// log id or block number and ignore conflicts, so passes may repeat.
    async fn execute(&self) -> Result<(), TransformationError>;
}

#[async_trait]
pub trait StorageTransformer: Send + Sync {
    fn contract_address(&self) -> Address;

    async fn execute(&self, row: &StorageDiffRow) -> Result<(), TransformationError>;
}

/// Shared handles every transformer may bind to.
#[derive(Clone)]
pub struct TransformerDeps {
    pub chain: Arc<dyn BlockChain>,
    pub watched_events: Arc<dyn WatchedEventRepository>,
    pub sink: Arc<dyn OperationSink>,
    pub block_facts: Arc<dyn BlockFactRepository>,
}

pub type TransformerInitializer =
    Box<dyn Fn(&TransformerDeps) -> Arc<dyn Transformer> + Send + Sync>;

pub type StorageTransformerInitializer =
    Box<dyn Fn(&TransformerDeps) -> Arc<dyn StorageTransformer> + Send + Sync>;
