use std::sync::Arc;

use alloy_primitives::Address;
use async_trait::async_trait;

use crate::db::{DbOperation, DbValue, OperationSink};
use crate::types::chain::StorageDiffRow;

use super::error::TransformationError;
use super::traits::{StorageTransformer, StorageTransformerInitializer, TransformerDeps};

pub const STORAGE_DIFF_RECORDS_TABLE: &str = "storage_diff_records";

/// Stores the raw diffs of one contract, once per block hash and slot.
pub struct StorageDiffRecorder {
    contract: Address,
    sink: Arc<dyn OperationSink>,
}

impl StorageDiffRecorder {
    pub fn new(contract: Address, deps: &TransformerDeps) -> Self {
        Self {
            contract,
            sink: deps.sink.clone(),
        }
    }

    pub fn initializer(contract: Address) -> StorageTransformerInitializer {
        Box::new(move |deps: &TransformerDeps| {
            let transformer: Arc<dyn StorageTransformer> =
                Arc::new(StorageDiffRecorder::new(contract, deps));
            transformer
        })
    }
}

#[async_trait]
impl StorageTransformer for StorageDiffRecorder {
    fn contract_address(&self) -> Address {
        self.contract
    }

    async fn execute(&self, row: &StorageDiffRow) -> Result<(), TransformationError> {
        let operation = DbOperation::insert_ignore(
            STORAGE_DIFF_RECORDS_TABLE,
            &[
                "contract",
                "block_hash",
                "block_height",
                "storage_key",
                "storage_value",
            ],
            vec![
                DbValue::Address(row.contract.into_array()),
                DbValue::Bytes32(row.block_hash.0),
                DbValue::Int64(row.block_height),
                DbValue::Bytes32(row.storage_key.0),
                DbValue::Bytes32(row.storage_value.0),
            ],
            &["contract", "block_hash", "storage_key"],
        );
        self.sink.execute(vec![operation]).await?;
        Ok(())
    }
}
