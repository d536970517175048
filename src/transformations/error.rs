//! Transformation error types.

use alloy_primitives::Address;
use thiserror::Error;

use crate::db::{DbError, RepositoryError};
use crate::rpc::ChainError;
use crate::types::chain::StorageDiffError;

use super::tailer::TailError;

#[derive(Debug, Error)]
pub enum TransformationError {
    #[error("Transformer '{handler_name}' failed: {message}")]
    HandlerError {
        handler_name: String,
        message: String,
    },

    #[error("Database error: {0}")]
    DatabaseError(#[from] DbError),

    #[error("Repository error: {0}")]
    RepositoryError(#[from] RepositoryError),

    #[error("Chain error: {0}")]
    ChainError(#[from] ChainError),

    #[error("Storage diff error: {0}")]
    StorageDiffError(#[from] StorageDiffError),

    #[error("Tail error: {0}")]
    TailError(#[from] TailError),

    #[error("No transformers registered")]
    NoTransformers,

    #[error("contract not found: {contract:#x}")]
    ContractNotFound { contract: Address },
}

impl TransformationError {
    /// Create a handler error with context.
    pub fn handler(name: &str, message: impl Into<String>) -> Self {
        Self::HandlerError {
            handler_name: name.to_string(),
            message: message.into(),
        }
    }
}
