use thiserror::Error;

use crate::db::RepositoryError;
use crate::rpc::ChainError;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("chain error: {0}")]
    Chain(#[from] ChainError),

    #[error("repository error at block {block}: {source}")]
    Repository {
        block: i64,
        #[source]
        source: RepositoryError,
    },

    #[error("repository error: {0}")]
    Query(#[from] RepositoryError),
}

impl HistoryError {
    pub(crate) fn at(block: i64) -> impl FnOnce(RepositoryError) -> Self {
        move |source| HistoryError::Repository { block, source }
    }
}
