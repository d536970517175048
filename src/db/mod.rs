pub mod error;
pub mod migrations;
pub mod pool;
pub mod repositories;
pub mod traits;
pub mod types;

pub use error::{DbError, RepositoryError};
pub use pool::DbPool;
pub use traits::{
    BlockFactRepository, BlockRepository, FilterRepository, HeaderRepository, OperationSink,
    QueuedStorageDiff, StorageQueue, UpsertOutcome, WatchedEventRepository,
};
pub use types::{DbOperation, DbValue};
