//! Transformers and the watchers that drive them.
//!
//! This module provides:
//! - The [`Transformer`] and [`StorageTransformer`] contracts
//! - [`Watcher`], which runs an ordered list of transformers once per pass
//! - [`StorageWatcher`], which tails the storage-diff feed and dispatches
//!   rows by contract address
//! - Generic transformers for watched events, per-block facts and raw
//!   storage diffs
//! - [`ChainWatchedEvents`], a watched-event source backed by `eth_getLogs`
//!
//! # Architecture
//!
//! ```text
//! log_filters ──► watched_event_logs ──► EventTransformer ──┐
//!     └──► eth_getLogs ──► ChainWatchedEvents ──┘           │
//! blocks ──► missing facts ──► EveryBlockTransformer ───────┼──► DbOperations ──► PostgreSQL
//! diff feed ──► Tailer ──► StorageWatcher ──► registry ─────┘
//!                               │
//!                               └─► queued_storage (failed rows, replayed)
//! ```
//!
//! # Example Transformer
//!
//! ```ignore
//! use chain_indexer::transformations::event_transformer::EventConverter;
//! use chain_indexer::transformations::TransformationError;
//! use chain_indexer::db::{DbOperation, DbValue};
//! use chain_indexer::types::chain::WatchedEvent;
//!
//! pub struct TransferConverter;
//!
//! impl EventConverter for TransferConverter {
//!     type Entity = (i64, [u8; 32]);
//!
//!     fn to_entity(&self, event: &WatchedEvent) -> Result<Self::Entity, TransformationError> {
//!         let to = event.topics[2].ok_or_else(|| {
//!             TransformationError::handler("transfers", "missing recipient topic")
//!         })?;
//!         Ok((event.log_id, to.0))
//!     }
//!
//!     fn to_operation(&self, _event: &WatchedEvent, (log_id, to): Self::Entity) -> DbOperation {
//!         DbOperation::insert_ignore(
//!             "transfers",
//!             &["log_id", "recipient"],
//!             vec![DbValue::Int64(log_id), DbValue::Bytes32(to)],
//!             &["log_id"],
//!         )
//!     }
//! }
//! ```

pub mod chain_events;
pub mod error;
pub mod event_transformer;
pub mod every_block;
pub mod filters;
pub mod registry;
pub mod storage_recorder;
pub mod storage_watcher;
pub mod tailer;
pub mod traits;
pub mod watcher;

// Re-exports for convenience
pub use chain_events::ChainWatchedEvents;
pub use error::TransformationError;
pub use event_transformer::WatchedEventRecorder;
pub use every_block::MinerRewardFetcher;
pub use filters::register_filters;
pub use storage_recorder::StorageDiffRecorder;
pub use storage_watcher::StorageWatcher;
pub use tailer::{FileTailer, TailError, Tailer};
pub use traits::{StorageTransformer, Transformer, TransformerDeps, TransformerInitializer};
pub use watcher::Watcher;
