//! Chain facts as they are stored by the indexer.
//!
//! Independent of the RPC representation; `rpc::chain` converts into these.

pub mod block;
pub mod filter;
pub mod header;
pub mod hex;
pub mod node;
pub mod storage_diff;
pub mod watched_event;

pub use block::{Block, Log, Receipt, Topics, Transaction};
pub use filter::LogFilter;
pub use header::Header;
pub use node::Node;
pub use storage_diff::{StorageDiffError, StorageDiffRow};
pub use watched_event::{match_logs, WatchedEvent};
