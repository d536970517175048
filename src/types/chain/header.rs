use alloy_primitives::B256;
use serde::{Deserialize, Serialize};

/// Lightweight alternative to [`super::Block`] for pipelines that never need
/// transaction bodies.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Header {
    pub block_number: i64,
    pub hash: B256,
    /// The header as returned by the node, serialized as JSON.
    pub raw: Vec<u8>,
    pub timestamp: u64,
}
