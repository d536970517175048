use serde::{Deserialize, Serialize};

/// Identity of the Ethereum node the indexer is reading from.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Node {
    pub genesis_block: String,
    pub network_id: u64,
    /// Stable fingerprint used to scope stored blocks and headers.
    pub id: String,
    pub client_name: String,
}
