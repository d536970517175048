use serde::Deserialize;

/// Connection settings for the Ethereum node.
#[derive(Debug, Clone, Deserialize)]
pub struct ChainConfig {
    pub name: String,
    /// Env var holding the node's HTTP RPC URL.
    pub rpc_url_env_var: String,
    /// Optional requests-per-second cap applied to every RPC call.
    #[serde(default)]
    pub requests_per_second: Option<u32>,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_max_retries() -> u32 {
    10
}
