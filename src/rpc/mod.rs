mod chain;
mod rewards;
mod rpc;

pub use chain::{BlockChain, ChainError, RpcBlockChain};
pub use rpc::{RateLimitConfig, RetryConfig, RpcClient, RpcClientConfig, RpcError};
