use std::fmt::Display;
use std::future::Future;
use std::num::NonZeroU32;
use std::time::Duration;

use alloy::network::Ethereum;
use alloy::primitives::{BlockNumber, B256};
use alloy::providers::{Provider, RootProvider};
use alloy::rpc::types::{Block, BlockId, BlockNumberOrTag, Filter, Log, TransactionReceipt};
use governor::clock::{QuantaClock, QuantaInstant};
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Jitter, Quota, RateLimiter};
use thiserror::Error;
use url::Url;

/// Substrings of node/transport error messages that indicate a transient
/// failure: dropped connections, throttling and 5xx responses.
const TRANSIENT_MARKERS: &[&str] = &[
    "connection",
    "timeout",
    "timed out",
    "reset",
    "broken pipe",
    "eof",
    "sending request",
    "rate limit",
    "too many requests",
    "429",
    "502",
    "503",
    "504",
    "service unavailable",
    "bad gateway",
    "temporarily",
    "try again",
];

#[derive(Debug, Error)]
pub enum RpcError {
    #[error("{method} failed: {message}")]
    Provider { method: String, message: String },

    #[error("{method} returned no result")]
    Missing { method: String },

    #[error("{method} returned a malformed result: {message}")]
    Malformed { method: String, message: String },
}

impl RpcError {
    pub(crate) fn provider(method: &str, error: impl Display) -> Self {
        RpcError::Provider {
            method: method.to_string(),
            message: error.to_string(),
        }
    }

    /// Whether the call is worth repeating after a backoff.
    pub fn is_retryable(&self) -> bool {
        match self {
            RpcError::Provider { message, .. } => {
                let message = message.to_lowercase();
                TRANSIENT_MARKERS.iter().any(|m| message.contains(m))
            }
            RpcError::Missing { .. } | RpcError::Malformed { .. } => false,
        }
    }
}

/// Exponential backoff: the first retry waits `initial_delay`, each later one
/// doubles it, capped at `max_delay`.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// 0 disables retries.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub max_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
        }
    }
}

impl RetryConfig {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Default::default()
        }
    }

    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        if attempt == 0 {
            return Duration::ZERO;
        }
        let factor = 1u32 << (attempt - 1).min(16);
        self.initial_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Runs `operation` until it succeeds, fails permanently, or `max_retries`
/// retries are used up.
pub async fn with_retry<F, Fut, T>(
    config: &RetryConfig,
    method: &str,
    mut operation: F,
) -> Result<T, RpcError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, RpcError>>,
{
    let mut attempt = 0;
    loop {
        match operation().await {
            Ok(value) => {
                if attempt > 0 {
                    tracing::info!("RPC '{}' succeeded after {} retries", method, attempt);
                }
                return Ok(value);
            }
            Err(e) if e.is_retryable() && attempt < config.max_retries => {
                attempt += 1;
                let delay = config.delay_for_attempt(attempt);
                tracing::warn!(
                    "RPC '{}' failed ({}), retry {}/{} in {:?}",
                    method,
                    e,
                    attempt,
                    config.max_retries,
                    delay
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => {
                if attempt > 0 {
                    tracing::error!("RPC '{}' failed after {} attempts: {}", method, attempt + 1, e);
                }
                return Err(e);
            }
        }
    }
}

type DirectRateLimiter =
    RateLimiter<NotKeyed, InMemoryState, QuantaClock, NoOpMiddleware<QuantaInstant>>;

#[derive(Debug, Clone)]
pub struct RateLimitConfig {
    pub requests_per_second: NonZeroU32,
    pub jitter_min_ms: u64,
    pub jitter_max_ms: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            requests_per_second: NonZeroU32::MIN.saturating_add(9),
            jitter_min_ms: 5,
            jitter_max_ms: 50,
        }
    }
}

#[derive(Debug, Clone)]
pub struct RpcClientConfig {
    pub url: Url,
    /// Receipts fetched concurrently per round trip.
    pub receipt_batch_size: usize,
    pub rate_limit: Option<RateLimitConfig>,
    pub retry: RetryConfig,
}

impl RpcClientConfig {
    pub fn new(url: Url) -> Self {
        Self {
            url,
            receipt_batch_size: 100,
            rate_limit: None,
            retry: RetryConfig::default(),
        }
    }

    pub fn with_rate_limit(mut self, config: RateLimitConfig) -> Self {
        self.rate_limit = Some(config);
        self
    }

    pub fn with_retry(mut self, config: RetryConfig) -> Self {
        self.retry = config;
        self
    }
}

struct Throttle {
    limiter: DirectRateLimiter,
    jitter: Jitter,
}

/// Rate-limited, retrying JSON-RPC client for the handful of calls the
/// indexer makes.
pub struct RpcClient {
    provider: RootProvider<Ethereum>,
    config: RpcClientConfig,
    throttle: Option<Throttle>,
}

impl RpcClient {
    pub fn new(config: RpcClientConfig) -> Result<Self, RpcError> {
        let provider = RootProvider::<Ethereum>::new_http(config.url.clone());

        let throttle = config.rate_limit.as_ref().map(|rate| Throttle {
            limiter: RateLimiter::direct(Quota::per_second(rate.requests_per_second)),
            jitter: Jitter::new(
                Duration::from_millis(rate.jitter_min_ms),
                Duration::from_millis(rate.jitter_max_ms),
            ),
        });

        Ok(Self {
            provider,
            config,
            throttle,
        })
    }

    async fn throttle(&self) {
        if let Some(throttle) = &self.throttle {
            throttle.limiter.until_ready_with_jitter(throttle.jitter).await;
        }
    }

    /// Throttled, retried provider call.
    async fn call<T, E, F, Fut>(&self, method: &str, operation: F) -> Result<T, RpcError>
    where
        E: Display,
        F: Fn() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        with_retry(&self.config.retry, method, || async {
            self.throttle().await;
            operation().await.map_err(|e| RpcError::provider(method, e))
        })
        .await
    }

    pub async fn get_block_number(&self) -> Result<BlockNumber, RpcError> {
        self.call("eth_blockNumber", || async {
            self.provider.get_block_number().await
        })
        .await
    }

    pub async fn get_block_by_number(
        &self,
        number: BlockNumberOrTag,
        full_transactions: bool,
    ) -> Result<Option<Block>, RpcError> {
        let method = format!("eth_getBlockByNumber({})", number);
        self.call(&method, || async {
            let request = self.provider.get_block(BlockId::Number(number));
            if full_transactions {
                request.full().await
            } else {
                request.await
            }
        })
        .await
    }

    /// Receipts for `hashes`, in order, fetched concurrently in chunks of
    /// `receipt_batch_size`. A missing receipt fails the whole call.
    pub async fn get_transaction_receipts(
        &self,
        hashes: &[B256],
    ) -> Result<Vec<TransactionReceipt>, RpcError> {
        let mut receipts = Vec::with_capacity(hashes.len());

        for chunk in hashes.chunks(self.config.receipt_batch_size.max(1)) {
            let fetched = with_retry(&self.config.retry, "eth_getTransactionReceipt", || async {
                self.throttle().await;
                let results = futures::future::try_join_all(chunk.iter().map(|&hash| async move {
                    self.provider.get_transaction_receipt(hash).await
                }))
                .await
                .map_err(|e| RpcError::provider("eth_getTransactionReceipt", e))?;

                results
                    .into_iter()
                    .zip(chunk)
                    .map(|(receipt, hash)| {
                        receipt.ok_or_else(|| RpcError::Missing {
                            method: format!("eth_getTransactionReceipt({:#x})", hash),
                        })
                    })
                    .collect::<Result<Vec<_>, _>>()
            })
            .await?;

            receipts.extend(fetched);
        }

        Ok(receipts)
    }

    /// Block number of the uncle at `index` in block `number`.
    pub async fn get_uncle_number(&self, number: u64, index: usize) -> Result<u64, RpcError> {
        let method = format!("eth_getUncleByBlockNumberAndIndex({}, {})", number, index);
        let params = (format!("{:#x}", number), format!("{:#x}", index));

        let uncle: Option<serde_json::Value> = self
            .call(&method, || async {
                self.provider
                    .client()
                    .request("eth_getUncleByBlockNumberAndIndex", params.clone())
                    .await
            })
            .await?;

        let hex = uncle
            .as_ref()
            .and_then(|u| u.get("number"))
            .and_then(|n| n.as_str())
            .ok_or_else(|| RpcError::Missing {
                method: method.clone(),
            })?;
        u64::from_str_radix(hex.trim_start_matches("0x"), 16).map_err(|e| RpcError::Malformed {
            method,
            message: format!("uncle number {}: {}", hex, e),
        })
    }

    pub async fn get_logs(&self, filter: &Filter) -> Result<Vec<Log>, RpcError> {
        let method = format!(
            "eth_getLogs({:?}..{:?})",
            filter.get_from_block(),
            filter.get_to_block()
        );
        self.call(&method, || async { self.provider.get_logs(filter).await })
            .await
    }

    pub async fn chain_id(&self) -> Result<u64, RpcError> {
        self.call("eth_chainId", || async {
            self.provider.get_chain_id().await
        })
        .await
    }

    pub async fn client_version(&self) -> Result<String, RpcError> {
        self.call("web3_clientVersion", || async {
            self.provider.get_client_version().await
        })
        .await
    }

    /// The node's enode id from `admin_nodeInfo`. Public endpoints usually do
    /// not expose the admin namespace, so this is tried once.
    pub async fn admin_node_id(&self) -> Result<String, RpcError> {
        const METHOD: &str = "admin_nodeInfo";

        self.throttle().await;
        let info: serde_json::Value = self
            .provider
            .client()
            .request_noparams(METHOD)
            .await
            .map_err(|e| RpcError::provider(METHOD, e))?;
        info.get("id")
            .and_then(|id| id.as_str())
            .map(str::to_string)
            .ok_or_else(|| RpcError::Missing {
                method: METHOD.to_string(),
            })
    }
}
