mod db;
#[cfg(test)]
mod fakes;
mod history;
mod rpc;
mod transformations;
mod types;

use std::env;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Context;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;
use url::Url;

use db::repositories::{
    register_node, PgBlockFactRepository, PgBlockRepository, PgFilterRepository,
    PgHeaderRepository, PgStorageQueue, PgWatchedEventRepository,
};
use db::DbPool;
use history::{run_sync, BlockPipeline, HeaderPipeline, SyncPipeline};
use rpc::{BlockChain, RateLimitConfig, RetryConfig, RpcBlockChain, RpcClient, RpcClientConfig};
use transformations::{
    register_filters, ChainWatchedEvents, FileTailer, MinerRewardFetcher, StorageDiffRecorder,
    StorageWatcher, TransformerDeps, TransformerInitializer, WatchedEventRecorder, Watcher,
};
use types::config::indexer::IndexerConfig;
use types::config::sync::SyncConfig;
use types::config::transformations::EventSource;

const DEFAULT_CONFIG_PATH: &str = "config/config.json";
const DB_POOL_SIZE: usize = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// Full blocks with transactions, receipts and logs.
    Sync,
    HeaderSync,
    /// Periodic transformer passes.
    Watch,
    StorageWatch,
}

impl FromStr for Mode {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "sync" => Ok(Mode::Sync),
            "header-sync" => Ok(Mode::HeaderSync),
            "watch" => Ok(Mode::Watch),
            "storage-watch" => Ok(Mode::StorageWatch),
            other => anyhow::bail!(
                "unknown mode '{}' (expected sync, header-sync, watch or storage-watch)",
                other
            ),
        }
    }
}

#[derive(Debug)]
struct Args {
    mode: Mode,
    config_path: PathBuf,
}

fn parse_args(args: &[String]) -> anyhow::Result<Args> {
    let mut mode = Mode::Sync;
    let mut config_path = PathBuf::from(DEFAULT_CONFIG_PATH);

    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        if arg == "--config" {
            let path = iter.next().context("--config requires a path")?;
            config_path = PathBuf::from(path);
        } else {
            mode = arg.parse()?;
        }
    }

    Ok(Args { mode, config_path })
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = env::args().collect();
    let args = parse_args(&args)?;

    let config = IndexerConfig::load(&args.config_path)?;
    load_required_env_vars(&config)?;

    tracing::info!(
        "Starting {:?} for chain {} with {} log filter(s)",
        args.mode,
        config.chain.name,
        config.filters.len()
    );

    let cancel = CancellationToken::new();
    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("Received Ctrl-C, shutting down");
            }
            cancel.cancel();
        }
    });

    let pool = connect_db(&config).await?;
    let chain: Arc<dyn BlockChain> = Arc::new(connect_chain(&config).await?);

    match args.mode {
        Mode::Sync | Mode::HeaderSync => {
            run_sync_mode(args.mode, &config, pool, chain, cancel).await?
        }
        Mode::Watch => run_watch_mode(&config, pool, chain, cancel).await?,
        Mode::StorageWatch => run_storage_watch_mode(&config, pool, chain, cancel).await?,
    }

    tracing::info!("Shutdown complete");
    Ok(())
}

/// Ensures the RPC and database URL env vars are set, loading .env if needed.
fn load_required_env_vars(config: &IndexerConfig) -> anyhow::Result<()> {
    let required = [
        config.chain.rpc_url_env_var.as_str(),
        config.database_url_env_var.as_str(),
    ];

    let missing: Vec<&&str> = required
        .iter()
        .filter(|var| env::var(var).is_err())
        .collect();

    if missing.is_empty() {
        return Ok(());
    }

    dotenvy::dotenv().with_context(|| {
        format!(
            "Missing env vars {:?} and failed to load .env file",
            missing
        )
    })?;

    let still_missing: Vec<&str> = required
        .iter()
        .filter(|var| env::var(var).is_err())
        .copied()
        .collect();

    anyhow::ensure!(
        still_missing.is_empty(),
        "Missing required env vars after loading .env: {:?}",
        still_missing
    );

    Ok(())
}

async fn connect_db(config: &IndexerConfig) -> anyhow::Result<Arc<DbPool>> {
    let database_url = env::var(&config.database_url_env_var)
        .with_context(|| format!("env var {} not set", config.database_url_env_var))?;

    let pool = DbPool::new(&database_url, DB_POOL_SIZE)
        .await
        .context("failed to create database pool")?;
    pool.run_migrations()
        .await
        .context("failed to run database migrations")?;

    tracing::info!("Database pool initialized and migrations complete");
    Ok(Arc::new(pool))
}

async fn connect_chain(config: &IndexerConfig) -> anyhow::Result<RpcBlockChain> {
    let chain = &config.chain;
    let rpc_url = env::var(&chain.rpc_url_env_var).with_context(|| {
        format!(
            "env var {} not set for chain {}",
            chain.rpc_url_env_var, chain.name
        )
    })?;
    let url = Url::parse(&rpc_url)
        .with_context(|| format!("invalid RPC URL in {}", chain.rpc_url_env_var))?;

    let mut rpc_config =
        RpcClientConfig::new(url).with_retry(RetryConfig::new(chain.max_retries));
    if let Some(rps) = chain.requests_per_second.and_then(NonZeroU32::new) {
        rpc_config = rpc_config.with_rate_limit(RateLimitConfig {
            requests_per_second: rps,
            ..Default::default()
        });
    }

    let client = RpcClient::new(rpc_config).context("failed to create RPC client")?;
    RpcBlockChain::connect(client)
        .await
        .with_context(|| format!("failed to connect to node for chain {}", chain.name))
}

fn write_health_check(sync: &SyncConfig, mode: Mode) {
    let Some(path) = &sync.health_check_path else {
        return;
    };
    let status = format!("{:?} starting\n", mode);
    if let Err(e) = std::fs::write(Path::new(path), status) {
        tracing::error!("Error writing health check file {}: {}", path, e);
    }
}

async fn run_sync_mode(
    mode: Mode,
    config: &IndexerConfig,
    pool: Arc<DbPool>,
    chain: Arc<dyn BlockChain>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let head = chain.last_block().await.context("failed to read chain head")?;
    anyhow::ensure!(
        config.sync.starting_block <= head,
        "starting block number ({}) greater than client's most recent synced block ({})",
        config.sync.starting_block,
        head
    );

    write_health_check(&config.sync, mode);

    let node_id = register_node(&pool, chain.node())
        .await
        .context("failed to register node")?;

    let pipeline: Arc<dyn SyncPipeline> = if mode == Mode::HeaderSync {
        let repository = Arc::new(PgHeaderRepository::new(pool.clone(), node_id));
        Arc::new(HeaderPipeline::new(chain, repository, &config.sync))
    } else {
        let filters = PgFilterRepository::new(pool.clone());
        register_filters(&filters, &config.filters)
            .await
            .context("failed to register log filters")?;

        let repository = Arc::new(PgBlockRepository::new(pool.clone(), node_id));
        Arc::new(BlockPipeline::new(chain, repository, &config.sync))
    };

    run_sync(pipeline, config.sync.clone(), cancel).await;
    Ok(())
}

fn transformer_deps(
    pool: &Arc<DbPool>,
    chain: Arc<dyn BlockChain>,
    node_id: i32,
) -> TransformerDeps {
    TransformerDeps {
        chain,
        watched_events: Arc::new(PgWatchedEventRepository::new(pool.clone())),
        sink: pool.clone(),
        block_facts: Arc::new(PgBlockFactRepository::new(pool.clone(), node_id)),
    }
}

async fn run_watch_mode(
    config: &IndexerConfig,
    pool: Arc<DbPool>,
    chain: Arc<dyn BlockChain>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let filters = Arc::new(PgFilterRepository::new(pool.clone()));
    register_filters(filters.as_ref(), &config.filters)
        .await
        .context("failed to register log filters")?;

    let node_id = register_node(&pool, chain.node())
        .await
        .context("failed to register node")?;

    let transformations = &config.transformations;
    let mut deps = transformer_deps(&pool, chain.clone(), node_id);
    if transformations.event_source == EventSource::Chain {
        tracing::info!("Reading watched events from the node");
        deps.watched_events = Arc::new(ChainWatchedEvents::new(chain, filters));
    }

    let mut initializers: Vec<TransformerInitializer> = transformations
        .event_transformers
        .iter()
        .map(|t| WatchedEventRecorder::initializer(&t.name, t.filters.clone()))
        .collect();
    if let Some(rewards) = &transformations.miner_rewards {
        initializers.push(MinerRewardFetcher::initializer(rewards.starting_block));
    }

    let mut watcher = Watcher::new(deps);
    watcher.add_transformers(initializers);

    watcher
        .run(transformations.watch_interval(), cancel)
        .await
        .context("watcher stopped")
}

async fn run_storage_watch_mode(
    config: &IndexerConfig,
    pool: Arc<DbPool>,
    chain: Arc<dyn BlockChain>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let storage = config
        .storage
        .as_ref()
        .context("storage-watch mode requires a `storage` config section")?;

    let node_id = register_node(&pool, chain.node())
        .await
        .context("failed to register node")?;

    let tailer = Arc::new(FileTailer::new(&storage.diff_path, storage.tail_poll_interval()));
    let queue = Arc::new(PgStorageQueue::new(pool.clone()));
    let mut watcher = StorageWatcher::new(tailer, queue, transformer_deps(&pool, chain, node_id));
    watcher.add_transformers(
        storage
            .contracts
            .iter()
            .map(|&contract| StorageDiffRecorder::initializer(contract))
            .collect(),
    );
    let watcher = Arc::new(watcher);

    tracing::info!("Tailing storage diffs from {}", storage.diff_path.display());

    let mut tasks: JoinSet<anyhow::Result<()>> = JoinSet::new();

    tasks.spawn({
        let watcher = watcher.clone();
        let cancel = cancel.clone();
        async move {
            let result = watcher.execute(cancel.clone()).await;
            tracing::info!("Storage watcher stopped: {:?}", watcher.state());
            cancel.cancel();
            result.context("storage watcher failed")
        }
    });

    tasks.spawn({
        let watcher = watcher.clone();
        let interval = storage.queue_retry_interval();
        async move {
            watcher.run_queue(interval, cancel).await;
            Ok(())
        }
    });

    while let Some(result) = tasks.join_next().await {
        result.context("storage task panicked")??;
    }

    Ok(())
}
