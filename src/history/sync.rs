//! Long-running sync loop: a periodic validator tick plus a self re-arming
//! backfill sweep.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::db::{BlockRepository, HeaderRepository};
use crate::rpc::BlockChain;
use crate::types::config::sync::SyncConfig;

use super::backfill::{populate_missing_blocks, populate_missing_headers};
use super::error::HistoryError;
use super::validator::{BlockValidator, HeaderValidator};
use super::window::ValidationWindow;

/// What a sync loop keeps current: full blocks or headers only.
#[async_trait]
pub trait SyncPipeline: Send + Sync + 'static {
    fn kind(&self) -> &'static str;

    async fn validate(&self) -> Result<ValidationWindow, HistoryError>;

    async fn backfill(&self, starting_block: i64) -> Result<usize, HistoryError>;
}

pub struct BlockPipeline {
    chain: Arc<dyn BlockChain>,
    repository: Arc<dyn BlockRepository>,
    validator: BlockValidator,
}

impl BlockPipeline {
    pub fn new(
        chain: Arc<dyn BlockChain>,
        repository: Arc<dyn BlockRepository>,
        config: &SyncConfig,
    ) -> Self {
        let validator = BlockValidator::new(
            chain.clone(),
            repository.clone(),
            config.validation_window,
            config.finality_lag,
        );
        Self {
            chain,
            repository,
            validator,
        }
    }
}

#[async_trait]
impl SyncPipeline for BlockPipeline {
    fn kind(&self) -> &'static str {
        "blocks"
    }

    async fn validate(&self) -> Result<ValidationWindow, HistoryError> {
        self.validator.validate_blocks().await
    }

    async fn backfill(&self, starting_block: i64) -> Result<usize, HistoryError> {
        populate_missing_blocks(self.chain.as_ref(), self.repository.as_ref(), starting_block).await
    }
}

pub struct HeaderPipeline {
    chain: Arc<dyn BlockChain>,
    repository: Arc<dyn HeaderRepository>,
    validator: HeaderValidator,
}

impl HeaderPipeline {
    pub fn new(
        chain: Arc<dyn BlockChain>,
        repository: Arc<dyn HeaderRepository>,
        config: &SyncConfig,
    ) -> Self {
        let validator =
            HeaderValidator::new(chain.clone(), repository.clone(), config.validation_window);
        Self {
            chain,
            repository,
            validator,
        }
    }
}

#[async_trait]
impl SyncPipeline for HeaderPipeline {
    fn kind(&self) -> &'static str {
        "headers"
    }

    async fn validate(&self) -> Result<ValidationWindow, HistoryError> {
        self.validator.validate_headers().await
    }

    async fn backfill(&self, starting_block: i64) -> Result<usize, HistoryError> {
        populate_missing_headers(self.chain.as_ref(), self.repository.as_ref(), starting_block)
            .await
    }
}

type SweepResult = Result<usize, HistoryError>;

/// Runs until `cancel` fires. A failed validation pass is logged and retried
/// on the next tick.
///
/// A new backfill sweep is only launched after the previous one reported on
/// the completion channel, so sweeps never overlap.
pub async fn run_sync(
    pipeline: Arc<dyn SyncPipeline>,
    config: SyncConfig,
    cancel: CancellationToken,
) {
    let (done_tx, mut done_rx) = mpsc::channel::<SweepResult>(1);

    tracing::info!(
        "Starting {} sync from block {} (window {}, poll every {:?})",
        pipeline.kind(),
        config.starting_block,
        config.validation_window,
        config.poll_interval()
    );

    spawn_sweep(
        pipeline.clone(),
        config.starting_block,
        Duration::ZERO,
        done_tx.clone(),
        cancel.clone(),
    );

    let mut ticker = tokio::time::interval(config.poll_interval());
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => {
                tracing::info!("{} sync cancelled", pipeline.kind());
                break;
            }

            _ = ticker.tick() => {
                if let Err(e) = pipeline.validate().await {
                    tracing::error!("Validating {} failed: {}", pipeline.kind(), e);
                }
            }

            Some(result) = done_rx.recv() => {
                let filled = match result {
                    Ok(filled) => {
                        tracing::info!("Backfill sweep filled {} {}", filled, pipeline.kind());
                        filled
                    }
                    Err(e) => {
                        tracing::error!("Backfill sweep failed: {}", e);
                        0
                    }
                };

                spawn_sweep(
                    pipeline.clone(),
                    config.starting_block,
                    config.backfill_rearm.delay_after(filled),
                    done_tx.clone(),
                    cancel.clone(),
                );
            }
        }
    }
}

fn spawn_sweep(
    pipeline: Arc<dyn SyncPipeline>,
    starting_block: i64,
    delay: Duration,
    done: mpsc::Sender<SweepResult>,
    cancel: CancellationToken,
) {
    tokio::spawn(async move {
        if !delay.is_zero() {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }

        let result = tokio::select! {
            _ = cancel.cancelled() => return,
            result = pipeline.backfill(starting_block) => result,
        };

        let _ = done.send(result).await;
    });
}
