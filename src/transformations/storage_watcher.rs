//! Tails the storage-diff feed and dispatches each row to the transformer
//! registered for its contract.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::db::StorageQueue;
use crate::types::chain::StorageDiffRow;

use super::error::TransformationError;
use super::registry::{build_storage_registry, StorageTransformerRegistry};
use super::tailer::Tailer;
use super::traits::{StorageTransformerInitializer, TransformerDeps};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    /// The tail source closed its channel.
    Eof,
    /// The source could not be opened or delivered a malformed row.
    Error,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatcherState {
    Idle,
    Tailing,
    Stopped(StopReason),
}

pub struct StorageWatcher {
    tailer: Arc<dyn Tailer>,
    queue: Arc<dyn StorageQueue>,
    deps: TransformerDeps,
    registry: StorageTransformerRegistry,
    state: Mutex<WatcherState>,
}

impl StorageWatcher {
    pub fn new(tailer: Arc<dyn Tailer>, queue: Arc<dyn StorageQueue>, deps: TransformerDeps) -> Self {
        Self {
            tailer,
            queue,
            deps,
            registry: StorageTransformerRegistry::new(),
            state: Mutex::new(WatcherState::Idle),
        }
    }

    /// Builds the address registry. Call once, before [`StorageWatcher::execute`].
    pub fn add_transformers(&mut self, initializers: Vec<StorageTransformerInitializer>) {
        self.registry = build_storage_registry(&self.deps, initializers);
    }

    pub fn state(&self) -> WatcherState {
        match self.state.lock() {
            Ok(state) => *state,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    fn set_state(&self, state: WatcherState) {
        match self.state.lock() {
            Ok(mut guard) => *guard = state,
            Err(poisoned) => *poisoned.into_inner() = state,
        }
    }

    /// Tails until the source closes. A malformed row stops the loop with an
    /// error; unknown contracts and transformer failures are logged and the
    /// loop continues. Rows whose transformer failed are queued for replay.
    pub async fn execute(&self, cancel: CancellationToken) -> Result<(), TransformationError> {
        self.set_state(WatcherState::Tailing);

        let mut lines = match self.tailer.tail(cancel).await {
            Ok(lines) => lines,
            Err(e) => {
                self.set_state(WatcherState::Stopped(StopReason::Error));
                return Err(e.into());
            }
        };

        while let Some(line) = lines.recv().await {
            let row: StorageDiffRow = match line.parse() {
                Ok(row) => row,
                Err(e) => {
                    tracing::error!("Malformed storage diff row '{}': {}", line, e);
                    self.set_state(WatcherState::Stopped(StopReason::Error));
                    return Err(e.into());
                }
            };
            self.dispatch(&row).await;
        }

        self.set_state(WatcherState::Stopped(StopReason::Eof));
        Ok(())
    }

    async fn dispatch(&self, row: &StorageDiffRow) {
        let Some(transformer) = self.registry.get(&row.contract) else {
            tracing::warn!(
                "{}",
                TransformationError::ContractNotFound {
                    contract: row.contract
                }
            );
            return;
        };

        if let Err(e) = transformer.execute(row).await {
            tracing::error!(
                "Storage transformer for {:#x} failed at block {}: {}",
                row.contract,
                row.block_height,
                e
            );
            if let Err(e) = self.queue.add(row).await {
                tracing::error!("Failed to queue storage diff for {:#x}: {}", row.contract, e);
            }
        }
    }

    /// Replays queued rows, deleting those that now succeed. Returns how many
    /// were processed.
    pub async fn process_queue(&self) -> Result<usize, TransformationError> {
        let queued = self.queue.get_all().await?;
        let mut processed = 0;

        for entry in queued {
            let Some(transformer) = self.registry.get(&entry.row.contract) else {
                tracing::warn!(
                    "{}",
                    TransformationError::ContractNotFound {
                        contract: entry.row.contract
                    }
                );
                continue;
            };

            match transformer.execute(&entry.row).await {
                Ok(()) => {
                    self.queue.delete(entry.id).await?;
                    processed += 1;
                }
                Err(e) => {
                    tracing::debug!("Queued storage diff {} still failing: {}", entry.id, e);
                }
            }
        }

        if processed > 0 {
            tracing::info!("Processed {} queued storage diffs", processed);
        }
        Ok(processed)
    }

    /// Calls [`StorageWatcher::process_queue`] every `interval` until
    /// cancelled.
    pub async fn run_queue(&self, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = ticker.tick() => {
                    if let Err(e) = self.process_queue().await {
                        tracing::error!("Processing storage queue failed: {}", e);
                    }
                }
            }
        }
    }
}
