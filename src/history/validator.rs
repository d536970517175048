use std::sync::Arc;

use crate::db::{BlockRepository, HeaderRepository, UpsertOutcome};
use crate::rpc::BlockChain;

use super::error::HistoryError;
use super::window::{make_validation_window, ValidationWindow};

/// Re-fetches the most recent blocks every tick so reorganised blocks are
/// replaced, then marks old blocks final.
pub struct BlockValidator {
    chain: Arc<dyn BlockChain>,
    repository: Arc<dyn BlockRepository>,
    window_size: i64,
    finality_lag: i64,
}

impl BlockValidator {
    pub fn new(
        chain: Arc<dyn BlockChain>,
        repository: Arc<dyn BlockRepository>,
        window_size: i64,
        finality_lag: i64,
    ) -> Self {
        Self {
            chain,
            repository,
            window_size,
            finality_lag,
        }
    }

    /// One validation pass. A block that cannot be fetched is skipped; an
    /// unreachable chain head or a repository failure ends the pass.
    pub async fn validate_blocks(&self) -> Result<ValidationWindow, HistoryError> {
        let head = self.chain.last_block().await?;
        let window = make_validation_window(head, self.window_size);
        tracing::info!("Validating blocks {}", window);

        for number in window.numbers() {
            let block = match self.chain.get_block_by_number(number).await {
                Ok(block) => block,
                Err(e) => {
                    tracing::warn!("Skipping block {} during validation: {}", number, e);
                    continue;
                }
            };

            let outcome = self
                .repository
                .create_or_update_block(&block)
                .await
                .map_err(HistoryError::at(number))?;
            if outcome == UpsertOutcome::Replaced {
                tracing::info!("Replaced block {} with {:#x}", number, block.hash);
            }
        }

        let finalized = self
            .repository
            .set_blocks_status(head, self.finality_lag)
            .await
            .map_err(HistoryError::at(head))?;
        if finalized > 0 {
            tracing::debug!("Marked {} blocks final below {}", finalized, head - self.finality_lag);
        }

        Ok(window)
    }
}

/// Header counterpart of [`BlockValidator`]. Fetch failures are returned
/// rather than skipped.
pub struct HeaderValidator {
    chain: Arc<dyn BlockChain>,
    repository: Arc<dyn HeaderRepository>,
    window_size: i64,
}

impl HeaderValidator {
    pub fn new(
        chain: Arc<dyn BlockChain>,
        repository: Arc<dyn HeaderRepository>,
        window_size: i64,
    ) -> Self {
        Self {
            chain,
            repository,
            window_size,
        }
    }

    pub async fn validate_headers(&self) -> Result<ValidationWindow, HistoryError> {
        let head = self.chain.last_block().await?;
        let window = make_validation_window(head, self.window_size);
        tracing::info!("Validating headers {}", window);

        for number in window.numbers() {
            let header = self.chain.get_header_by_number(number).await?;
            let outcome = self
                .repository
                .create_or_update_header(&header)
                .await
                .map_err(HistoryError::at(number))?;
            if outcome == UpsertOutcome::Replaced {
                tracing::info!("Replaced header {} with {:#x}", number, header.hash);
            }
        }

        Ok(window)
    }
}
