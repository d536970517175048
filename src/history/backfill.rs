//! One gap-filling sweep over stored blocks or headers.
//!
//! A sweep covers `[starting_block, head - 1]`; the tip belongs to the
//! validators. Callers relaunch sweeps forever, one at a time.

use crate::db::{BlockRepository, HeaderRepository, UpsertOutcome};
use crate::rpc::BlockChain;

use super::error::HistoryError;

/// Fetches and stores every missing block. Returns how many were filled; the
/// first error aborts the sweep.
pub async fn populate_missing_blocks(
    chain: &dyn BlockChain,
    repository: &dyn BlockRepository,
    starting_block: i64,
) -> Result<usize, HistoryError> {
    let head = chain.last_block().await?;
    let missing = repository
        .missing_block_numbers(starting_block, head - 1)
        .await?;
    if missing.is_empty() {
        return Ok(0);
    }

    tracing::info!(
        "Backfilling {} missing blocks between {} and {}",
        missing.len(),
        starting_block,
        head - 1
    );

    for &number in &missing {
        let block = chain.get_block_by_number(number).await?;
        repository
            .create_or_update_block(&block)
            .await
            .map_err(HistoryError::at(number))?;
    }

    Ok(missing.len())
}

/// Header counterpart of [`populate_missing_blocks`]. Skips the sweep when the
/// head header is already stored, and counts only headers actually written.
pub async fn populate_missing_headers(
    chain: &dyn BlockChain,
    repository: &dyn HeaderRepository,
    starting_block: i64,
) -> Result<usize, HistoryError> {
    let head = chain.last_block().await?;
    if repository
        .header_exists(head)
        .await
        .map_err(HistoryError::at(head))?
    {
        return Ok(0);
    }

    let missing = repository
        .missing_block_numbers(starting_block, head - 1)
        .await?;
    if !missing.is_empty() {
        tracing::info!(
            "Backfilling {} missing headers between {} and {}",
            missing.len(),
            starting_block,
            head - 1
        );
    }

    let mut filled = 0;
    for &number in &missing {
        let header = chain.get_header_by_number(number).await?;
        match repository
            .create_or_update_header(&header)
            .await
            .map_err(HistoryError::at(number))?
        {
            UpsertOutcome::Unchanged => {
                tracing::debug!("Header {} already valid, skipping", number);
            }
            UpsertOutcome::Inserted | UpsertOutcome::Replaced => filled += 1,
        }
    }

    Ok(filled)
}
