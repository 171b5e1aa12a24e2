//! Ledger pipeline - drives batches from the block source into the store.
//!
//! One batch is in flight at a time. Each batch goes through
//! fetch → extract → aggregate → commit, and the cursor only moves as part
//! of the commit.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, error, info, instrument, trace, warn};

use crate::aggregator::{aggregate, touched_addresses};
use crate::error::{IndexerError, IndexerResult};
use crate::extractor::BatchExtractor;
use crate::metrics::{ProcessingTimer, record_batch_indexed, record_retry};
use crate::models::{BlockHash, IndexerCursor};
use crate::ports::{BlockSource, LedgerRepository, RawBlock};

// =============================================================================
// Configuration
// =============================================================================

/// Configuration for the pipeline service.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Chain identifier (usually genesis hash).
    pub chain_id: String,
    /// SS58 network used to encode addresses.
    pub network: String,
    /// Qualified name of the tracked event.
    pub event_name: String,
    /// Maximum number of blocks per batch.
    pub batch_size: u32,
    /// Idle delay once the pipeline has caught up with the chain.
    pub poll_interval: Duration,
    /// First block to index when no cursor exists.
    pub start_block: u64,
    /// First backoff delay after a transient failure.
    pub initial_retry_delay: Duration,
    /// Backoff ceiling.
    pub max_retry_delay: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            chain_id: String::new(),
            network: "kusama".to_string(),
            event_name: "Balances.Transfer".to_string(),
            batch_size: 500,
            poll_interval: Duration::from_secs(10),
            start_block: 0,
            initial_retry_delay: Duration::from_millis(500),
            max_retry_delay: Duration::from_secs(30),
        }
    }
}

fn short(id: &str) -> &str {
    &id[..16.min(id.len())]
}

// =============================================================================
// PipelineService
// =============================================================================

/// Batch pipeline folding transfers into the ledger.
///
/// # Flow
///
/// 1. Fetch the next batch after the stored cursor
/// 2. Idle for `poll_interval` when the batch is empty
/// 3. Extract transfers, then aggregate them over the stored balances
/// 4. Commit accounts, transfers, history and cursor in one transaction
///
/// Storage and chain failures are retried with exponential backoff on the
/// same batch. Domain failures and undecodable block data stop the pipeline.
pub struct PipelineService<S: BlockSource, R: LedgerRepository> {
    config: PipelineConfig,
    block_source: Arc<S>,
    repository: Arc<R>,
    extractor: BatchExtractor,
}

impl<S: BlockSource, R: LedgerRepository> PipelineService<S, R> {
    pub fn new(
        config: PipelineConfig,
        block_source: Arc<S>,
        repository: Arc<R>,
    ) -> IndexerResult<Self> {
        if config.batch_size == 0 {
            return Err(IndexerError::ConfigError(
                "batch size must be at least 1".to_string(),
            ));
        }
        let extractor = BatchExtractor::new(&config.network, config.event_name.clone())?;
        Ok(Self {
            config,
            block_source,
            repository,
            extractor,
        })
    }

    /// Run until shutdown or a fatal error.
    ///
    /// A requested shutdown is reported as [`IndexerError::ShutdownRequested`].
    #[instrument(skip_all, fields(chain = %short(&self.config.chain_id)))]
    pub async fn run(&self, mut shutdown_rx: watch::Receiver<bool>) -> IndexerResult<()> {
        info!(
            network = %self.config.network,
            event = %self.config.event_name,
            "⛓️  Starting pipeline"
        );

        self.with_retry("chain", &mut shutdown_rx, || self.verify_chain_id())
            .await?;

        let mut next_block = self
            .with_retry("cursor", &mut shutdown_rx, || self.resume_point())
            .await?;
        let head = self
            .with_retry("head", &mut shutdown_rx, || self.block_source.finalized_head())
            .await?;
        info!(from = next_block, head = head.number, "📍 Resuming ingestion");

        loop {
            if *shutdown_rx.borrow() {
                debug!("Shutdown requested");
                return Err(IndexerError::ShutdownRequested);
            }

            let limit = self.config.batch_size;
            let blocks = self
                .with_retry("fetch", &mut shutdown_rx, || {
                    self.block_source.fetch_batch(next_block, limit)
                })
                .await?;

            let Some(last) = blocks.last() else {
                trace!(next = next_block, "Caught up, idling");
                self.idle(&mut shutdown_rx).await?;
                continue;
            };
            let last_number = last.number;

            self.process_batch(&blocks, &mut shutdown_rx)
                .await
                .inspect_err(|e| {
                    if !matches!(e, IndexerError::ShutdownRequested) {
                        error!(from = next_block, to = last_number, error = %e, "❌ Batch failed");
                    }
                })?;
            next_block = last_number + 1;
        }
    }

    /// Verify the connected chain matches any existing indexed data.
    /// Returns error if database contains data from a different chain.
    async fn verify_chain_id(&self) -> IndexerResult<()> {
        let existing_cursor = self.repository.cursor().get_any_cursor().await?;

        if let Some(cursor) = existing_cursor {
            if cursor.chain_id != self.config.chain_id {
                error!(
                    connected = short(&self.config.chain_id),
                    expected = short(&cursor.chain_id),
                    "❌ Chain mismatch! Database contains data from a different chain"
                );
                error!(
                    "   Manual action required: either connect to the correct chain or purge the database"
                );

                return Err(IndexerError::ChainMismatch {
                    connected: self.config.chain_id.clone(),
                    expected: cursor.chain_id,
                });
            }
            debug!("Chain ID verified");
        }

        Ok(())
    }

    /// First block to fetch: right after the cursor, or `start_block`.
    async fn resume_point(&self) -> IndexerResult<u64> {
        let cursor = self
            .repository
            .cursor()
            .get_cursor(&self.config.chain_id)
            .await?;

        Ok(match cursor {
            Some(cursor) => {
                debug!(block = cursor.last_indexed_block, "Cursor found");
                cursor.next_block()
            }
            None => {
                debug!(start = self.config.start_block, "No cursor found, starting fresh");
                self.config.start_block
            }
        })
    }

    /// Extract, aggregate and commit one non-empty batch.
    #[instrument(skip_all, fields(from = blocks.first().map(|b| b.number), count = blocks.len()))]
    async fn process_batch(
        &self,
        blocks: &[RawBlock],
        shutdown_rx: &mut watch::Receiver<bool>,
    ) -> IndexerResult<()> {
        let Some(last) = blocks.last() else {
            return Ok(());
        };
        let timer = ProcessingTimer::new();

        let transfers = self.extractor.extract(blocks)?;
        let addresses = touched_addresses(&transfers);
        let known = self
            .with_retry("load", shutdown_rx, || {
                self.repository.load_accounts(&addresses)
            })
            .await?;
        trace!(touched = addresses.len(), stored = known.len(), "Accounts loaded");

        let update = aggregate(known, transfers)?;
        let cursor = IndexerCursor {
            chain_id: self.config.chain_id.clone(),
            last_indexed_block: last.number,
            last_indexed_hash: BlockHash(last.hash),
            updated_at: chrono::Utc::now(),
        };

        // Retries reuse the computed update so a partially applied attempt
        // can never be folded twice.
        self.with_retry("commit", shutdown_rx, || {
            self.repository.commit_batch(update.as_commit(&cursor))
        })
        .await?;

        timer.finish();
        record_batch_indexed(update.transfers.len(), update.accounts.len());
        info!(
            block = last.number,
            transfers = update.transfers.len(),
            accounts = update.accounts.len(),
            "⛓️  Batch indexed"
        );
        Ok(())
    }

    /// Sleep for the poll interval unless shutdown arrives first.
    async fn idle(&self, shutdown_rx: &mut watch::Receiver<bool>) -> IndexerResult<()> {
        tokio::select! {
            _ = tokio::time::sleep(self.config.poll_interval) => Ok(()),
            changed = shutdown_rx.changed() => {
                if changed.is_err() || *shutdown_rx.borrow() {
                    return Err(IndexerError::ShutdownRequested);
                }
                Ok(())
            }
        }
    }

    /// Run `op` until it succeeds, backing off on transient failures.
    async fn with_retry<T, E, F, Fut>(
        &self,
        stage: &'static str,
        shutdown_rx: &mut watch::Receiver<bool>,
        mut op: F,
    ) -> IndexerResult<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Into<IndexerError>,
    {
        let mut retry_delay = self.config.initial_retry_delay;

        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(e) => e.into(),
            };
            if !err.is_transient() {
                return Err(err);
            }

            warn!(
                stage,
                error = %err,
                retry_in_ms = retry_delay.as_millis(),
                "⚠️  Transient failure, retrying..."
            );
            record_retry(stage);

            tokio::select! {
                _ = tokio::time::sleep(retry_delay) => {
                    retry_delay = (retry_delay * 2).min(self.config.max_retry_delay);
                }
                changed = shutdown_rx.changed() => {
                    if changed.is_err() || *shutdown_rx.borrow() {
                        return Err(IndexerError::ShutdownRequested);
                    }
                }
            }
        }
    }
}
