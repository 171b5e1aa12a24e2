//! Port traits for ledger persistence.
//!
//! These traits define the storage interface used by the domain layer.
//! Implementations live in the infrastructure layer (e.g., `tally-storage`).

use std::collections::HashMap;

use async_trait::async_trait;

use crate::error::StorageResult;
use crate::models::{Account, Address, HistoricalBalance, IndexerCursor, TransferEvent};

/// Data bundle for one atomic batch commit.
#[derive(Debug)]
pub struct BatchCommit<'a> {
    /// Final state of every account touched by the batch.
    pub accounts: &'a [Account],
    /// New transfers, in chain order.
    pub transfers: &'a [TransferEvent],
    /// Per-transfer balance snapshots.
    pub history: &'a [HistoricalBalance],
    /// Cursor pointing at the last block of the batch.
    pub cursor: &'a IndexerCursor,
}

/// Repository for indexer cursor state.
#[async_trait]
pub trait CursorRepository: Send + Sync {
    /// Get current cursor for a chain.
    async fn get_cursor(&self, chain_id: &str) -> StorageResult<Option<IndexerCursor>>;

    /// Get any existing cursor (for chain mismatch detection).
    async fn get_any_cursor(&self) -> StorageResult<Option<IndexerCursor>>;
}

/// Ledger store used by the pipeline.
#[async_trait]
pub trait LedgerRepository: Send + Sync {
    /// Access the cursor repository.
    fn cursor(&self) -> &dyn CursorRepository;

    /// Load the stored accounts among `ids`. Unknown ids are simply absent.
    async fn load_accounts(&self, ids: &[Address]) -> StorageResult<HashMap<Address, Account>>;

    /// Persist a batch atomically in a single transaction.
    ///
    /// Upserts accounts by address, appends transfers and history (ignoring
    /// ids that already exist) and moves the cursor. Either everything is
    /// visible afterwards or nothing is, so a retry after an ambiguous
    /// failure is safe.
    async fn commit_batch(&self, batch: BatchCommit<'_>) -> StorageResult<()>;
}
