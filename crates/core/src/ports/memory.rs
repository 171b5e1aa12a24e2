//! In-memory port implementations for tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;

use crate::error::{ChainError, ChainResult, StorageError, StorageResult};
use crate::models::{
    Account, Address, BlockHash, HistoricalBalance, IndexerCursor, TransferEvent,
};
use crate::ports::{
    BatchCommit, BlockSource, CursorRepository, FinalizedHead, LedgerRepository, RawBlock,
};

#[derive(Default)]
struct LedgerState {
    accounts: HashMap<Address, Account>,
    transfers: BTreeMap<String, TransferEvent>,
    history: BTreeMap<String, HistoricalBalance>,
    cursor: Option<IndexerCursor>,
    commits: u32,
}

/// Ledger store backed by a mutex-guarded map.
#[derive(Default)]
pub struct MemoryLedger {
    state: Mutex<LedgerState>,
    failing_commits: AtomicU32,
    failing_loads: AtomicU32,
    failing_cursor_reads: AtomicU32,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_cursor(cursor: IndexerCursor) -> Self {
        let ledger = Self::default();
        ledger.state.lock().unwrap().cursor = Some(cursor);
        ledger
    }

    /// Make the next `n` commits fail without applying anything.
    pub fn fail_next_commits(&self, n: u32) {
        self.failing_commits.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` account loads fail.
    pub fn fail_next_loads(&self, n: u32) {
        self.failing_loads.store(n, Ordering::SeqCst);
    }

    /// Make the next `n` cursor reads fail.
    pub fn fail_next_cursor_reads(&self, n: u32) {
        self.failing_cursor_reads.store(n, Ordering::SeqCst);
    }

    pub fn balance(&self, id: &Address) -> Option<crate::models::Balance> {
        self.state.lock().unwrap().accounts.get(id).map(|a| a.balance)
    }

    pub fn transfers(&self) -> Vec<TransferEvent> {
        self.state.lock().unwrap().transfers.values().cloned().collect()
    }

    pub fn history(&self) -> Vec<HistoricalBalance> {
        self.state.lock().unwrap().history.values().cloned().collect()
    }

    pub fn stored_cursor(&self) -> Option<IndexerCursor> {
        self.state.lock().unwrap().cursor.clone()
    }

    pub fn commits(&self) -> u32 {
        self.state.lock().unwrap().commits
    }
}

fn take_failure(counter: &AtomicU32) -> bool {
    counter
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
        .is_ok()
}

#[async_trait]
impl CursorRepository for MemoryLedger {
    async fn get_cursor(&self, chain_id: &str) -> StorageResult<Option<IndexerCursor>> {
        if take_failure(&self.failing_cursor_reads) {
            return Err(StorageError::ConnectionError("injected cursor failure".into()));
        }
        let state = self.state.lock().unwrap();
        Ok(state.cursor.clone().filter(|c| c.chain_id == chain_id))
    }

    async fn get_any_cursor(&self) -> StorageResult<Option<IndexerCursor>> {
        if take_failure(&self.failing_cursor_reads) {
            return Err(StorageError::ConnectionError("injected cursor failure".into()));
        }
        Ok(self.state.lock().unwrap().cursor.clone())
    }
}

#[async_trait]
impl LedgerRepository for MemoryLedger {
    fn cursor(&self) -> &dyn CursorRepository {
        self
    }

    async fn load_accounts(&self, ids: &[Address]) -> StorageResult<HashMap<Address, Account>> {
        if take_failure(&self.failing_loads) {
            return Err(StorageError::ConnectionError("injected load failure".into()));
        }
        let state = self.state.lock().unwrap();
        Ok(ids
            .iter()
            .filter_map(|id| state.accounts.get(id).map(|a| (id.clone(), a.clone())))
            .collect())
    }

    async fn commit_batch(&self, batch: BatchCommit<'_>) -> StorageResult<()> {
        if take_failure(&self.failing_commits) {
            return Err(StorageError::TransactionError("injected commit failure".into()));
        }
        let mut state = self.state.lock().unwrap();
        for account in batch.accounts {
            state.accounts.insert(account.id.clone(), account.clone());
        }
        for transfer in batch.transfers {
            state
                .transfers
                .entry(transfer.id.clone())
                .or_insert_with(|| transfer.clone());
        }
        for entry in batch.history {
            state
                .history
                .entry(entry.id.clone())
                .or_insert_with(|| entry.clone());
        }
        state.cursor = Some(batch.cursor.clone());
        state.commits += 1;
        Ok(())
    }
}

/// Block source replaying a fixed list of blocks.
pub struct ScriptedSource {
    genesis: BlockHash,
    blocks: Mutex<Vec<RawBlock>>,
    failing_fetches: AtomicU32,
    undecodable_from: Mutex<Option<u64>>,
    fetches: AtomicU32,
}

impl ScriptedSource {
    pub fn new(genesis: BlockHash, blocks: Vec<RawBlock>) -> Self {
        Self {
            genesis,
            blocks: Mutex::new(blocks),
            failing_fetches: AtomicU32::new(0),
            undecodable_from: Mutex::new(None),
            fetches: AtomicU32::new(0),
        }
    }

    pub fn fail_next_fetches(&self, n: u32) {
        self.failing_fetches.store(n, Ordering::SeqCst);
    }

    /// Every batch reaching `number` fails to decode, on every attempt.
    pub fn undecodable_from(&self, number: u64) {
        *self.undecodable_from.lock().unwrap() = Some(number);
    }

    /// Number of `fetch_batch` calls so far.
    pub fn fetches(&self) -> u32 {
        self.fetches.load(Ordering::SeqCst)
    }

    /// Simulate the chain producing new finalized blocks.
    pub fn push(&self, block: RawBlock) {
        self.blocks.lock().unwrap().push(block);
    }
}

#[async_trait]
impl BlockSource for ScriptedSource {
    async fn genesis_hash(&self) -> ChainResult<BlockHash> {
        Ok(self.genesis)
    }

    async fn finalized_head(&self) -> ChainResult<FinalizedHead> {
        let blocks = self.blocks.lock().unwrap();
        let last = blocks.last();
        Ok(FinalizedHead {
            number: last.map(|b| b.number).unwrap_or(0),
            hash: last.map(|b| b.hash).unwrap_or(self.genesis.0),
        })
    }

    async fn fetch_batch(&self, from: u64, limit: u32) -> ChainResult<Vec<RawBlock>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        if take_failure(&self.failing_fetches) {
            return Err(ChainError::ConnectionFailed("injected fetch failure".into()));
        }
        let blocks = self.blocks.lock().unwrap();
        let batch: Vec<RawBlock> = blocks
            .iter()
            .filter(|b| b.number >= from)
            .take(limit as usize)
            .cloned()
            .collect();
        if let Some(bad) = *self.undecodable_from.lock().unwrap() {
            if batch.iter().any(|b| b.number >= bad) {
                return Err(ChainError::MetadataError(format!(
                    "block {} events do not match runtime metadata",
                    bad
                )));
            }
        }
        Ok(batch)
    }
}
