//! Folding transfers into account balances.
//!
//! The aggregator works on one batch at a time. Accounts touched by the
//! batch are loaded once from the store, mutated in a [`WorkingSet`] and
//! written back as absolute balances, so committing the same
//! [`LedgerUpdate`] twice leaves the store unchanged.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use tracing::trace;

use crate::error::{DomainError, DomainResult};
use crate::models::{Account, Address, Balance, HistoricalBalance, IndexerCursor, TransferEvent};
use crate::ports::BatchCommit;

/// Per-batch cache of accounts keyed by address.
#[derive(Debug, Default)]
pub struct WorkingSet {
    accounts: BTreeMap<Address, Account>,
}

impl WorkingSet {
    /// Seed the set with the stored state of the batch's accounts.
    pub fn new(known: HashMap<Address, Account>) -> Self {
        Self {
            accounts: known.into_iter().collect(),
        }
    }

    /// Return the account for `id`, creating it at zero on first touch.
    pub fn fetch_or_insert(&mut self, id: &Address) -> &mut Account {
        self.accounts
            .entry(id.clone())
            .or_insert_with(|| Account::new(id.clone()))
    }

    pub fn len(&self) -> usize {
        self.accounts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.accounts.is_empty()
    }

    /// Drain into accounts sorted by address.
    pub fn into_accounts(self) -> Vec<Account> {
        self.accounts.into_values().collect()
    }
}

/// Everything a batch writes to the store.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct LedgerUpdate {
    /// Final state of every touched account, sorted by address.
    pub accounts: Vec<Account>,
    /// Transfers in chain order.
    pub transfers: Vec<TransferEvent>,
    /// Balance snapshots, two per transfer.
    pub history: Vec<HistoricalBalance>,
}

impl LedgerUpdate {
    /// Bundle the update with the cursor it advances to.
    pub fn as_commit<'a>(&'a self, cursor: &'a IndexerCursor) -> BatchCommit<'a> {
        BatchCommit {
            accounts: &self.accounts,
            transfers: &self.transfers,
            history: &self.history,
            cursor,
        }
    }
}

/// Distinct addresses touched by `transfers`, sorted.
pub fn touched_addresses(transfers: &[TransferEvent]) -> Vec<Address> {
    transfers
        .iter()
        .flat_map(|t| [&t.from, &t.to])
        .cloned()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

/// Applies transfers to a working set in order.
#[derive(Debug, Default)]
pub struct LedgerAggregator {
    working: WorkingSet,
    transfers: Vec<TransferEvent>,
    history: Vec<HistoricalBalance>,
}

impl LedgerAggregator {
    pub fn new(known: HashMap<Address, Account>) -> Self {
        Self {
            working: WorkingSet::new(known),
            transfers: Vec::new(),
            history: Vec::new(),
        }
    }

    /// Debit the sender and credit the recipient of `transfer`.
    pub fn apply(&mut self, transfer: TransferEvent) -> DomainResult<()> {
        let from_balance = if transfer.from == transfer.to {
            self.working.fetch_or_insert(&transfer.from).balance
        } else {
            let sender = self.working.fetch_or_insert(&transfer.from);
            sender.balance = debit(sender.balance, transfer.amount, &transfer.from)?;
            sender.balance
        };

        let to_balance = if transfer.from == transfer.to {
            from_balance
        } else {
            let recipient = self.working.fetch_or_insert(&transfer.to);
            recipient.balance = credit(recipient.balance, transfer.amount, &transfer.to)?;
            recipient.balance
        };

        trace!(
            id = %transfer.id,
            from = %transfer.from,
            to = %transfer.to,
            amount = transfer.amount,
            "Transfer applied"
        );

        self.history.push(HistoricalBalance {
            id: format!("{}-from", transfer.id),
            account: transfer.from.clone(),
            balance: from_balance,
            timestamp: transfer.timestamp,
        });
        self.history.push(HistoricalBalance {
            id: format!("{}-to", transfer.id),
            account: transfer.to.clone(),
            balance: to_balance,
            timestamp: transfer.timestamp,
        });
        self.transfers.push(transfer);
        Ok(())
    }

    pub fn finish(self) -> LedgerUpdate {
        trace!(
            accounts = self.working.len(),
            transfers = self.transfers.len(),
            "Batch folded"
        );
        LedgerUpdate {
            accounts: self.working.into_accounts(),
            transfers: self.transfers,
            history: self.history,
        }
    }
}

/// Fold a whole batch on top of the stored balances in `known`.
pub fn aggregate(
    known: HashMap<Address, Account>,
    transfers: Vec<TransferEvent>,
) -> DomainResult<LedgerUpdate> {
    let mut aggregator = LedgerAggregator::new(known);
    for transfer in transfers {
        aggregator.apply(transfer)?;
    }
    Ok(aggregator.finish())
}

fn debit(balance: Balance, amount: u128, account: &Address) -> DomainResult<Balance> {
    balance
        .checked_sub(amount)
        .ok_or_else(|| DomainError::BalanceOverflow {
            account: account.to_string(),
        })
}

fn credit(balance: Balance, amount: u128, account: &Address) -> DomainResult<Balance> {
    balance
        .checked_add(amount)
        .ok_or_else(|| DomainError::BalanceOverflow {
            account: account.to_string(),
        })
}
