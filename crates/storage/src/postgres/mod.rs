//! PostgreSQL storage adapter.
//!
//! This module implements the repository traits defined in `tally-core`
//! using PostgreSQL as the backing store.
//!
//! # Architecture
//!
//! - [`Database`] - Connection pool, migrations and purge
//! - [`PgLedgerRepository`] - Implements `LedgerRepository` with one
//!   transaction per batch
//! - [`PgCursorRepository`] - Cursor reads
//!
//! # Usage
//!
//! ```ignore
//! let config = DatabaseConfig::for_pipeline(&database_url);
//! let db = Database::connect(&config).await?;
//! db.migrate().await?;
//!
//! let repository = PgLedgerRepository::new(Arc::new(db));
//! ```

mod cursor_repo;
mod database;
mod helpers;

pub use cursor_repo::PgCursorRepository;
pub use database::{Database, DatabaseConfig, PurgeStats};

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{instrument, trace};

use tally_core::error::{StorageError, StorageResult};
use tally_core::models::{Account, Address};
use tally_core::ports::{BatchCommit, CursorRepository, LedgerRepository};

use helpers::{millis_to_datetime, parse_balance};

// =============================================================================
// Ledger Repository
// =============================================================================

/// PostgreSQL implementation of `LedgerRepository`.
pub struct PgLedgerRepository {
    db: Arc<Database>,
    cursor: PgCursorRepository,
}

impl PgLedgerRepository {
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            cursor: PgCursorRepository::new(&db),
            db,
        }
    }
}

#[async_trait]
impl LedgerRepository for PgLedgerRepository {
    fn cursor(&self) -> &dyn CursorRepository {
        &self.cursor
    }

    async fn load_accounts(&self, ids: &[Address]) -> StorageResult<HashMap<Address, Account>> {
        if ids.is_empty() {
            return Ok(HashMap::new());
        }

        let keys: Vec<&str> = ids.iter().map(Address::as_str).collect();
        let rows = sqlx::query_as::<_, AccountRow>(
            r#"
            SELECT id, balance::TEXT AS balance
            FROM accounts
            WHERE id = ANY($1)
            "#,
        )
        .bind(&keys[..])
        .fetch_all(self.db.pool())
        .await
        .map_err(|e| StorageError::QueryError(e.to_string()))?;

        rows.into_iter()
            .map(|row| {
                let account = row.into_account()?;
                Ok((account.id.clone(), account))
            })
            .collect()
    }

    #[instrument(skip_all, fields(block = batch.cursor.last_indexed_block))]
    async fn commit_batch(&self, batch: BatchCommit<'_>) -> StorageResult<()> {
        let mut tx = self
            .db
            .pool()
            .begin()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        // Accounts first so transfers and history can reference them
        for account in batch.accounts {
            sqlx::query(
                r#"
                INSERT INTO accounts (id, balance)
                VALUES ($1, $2::NUMERIC)
                ON CONFLICT (id) DO UPDATE SET balance = EXCLUDED.balance
                "#,
            )
            .bind(account.id.as_str())
            .bind(account.balance.to_string())
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;
        }

        for transfer in batch.transfers {
            sqlx::query(
                r#"
                INSERT INTO transfers (id, block_number, from_account, to_account, amount, timestamp)
                VALUES ($1, $2, $3, $4, $5::NUMERIC, $6)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(&transfer.id)
            .bind(transfer.block_number as i64)
            .bind(transfer.from.as_str())
            .bind(transfer.to.as_str())
            .bind(transfer.amount.to_string())
            .bind(millis_to_datetime(transfer.timestamp)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;
        }

        for entry in batch.history {
            sqlx::query(
                r#"
                INSERT INTO historical_balances (id, account, balance, timestamp)
                VALUES ($1, $2, $3::NUMERIC, $4)
                ON CONFLICT (id) DO NOTHING
                "#,
            )
            .bind(&entry.id)
            .bind(entry.account.as_str())
            .bind(entry.balance.to_string())
            .bind(millis_to_datetime(entry.timestamp)?)
            .execute(&mut *tx)
            .await
            .map_err(|e| StorageError::QueryError(e.to_string()))?;
        }

        cursor_repo::upsert_cursor(&mut *tx, batch.cursor).await?;

        tx.commit()
            .await
            .map_err(|e| StorageError::TransactionError(e.to_string()))?;

        trace!(
            accounts = batch.accounts.len(),
            transfers = batch.transfers.len(),
            "Batch committed"
        );
        Ok(())
    }
}

// =============================================================================
// Row Types
// =============================================================================

#[derive(sqlx::FromRow)]
struct AccountRow {
    id: String,
    balance: String,
}

impl AccountRow {
    fn into_account(self) -> StorageResult<Account> {
        Ok(Account {
            balance: parse_balance(&self.balance, "accounts.balance")?,
            id: Address::new(self.id),
        })
    }
}
