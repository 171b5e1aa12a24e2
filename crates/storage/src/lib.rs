//! Storage layer for the Tally indexer.
//!
//! This crate provides PostgreSQL implementations of the repository traits
//! defined in `tally-core`. It handles connection pooling, migrations and
//! the per-batch ledger transaction.
//!
//! # Usage
//!
//! ```ignore
//! use tally_storage::{Database, DatabaseConfig, PgLedgerRepository};
//!
//! // Connect to the database
//! let config = DatabaseConfig::for_pipeline(&database_url);
//! let db = Database::connect(&config).await?;
//!
//! // Run migrations
//! db.migrate().await?;
//!
//! let repository = Arc::new(PgLedgerRepository::new(Arc::new(db)));
//! ```

pub mod postgres;

pub use postgres::{Database, DatabaseConfig, PgLedgerRepository, PurgeStats};
