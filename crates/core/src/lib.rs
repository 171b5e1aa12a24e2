//! Core domain layer for the Tally ledger indexer.
//!
//! This crate contains the domain models, port traits (interfaces), and
//! the batch pipeline that turns `Balances.Transfer` events into per-account
//! balances. It follows hexagonal architecture principles - this is the
//! innermost layer with no dependencies on infrastructure.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      tally (binary)                         │
//! ├──────────────────────────────┬──────────────────────────────┤
//! │       tally-substrate        │        tally-storage         │
//! │           (RPC)              │        (PostgreSQL)          │
//! ├──────────────────────────────┴──────────────────────────────┤
//! │                     tally-core  ← YOU ARE HERE              │
//! │     (codec, decoder, extractor, aggregator, pipeline)       │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Modules
//!
//! - [`address`] - SS58 address codec
//! - [`decoder`] - Version-aware transfer payload decoder
//! - [`extractor`] - Batch extraction of transfers from raw blocks
//! - [`aggregator`] - Folding transfers into account balances
//! - [`models`] - Domain models (Address, TransferEvent, Account, etc.)
//! - [`ports`] - Interface traits for adapters to implement
//! - [`services`] - The batch pipeline (PipelineService)
//! - [`error`] - Domain error types
//! - [`metrics`] - Prometheus metrics definitions
//!
//! # Pipeline Lifecycle
//!
//! 1. Fetch the next batch of finalized blocks after the cursor
//! 2. Decode every tracked transfer, oldest runtime schema first
//! 3. Load the touched accounts once and apply transfers in order
//! 4. Commit balances, transfers, history and cursor atomically

pub mod address;
pub mod aggregator;
pub mod decoder;
pub mod error;
pub mod extractor;
pub mod metrics;
pub mod models;
pub mod ports;
pub mod services;
