//! Error types for the ledger domain layer.
//!
//! This module defines a hierarchy of error types:
//!
//! - [`DomainError`] - Data-integrity faults (codec, decoding, arithmetic)
//! - [`StorageError`] - Database/repository errors
//! - [`ChainError`] - Block provider errors
//! - [`IndexerError`] - Top-level pipeline errors
//!
//! Error conversion is automatic via `From` implementations,
//! allowing `?` to work across error boundaries.
//!
//! Domain errors are never retried: replaying malformed chain data cannot
//! fix it. Storage and chain errors are retried by the pipeline with
//! backoff, except the ones that fail the same way on every attempt
//! (see [`IndexerError::is_transient`]).

use thiserror::Error;

// =============================================================================
// Domain Errors
// =============================================================================

/// Data-integrity faults raised while decoding or folding chain data.
#[derive(Debug, Error)]
pub enum DomainError {
    /// Raw account identifier does not have the expected byte length.
    #[error("Invalid identifier length: expected {expected} bytes, got {actual}")]
    InvalidIdentifierLength {
        /// Required length.
        expected: usize,
        /// Length that was provided.
        actual: usize,
    },

    /// Address text is malformed or belongs to another network.
    #[error("Invalid address format: {0}")]
    InvalidAddressFormat(String),

    /// Network name has no known SS58 prefix.
    #[error("Unknown network: {0}")]
    UnknownNetwork(String),

    /// Transfer payload could not be parsed by the selected schema.
    #[error("Unrecognized event shape: {0}")]
    UnrecognizedEventShape(String),

    /// A balance left the representable 128-bit range.
    #[error("Balance overflow on account {account}")]
    BalanceOverflow {
        /// Address whose balance overflowed.
        account: String,
    },

}

// =============================================================================
// Storage Errors
// =============================================================================

/// Database and repository errors.
///
/// These errors originate from storage operations like queries,
/// transactions, and data serialization.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Failed to establish database connection.
    #[error("Database connection error: {0}")]
    ConnectionError(String),

    /// SQL query execution failed.
    #[error("Query execution error: {0}")]
    QueryError(String),

    /// Database migration failed.
    #[error("Migration error: {0}")]
    MigrationError(String),

    /// Transaction commit/rollback failed.
    #[error("Transaction error: {0}")]
    TransactionError(String),

    /// Data serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    SerializationError(String),
}

// =============================================================================
// Chain Errors
// =============================================================================

/// Block provider errors.
///
/// These errors occur when communicating with the Substrate node
/// via WebSocket RPC.
#[derive(Debug, Error)]
pub enum ChainError {
    /// WebSocket connection failed.
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// RPC request failed.
    #[error("RPC error: {0}")]
    RpcError(String),

    /// Block data could not be decoded against its runtime metadata.
    #[error("Metadata error: {0}")]
    MetadataError(String),

    /// Block was produced by a runtime this client cannot decode.
    #[error("Unsupported runtime {spec_version}: {reason}")]
    UnsupportedRuntime {
        /// Runtime spec version of the block.
        spec_version: u32,
        /// Why the runtime is unsupported.
        reason: String,
    },

    /// Block could not be fetched.
    #[error("Block fetch error at {number}: {message}")]
    BlockFetchError {
        /// Block number that failed to fetch.
        number: u64,
        /// Error details.
        message: String,
    },
}

// =============================================================================
// Indexer Errors
// =============================================================================

/// Top-level pipeline errors.
///
/// This is the main error type returned by [`crate::services::PipelineService`].
/// It wraps all lower-level errors and adds pipeline-specific variants.
#[derive(Debug, Error)]
pub enum IndexerError {
    /// Domain logic error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Storage/database error.
    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    /// Block provider error.
    #[error("Chain error: {0}")]
    Chain(#[from] ChainError),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Connected chain doesn't match stored data.
    ///
    /// This is a fatal error that requires manual intervention.
    #[error("Chain mismatch: connected to {connected} but database contains data for {expected}")]
    ChainMismatch {
        /// Genesis hash of connected chain.
        connected: String,
        /// Genesis hash expected by database.
        expected: String,
    },

    /// Graceful shutdown was requested.
    ///
    /// This is not really an error but uses the error type for control flow.
    #[error("Indexer shutdown requested")]
    ShutdownRequested,
}

impl IndexerError {
    /// Whether the failed step may succeed if retried unchanged.
    ///
    /// Undecodable block data and unreadable stored values are
    /// deterministic: they fail identically on every attempt.
    pub fn is_transient(&self) -> bool {
        match self {
            IndexerError::Storage(StorageError::SerializationError(_)) => false,
            IndexerError::Chain(
                ChainError::MetadataError(_) | ChainError::UnsupportedRuntime { .. },
            ) => false,
            IndexerError::Storage(_) | IndexerError::Chain(_) => true,
            _ => false,
        }
    }
}

// =============================================================================
// Result Type Aliases
// =============================================================================

/// Result type for pipeline operations.
pub type IndexerResult<T> = Result<T, IndexerError>;

/// Result type for domain operations.
pub type DomainResult<T> = Result<T, DomainError>;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Result type for chain operations.
pub type ChainResult<T> = Result<T, ChainError>;
