//! Domain models representing the indexed ledger.
//!
//! These models are storage-agnostic and represent the canonical
//! form of ledger data within the domain layer.

mod balance;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub use balance::Balance;

// =============================================================================
// 32-byte Hash Types
// =============================================================================

/// Macro to generate 32-byte hash newtypes with common functionality.
///
/// Generates:
/// - `from_hex()` - Parse from hex string (with or without 0x prefix)
/// - `to_hex()` - Convert to 0x-prefixed hex string
/// - `Display` trait implementation
/// - `From<[u8; 32]>` implementation
macro_rules! hash32_newtype {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
        pub struct $name(pub [u8; 32]);

        impl $name {
            /// Parse from hex string (with or without 0x prefix).
            pub fn from_hex(s: &str) -> Result<Self, hex::FromHexError> {
                let s = s.strip_prefix("0x").unwrap_or(s);
                let bytes = hex::decode(s)?;
                let arr: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| hex::FromHexError::InvalidStringLength)?;
                Ok(Self(arr))
            }

            /// Convert to 0x-prefixed hex string.
            pub fn to_hex(&self) -> String {
                format!("0x{}", hex::encode(self.0))
            }

            /// Get the inner bytes.
            pub fn as_bytes(&self) -> &[u8; 32] {
                &self.0
            }
        }

        impl std::fmt::Display for $name {
            fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
                write!(f, "{}", self.to_hex())
            }
        }

        impl From<[u8; 32]> for $name {
            fn from(bytes: [u8; 32]) -> Self {
                Self(bytes)
            }
        }

        impl AsRef<[u8]> for $name {
            fn as_ref(&self) -> &[u8] {
                &self.0
            }
        }
    };
}

hash32_newtype!(
    /// 32-byte block hash (Blake2-256).
    BlockHash
);

hash32_newtype!(
    /// 32-byte raw account identifier (public key bytes).
    AccountId
);

// =============================================================================
// Addresses
// =============================================================================

/// Network-scoped textual account address (SS58).
///
/// Construct through [`crate::address::encode`] for fresh chain data.
/// [`Address::new`] does not validate and is meant for values that were
/// already produced by the codec, such as rows read back from storage.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Address(String);

impl Address {
    pub fn new(encoded: impl Into<String>) -> Self {
        Self(encoded.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_inner(self) -> String {
        self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Address {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// =============================================================================
// Ledger Entities
// =============================================================================

/// A normalized balance transfer observed on chain.
///
/// Append-only: once extracted a transfer is never mutated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransferEvent {
    /// Chain-ordered unique event id.
    pub id: String,
    /// Block number containing this transfer.
    pub block_number: u64,
    /// Sender address.
    pub from: Address,
    /// Recipient address.
    pub to: Address,
    /// Amount transferred (in smallest unit).
    pub amount: u128,
    /// Block timestamp in milliseconds since epoch.
    pub timestamp: u64,
}

/// Net balance of an account as seen through observed transfers.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: Address,
    pub balance: Balance,
}

impl Account {
    /// A never-seen account starts at zero.
    pub fn new(id: Address) -> Self {
        Self {
            id,
            balance: Balance::ZERO,
        }
    }
}

/// Balance of an account right after one side of a transfer was applied.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoricalBalance {
    /// `<transfer id>-from` or `<transfer id>-to`.
    pub id: String,
    pub account: Address,
    pub balance: Balance,
    /// Block timestamp in milliseconds since epoch.
    pub timestamp: u64,
}

// =============================================================================
// Indexer State
// =============================================================================

/// Indexer cursor tracking progress.
///
/// The cursor tracks the last fully committed block for each chain,
/// enabling the pipeline to resume without gaps or replays.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerCursor {
    /// Chain identifier (genesis hash).
    pub chain_id: String,
    /// Last fully indexed block number.
    pub last_indexed_block: u64,
    /// Last indexed block hash.
    pub last_indexed_hash: BlockHash,
    /// Last update timestamp.
    pub updated_at: DateTime<Utc>,
}

impl IndexerCursor {
    /// First block that still needs indexing.
    pub fn next_block(&self) -> u64 {
        self.last_indexed_block + 1
    }
}

// =============================================================================
// Tests
// =============================================================================
