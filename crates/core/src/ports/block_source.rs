//! Port trait for the block data source.
//!
//! This trait defines the interface for pulling ordered, finalized batches
//! of blocks from a chain. Implementations live in the infrastructure layer
//! (e.g., `tally-substrate`).

use async_trait::async_trait;

use crate::error::ChainResult;
use crate::models::BlockHash;

/// Raw block data from the chain before extraction.
#[derive(Debug, Clone)]
pub struct RawBlock {
    /// Block number.
    pub number: u64,
    /// Block hash.
    pub hash: [u8; 32],
    /// Block timestamp in milliseconds (from the Timestamp pallet).
    pub timestamp: u64,
    /// Events emitted in this block, in execution order.
    pub events: Vec<RawEvent>,
}

/// Raw event data.
#[derive(Debug, Clone)]
pub struct RawEvent {
    /// Chain-ordered unique id (see [`event_id`]).
    pub id: String,
    /// Qualified event name, e.g. `Balances.Transfer`.
    pub name: String,
    /// Runtime spec version the event was emitted under.
    pub spec_version: u32,
    /// Event fields as JSON.
    pub payload: serde_json::Value,
}

/// Notification of the current finalized head.
#[derive(Debug, Clone)]
pub struct FinalizedHead {
    pub number: u64,
    pub hash: [u8; 32],
}

/// Build the canonical event id.
///
/// Zero-padded so that lexicographic order matches chain order; the hash
/// prefix disambiguates ids across forks of the same height.
pub fn event_id(block_number: u64, index: u32, block_hash: &[u8; 32]) -> String {
    format!(
        "{:010}-{:06}-{}",
        block_number,
        index,
        &hex::encode(&block_hash[..3])[..5]
    )
}

/// Port trait for the block data source.
///
/// Only finalized blocks are ever delivered, so batches never need to be
/// rolled back.
#[async_trait]
pub trait BlockSource: Send + Sync {
    /// Get the genesis hash of the connected chain.
    async fn genesis_hash(&self) -> ChainResult<BlockHash>;

    /// Get the current finalized block head.
    async fn finalized_head(&self) -> ChainResult<FinalizedHead>;

    /// Fetch up to `limit` consecutive finalized blocks starting at `from`.
    ///
    /// Returns an empty batch when `from` is beyond the finalized head.
    async fn fetch_batch(&self, from: u64, limit: u32) -> ChainResult<Vec<RawBlock>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_ids_sort_in_chain_order() {
        let hash = [0xab; 32];
        let mut ids = vec![
            event_id(10, 2, &hash),
            event_id(9, 100, &hash),
            event_id(10, 11, &hash),
            event_id(100, 0, &hash),
        ];
        ids.sort();
        assert_eq!(
            ids,
            vec![
                "0000000009-000100-ababa",
                "0000000010-000002-ababa",
                "0000000010-000011-ababa",
                "0000000100-000000-ababa",
            ]
        );
    }
}
