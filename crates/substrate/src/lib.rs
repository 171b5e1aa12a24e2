//! Substrate RPC adapter for the Tally indexer.
//!
//! This crate implements the [`BlockSource`] port from `tally-core`,
//! serving ordered batches of finalized blocks over WebSocket RPC.
//!
//! # Features
//!
//! - Block resolution by number up to the finalized head
//! - Runtime `spec_version` lookup per block
//! - Event decoding with each block's own runtime metadata, cached per version
//! - SCALE to JSON conversion for event payloads
//! - Timestamp read from `Timestamp.Now` storage
//!
//! # Usage
//!
//! ```ignore
//! use tally_substrate::{SubstrateClient, SubstrateClientConfig};
//!
//! let config = SubstrateClientConfig {
//!     ws_url: "ws://localhost:9944".to_string(),
//!     ..Default::default()
//! };
//!
//! let client = SubstrateClient::connect(config).await?;
//! let genesis = client.genesis_hash().await?;
//! let blocks = client.fetch_batch(1, 100).await?;
//! ```
//!
//! # Limitations
//!
//! Only runtimes exposing metadata V14 or later can be decoded. Blocks from
//! older runtimes fail with `ChainError::UnsupportedRuntime`, which stops the
//! pipeline; set `START_BLOCK` past the upgrade to skip them.
//!
//! [`BlockSource`]: tally_core::ports::BlockSource

mod client;

pub use client::{SubstrateClient, SubstrateClientConfig};
