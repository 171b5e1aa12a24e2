//! Substrate RPC client decoding each block with its own runtime metadata.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::{StreamExt, TryStreamExt, stream};
use subxt::backend::legacy::rpc_methods::{LegacyRpcMethods, NumberOrHex};
use subxt::backend::rpc::RpcClient;
use subxt::config::Header;
use subxt::events::Events;
use subxt::ext::codec::Decode;
use subxt::utils::H256;
use subxt::{Metadata, OnlineClient, PolkadotConfig};
use tokio::sync::RwLock;
use tracing::{debug, instrument, trace};

use tally_core::error::{ChainError, ChainResult};
use tally_core::models::BlockHash;
use tally_core::ports::{BlockSource, FinalizedHead, RawBlock, RawEvent, event_id};

/// `twox128("System") ++ twox128("Events")`
const SYSTEM_EVENTS_KEY: [u8; 32] = [
    0x26, 0xaa, 0x39, 0x4e, 0xea, 0x56, 0x30, 0xe0,
    0x7c, 0x48, 0xae, 0x0c, 0x95, 0x58, 0xce, 0xf7,
    0x80, 0xd4, 0x1e, 0x5e, 0x16, 0x05, 0x67, 0x65,
    0xbc, 0x84, 0x61, 0x85, 0x10, 0x72, 0xc9, 0xd7,
];

/// `twox128("Timestamp") ++ twox128("Now")`
const TIMESTAMP_NOW_KEY: [u8; 32] = [
    0xf0, 0xc3, 0x65, 0xc3, 0xcf, 0x59, 0xd6, 0x71,
    0xeb, 0x72, 0xda, 0x0e, 0x7a, 0x41, 0x13, 0xc4,
    0x9f, 0x1f, 0x05, 0x15, 0xf4, 0x62, 0xcd, 0xcf,
    0x84, 0xe0, 0xf1, 0xd6, 0x04, 0x5d, 0xfc, 0xbb,
];

/// Configuration for the Substrate client.
#[derive(Debug, Clone)]
pub struct SubstrateClientConfig {
    /// WebSocket URL (e.g., "ws://localhost:9944").
    pub ws_url: String,
    /// Number of blocks fetched concurrently within one batch.
    pub fetch_concurrency: usize,
}

impl Default for SubstrateClientConfig {
    fn default() -> Self {
        Self {
            ws_url: "ws://127.0.0.1:9944".to_string(),
            fetch_concurrency: 8,
        }
    }
}

/// Substrate client adapter implementing the BlockSource port.
///
/// Block hashes, runtime versions and raw storage are read through the
/// legacy RPC methods, which serve any historical block on an archive node.
/// Events are decoded with the metadata of the runtime that produced the
/// block, cached per `spec_version`.
pub struct SubstrateClient {
    client: OnlineClient<PolkadotConfig>,
    rpc: LegacyRpcMethods<PolkadotConfig>,
    metadata: RwLock<HashMap<u32, Metadata>>,
    fetch_concurrency: usize,
}

impl SubstrateClient {
    /// Connect to a Substrate node.
    #[instrument(skip_all, fields(url = %config.ws_url))]
    pub async fn connect(config: SubstrateClientConfig) -> ChainResult<Self> {
        debug!("Connecting to node");

        let rpc_client = RpcClient::from_url(&config.ws_url)
            .await
            .map_err(|e| ChainError::ConnectionFailed(e.to_string()))?;
        let rpc = LegacyRpcMethods::<PolkadotConfig>::new(rpc_client.clone());
        let client = OnlineClient::<PolkadotConfig>::from_rpc_client(rpc_client)
            .await
            .map_err(|e| ChainError::ConnectionFailed(e.to_string()))?;

        let spec_version = client.runtime_version().spec_version;
        debug!(spec_version, "Connected successfully");

        let metadata = HashMap::from([(spec_version, client.metadata())]);
        Ok(Self {
            client,
            rpc,
            metadata: RwLock::new(metadata),
            fetch_concurrency: config.fetch_concurrency.max(1),
        })
    }

    /// Fetch and decode one finalized block by number.
    #[instrument(skip(self))]
    async fn fetch_block(&self, number: u64) -> ChainResult<RawBlock> {
        let hash = self
            .rpc
            .chain_get_block_hash(Some(NumberOrHex::Number(number)))
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?
            .ok_or_else(|| ChainError::BlockFetchError {
                number,
                message: "no block hash for this height".to_string(),
            })?;

        let runtime = self
            .rpc
            .state_get_runtime_version(Some(hash))
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?;
        let metadata = self.metadata_at(runtime.spec_version, hash).await?;

        let event_bytes = self
            .storage_at(&SYSTEM_EVENTS_KEY, hash, number)
            .await?
            .unwrap_or_default();
        let events = decode_events(event_bytes, metadata, number, &hash, runtime.spec_version)?;

        let timestamp = self
            .storage_at(&TIMESTAMP_NOW_KEY, hash, number)
            .await?
            .and_then(|bytes| decode_timestamp(&bytes))
            .unwrap_or_else(|| {
                trace!(block = number, "Block has no Timestamp.Now");
                0
            });

        Ok(RawBlock {
            number,
            hash: hash.0,
            timestamp,
            events,
        })
    }

    /// Metadata of runtime `spec_version`, read at `hash` on first use.
    ///
    /// Runtimes older than metadata V14 carry no type registry and cannot be
    /// decoded dynamically.
    async fn metadata_at(&self, spec_version: u32, hash: H256) -> ChainResult<Metadata> {
        if let Some(metadata) = self.metadata.read().await.get(&spec_version) {
            return Ok(metadata.clone());
        }

        let raw = self
            .rpc
            .state_get_metadata(Some(hash))
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?
            .into_raw();
        let metadata =
            Metadata::decode(&mut &raw[..]).map_err(|e| ChainError::UnsupportedRuntime {
                spec_version,
                reason: format!("metadata cannot be decoded (V14 or later required): {}", e),
            })?;

        debug!(spec_version, "Runtime metadata cached");
        self.metadata
            .write()
            .await
            .insert(spec_version, metadata.clone());
        Ok(metadata)
    }

    async fn storage_at(&self, key: &[u8], hash: H256, number: u64) -> ChainResult<Option<Vec<u8>>> {
        self.rpc
            .state_get_storage(key, Some(hash))
            .await
            .map_err(|e| ChainError::BlockFetchError {
                number,
                message: e.to_string(),
            })
    }
}

#[async_trait]
impl BlockSource for SubstrateClient {
    async fn genesis_hash(&self) -> ChainResult<BlockHash> {
        let hash = self.client.genesis_hash();
        Ok(BlockHash(hash.0))
    }

    async fn finalized_head(&self) -> ChainResult<FinalizedHead> {
        let hash = self
            .rpc
            .chain_get_finalized_head()
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?;
        let header = self
            .rpc
            .chain_get_header(Some(hash))
            .await
            .map_err(|e| ChainError::RpcError(e.to_string()))?
            .ok_or_else(|| ChainError::RpcError("finalized head has no header".to_string()))?;

        Ok(FinalizedHead {
            number: header.number().into(),
            hash: hash.0,
        })
    }

    #[instrument(skip(self))]
    async fn fetch_batch(&self, from: u64, limit: u32) -> ChainResult<Vec<RawBlock>> {
        let head = self.finalized_head().await?;
        if from > head.number || limit == 0 {
            return Ok(Vec::new());
        }
        let to = head.number.min(from.saturating_add(limit as u64 - 1));
        trace!(from, to, head = head.number, "Fetching batch");

        // `buffered` keeps chain order while fetching ahead.
        stream::iter(from..=to)
            .map(|number| self.fetch_block(number))
            .buffered(self.fetch_concurrency)
            .try_collect()
            .await
    }
}

// =============================================================================
// Block decoding helpers
// =============================================================================

/// Decode the raw `System.Events` of a block into JSON payloads.
///
/// Any event that does not match the block's metadata fails the whole block:
/// decoding it again would fail the same way.
fn decode_events(
    event_bytes: Vec<u8>,
    metadata: Metadata,
    number: u64,
    hash: &H256,
    spec_version: u32,
) -> ChainResult<Vec<RawEvent>> {
    let events = Events::<PolkadotConfig>::decode_from(event_bytes, metadata);
    let mut raw_events = Vec::with_capacity(events.len() as usize);

    for (index, event) in events.iter().enumerate() {
        let ev = event.map_err(|e| undecodable(number, index, e))?;
        let payload = ev
            .field_values()
            .map_err(|e| undecodable(number, index, e))?;

        raw_events.push(RawEvent {
            id: event_id(number, index as u32, &hash.0),
            name: format!("{}.{}", ev.pallet_name(), ev.variant_name()),
            spec_version,
            payload: composite_to_json(&payload),
        });
    }

    Ok(raw_events)
}

fn undecodable(number: u64, index: usize, e: impl std::fmt::Display) -> ChainError {
    ChainError::MetadataError(format!("block {} event {}: {}", number, index, e))
}

/// `Timestamp.Now` is a plain SCALE `u64` of milliseconds.
fn decode_timestamp(bytes: &[u8]) -> Option<u64> {
    u64::decode(&mut &bytes[..]).ok()
}

// =============================================================================
// SCALE Value to JSON conversion
// =============================================================================

use subxt::ext::scale_value::{Composite, Primitive, Value, ValueDef};

/// Convert a Composite to a JSON value.
fn composite_to_json<T>(composite: &Composite<T>) -> serde_json::Value {
    match composite {
        Composite::Unnamed(values) => {
            if let Some(hex_str) = try_as_byte_array(values) {
                return serde_json::Value::String(hex_str);
            }
            // Newtype wrappers such as AccountId32([u8; 32])
            if values.len() == 1 {
                return value_to_json(&values[0]);
            }
            serde_json::Value::Array(values.iter().map(value_to_json).collect())
        }
        Composite::Named(fields) => serde_json::Value::Object(
            fields
                .iter()
                .map(|(name, v)| (name.clone(), value_to_json(v)))
                .collect(),
        ),
    }
}

/// Render a 32-byte unnamed composite (account id, hash) as hex.
fn try_as_byte_array<T>(values: &[Value<T>]) -> Option<String> {
    if values.len() != 32 {
        return None;
    }

    let bytes = values
        .iter()
        .map(|value| match &value.value {
            ValueDef::Primitive(Primitive::U128(n)) => u8::try_from(*n).ok(),
            _ => None,
        })
        .collect::<Option<Vec<u8>>>()?;

    Some(format!("0x{}", hex::encode(bytes)))
}

fn value_to_json<T>(value: &Value<T>) -> serde_json::Value {
    match &value.value {
        ValueDef::Composite(composite) => composite_to_json(composite),
        ValueDef::Variant(variant) => {
            let inner = composite_to_json(&variant.values);
            match variant.name.as_str() {
                "None" => serde_json::Value::Null,
                // `Some(x)` and `MultiAddress::Id(x)` collapse to `x`
                "Some" | "Id" => inner,
                name => {
                    let mut map = serde_json::Map::new();
                    map.insert(name.to_string(), inner);
                    serde_json::Value::Object(map)
                }
            }
        }
        ValueDef::Primitive(primitive) => primitive_to_json(primitive),
        ValueDef::BitSequence(bits) => serde_json::Value::String(format!("{:?}", bits)),
    }
}

fn primitive_to_json(primitive: &Primitive) -> serde_json::Value {
    match primitive {
        Primitive::Bool(b) => serde_json::Value::Bool(*b),
        Primitive::Char(c) => serde_json::Value::String(c.to_string()),
        Primitive::String(s) => serde_json::Value::String(s.clone()),
        // Balances exceed JSON's safe integer range
        Primitive::U128(n) => serde_json::Value::String(n.to_string()),
        Primitive::I128(n) => serde_json::Value::String(n.to_string()),
        Primitive::U256(n) => serde_json::Value::String(format!("{:?}", n)),
        Primitive::I256(n) => serde_json::Value::String(format!("{:?}", n)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn account(byte: u8) -> Value<()> {
        // AccountId32 is a newtype around [u8; 32]
        Value::unnamed_composite(vec![Value::unnamed_composite(
            (0..32).map(|_| Value::u128(byte as u128)),
        )])
    }

    #[test]
    fn test_storage_keys() {
        assert_eq!(
            hex::encode(SYSTEM_EVENTS_KEY),
            "26aa394eea5630e07c48ae0c9558cef780d41e5e16056765bc8461851072c9d7"
        );
        assert_eq!(
            hex::encode(TIMESTAMP_NOW_KEY),
            "f0c365c3cf59d671eb72da0e7a4113c49f1f0515f462cdcf84e0f1d6045dfcbb"
        );
    }

    #[test]
    fn test_decode_timestamp() {
        let millis: u64 = 1_733_097_600_000;
        assert_eq!(decode_timestamp(&millis.to_le_bytes()), Some(millis));
        assert_eq!(decode_timestamp(&[1, 2, 3]), None);
    }

    // Test critique: une métadonnée antérieure à V14 est un refus définitif
    #[test]
    fn test_pre_v14_metadata_is_rejected() {
        // "meta" magic followed by version 12
        let raw = [0x6d, 0x65, 0x74, 0x61, 12, 0];
        assert!(Metadata::decode(&mut &raw[..]).is_err());
    }

    #[test]
    fn test_named_transfer_to_json() {
        let fields = Composite::Named(vec![
            ("from".to_string(), account(1)),
            ("to".to_string(), account(2)),
            ("amount".to_string(), Value::u128(u128::MAX)),
        ]);

        assert_eq!(
            composite_to_json(&fields),
            json!({
                "from": format!("0x{}", "01".repeat(32)),
                "to": format!("0x{}", "02".repeat(32)),
                "amount": u128::MAX.to_string(),
            })
        );
    }

    #[test]
    fn test_positional_transfer_to_json() {
        let fields = Composite::Unnamed(vec![account(1), account(2), Value::u128(500), Value::u128(10)]);
        let json = composite_to_json(&fields);
        assert_eq!(json.as_array().map(Vec::len), Some(4));
        assert_eq!(json[2], json!("500"));
    }

    #[test]
    fn test_option_and_id_variants_collapse() {
        let some = Value::variant("Some", Composite::Unnamed(vec![Value::u128(7)]));
        assert_eq!(value_to_json(&some), json!("7"));

        let none = Value::variant("None", Composite::Unnamed(vec![]));
        assert_eq!(value_to_json(&none), serde_json::Value::Null);

        let other = Value::variant("Free", Composite::Unnamed(vec![Value::bool(true)]));
        assert_eq!(value_to_json(&other), json!({"Free": true}));
    }
}
