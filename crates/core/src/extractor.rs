//! Batch extraction of normalized transfers from raw blocks.

use tracing::{debug, trace};

use crate::address::Ss58Codec;
use crate::decoder::TransferDecoder;
use crate::error::DomainResult;
use crate::metrics::record_decode_error;
use crate::models::TransferEvent;
use crate::ports::RawBlock;

/// Turns an ordered batch of blocks into ordered [`TransferEvent`]s.
pub struct BatchExtractor {
    codec: Ss58Codec,
    decoder: TransferDecoder,
    event_name: String,
}

impl BatchExtractor {
    /// Build an extractor for `network` that tracks events named `event_name`.
    pub fn new(network: &str, event_name: impl Into<String>) -> DomainResult<Self> {
        Ok(Self {
            codec: Ss58Codec::for_network(network)?,
            decoder: TransferDecoder::for_network(network)?,
            event_name: event_name.into(),
        })
    }

    /// Extract every tracked event of the batch, in block order then in-block order.
    ///
    /// The first event that fails to decode aborts the whole batch.
    pub fn extract(&self, blocks: &[RawBlock]) -> DomainResult<Vec<TransferEvent>> {
        let mut transfers = Vec::new();

        for block in blocks {
            for event in block.events.iter().filter(|e| e.name == self.event_name) {
                let decoded = self.decoder.decode(event).inspect_err(|_| {
                    record_decode_error(&self.decoder.select(event.spec_version).version.to_string());
                })?;

                trace!(event = %event.id, amount = decoded.amount, "Transfer decoded");
                transfers.push(TransferEvent {
                    id: event.id.clone(),
                    block_number: block.number,
                    from: self.codec.encode(decoded.from.as_bytes())?,
                    to: self.codec.encode(decoded.to.as_bytes())?,
                    amount: decoded.amount,
                    timestamp: block.timestamp,
                });
            }
        }

        debug!(
            blocks = blocks.len(),
            transfers = transfers.len(),
            "Batch extracted"
        );
        Ok(transfers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::DomainError;
    use crate::ports::RawEvent;
    use serde_json::{Value, json};

    fn account_hex(byte: u8) -> String {
        format!("0x{}", hex::encode([byte; 32]))
    }

    fn raw_event(id: &str, name: &str, payload: Value) -> RawEvent {
        RawEvent {
            id: id.into(),
            name: name.into(),
            spec_version: 9430,
            payload,
        }
    }

    fn transfer(id: &str, from: u8, to: u8, amount: u64) -> RawEvent {
        raw_event(
            id,
            "Balances.Transfer",
            json!({"from": account_hex(from), "to": account_hex(to), "amount": amount}),
        )
    }

    fn block(number: u64, timestamp: u64, events: Vec<RawEvent>) -> RawBlock {
        RawBlock {
            number,
            hash: [number as u8; 32],
            timestamp,
            events,
        }
    }

    #[test]
    fn test_end_to_end_example() {
        let extractor = BatchExtractor::new("kusama", "Transfer").unwrap();
        let codec = Ss58Codec::for_network("kusama").unwrap();
        let blocks = vec![block(
            1,
            1000,
            vec![
                raw_event(
                    "evt-1",
                    "Transfer",
                    json!({"from": account_hex(1), "to": account_hex(2), "amount": 50}),
                ),
                raw_event("evt-2", "Other", json!({"anything": true})),
            ],
        )];

        let transfers = extractor.extract(&blocks).unwrap();
        assert_eq!(
            transfers,
            vec![TransferEvent {
                id: "evt-1".into(),
                block_number: 1,
                from: codec.encode(&[1; 32]).unwrap(),
                to: codec.encode(&[2; 32]).unwrap(),
                amount: 50,
                timestamp: 1000,
            }]
        );
    }

    // Test critique: l'ordre de sortie suit les blocs puis l'ordre intra-bloc
    #[test]
    fn test_order_across_interleaved_blocks() {
        let extractor = BatchExtractor::new("polkadot", "Balances.Transfer").unwrap();
        let blocks = vec![
            block(
                10,
                1,
                vec![
                    transfer("a", 1, 2, 1),
                    raw_event("noise", "System.ExtrinsicSuccess", json!({})),
                    transfer("b", 2, 3, 2),
                ],
            ),
            block(11, 2, vec![]),
            block(
                12,
                3,
                vec![transfer("c", 3, 1, 3), transfer("d", 1, 1, 4)],
            ),
        ];

        let transfers = extractor.extract(&blocks).unwrap();
        let ids: Vec<_> = transfers.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids, vec!["a", "b", "c", "d"]);
        assert_eq!(transfers[2].block_number, 12);
        assert_eq!(transfers[2].timestamp, 3);
    }

    #[test]
    fn test_addresses_use_configured_network() {
        let extractor = BatchExtractor::new("polkadot", "Balances.Transfer").unwrap();
        let blocks = vec![block(1, 0, vec![transfer("a", 1, 2, 1)])];
        let transfers = extractor.extract(&blocks).unwrap();

        let polkadot = Ss58Codec::for_network("polkadot").unwrap();
        assert_eq!(polkadot.decode(transfers[0].from.as_str()).unwrap().0, [1; 32]);
        assert!(
            Ss58Codec::for_network("kusama")
                .unwrap()
                .decode(transfers[0].from.as_str())
                .is_err()
        );
    }

    #[test]
    fn test_launch_era_polkadot_transfer() {
        let extractor = BatchExtractor::new("polkadot", "Balances.Transfer").unwrap();
        let launch = RawEvent {
            spec_version: 25,
            ..raw_event(
                "x",
                "Balances.Transfer",
                json!([account_hex(1), account_hex(2), "100"]),
            )
        };
        let transfers = extractor.extract(&[block(1, 0, vec![launch])]).unwrap();
        assert_eq!(transfers[0].amount, 100);
    }

    #[test]
    fn test_codec_only_network_rejected() {
        // astar has an SS58 prefix but no tabled transfer history
        assert!(matches!(
            BatchExtractor::new("astar", "Balances.Transfer"),
            Err(DomainError::UnknownNetwork(_))
        ));
    }

    #[test]
    fn test_first_bad_event_aborts_batch() {
        let extractor = BatchExtractor::new("kusama", "Balances.Transfer").unwrap();
        let blocks = vec![block(
            1,
            0,
            vec![
                transfer("ok", 1, 2, 1),
                raw_event("broken", "Balances.Transfer", json!({"from": account_hex(1)})),
                transfer("never", 1, 2, 1),
            ],
        )];

        match extractor.extract(&blocks).unwrap_err() {
            DomainError::UnrecognizedEventShape(msg) => assert!(msg.contains("broken")),
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_network_rejected() {
        assert!(matches!(
            BatchExtractor::new("atlantis", "Balances.Transfer"),
            Err(DomainError::UnknownNetwork(_))
        ));
    }
}
