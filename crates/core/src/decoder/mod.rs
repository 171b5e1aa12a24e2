//! Multi-version decoder for `Balances.Transfer`.
//!
//! The transfer payload changed shape twice over Kusama's history:
//!
//! | version | runtimes          | payload                          |
//! |---------|-------------------|----------------------------------|
//! | V1020   | `< 1050`          | `[from, to, amount, fee]`        |
//! | V1050   | `1050 ..< 9130`   | `[from, to, amount]`             |
//! | V9130   | `>= 9130`         | `{ from, to, amount }`           |
//!
//! Runtime numbers are per chain, so each network carries its own table.
//! Polkadot launched after the fee field was dropped and never released a
//! runtime between 9130 and 9139; its table has no V1020 rule.
//!
//! Rules are tried oldest first and the newest schema is the fallback.
//! The order is load-bearing: an older payload handed to a newer parser
//! would be misread rather than rejected.

pub mod fields;

use serde_json::Value;

use crate::error::{DomainError, DomainResult};
use crate::models::AccountId;
use crate::ports::RawEvent;

use fields::{extract_field, parse_account, parse_amount};

/// Canonical content of a transfer, before address encoding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecodedTransfer {
    pub from: AccountId,
    pub to: AccountId,
    pub amount: u128,
}

/// Known payload schemas, oldest first.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferVersion {
    V1020,
    V1050,
    V9130,
}

impl std::fmt::Display for TransferVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            TransferVersion::V1020 => "V1020",
            TransferVersion::V1050 => "V1050",
            TransferVersion::V9130 => "V9130",
        };
        f.write_str(name)
    }
}

/// One `(predicate, parser)` pair of the dispatch table.
#[derive(Clone, Copy)]
pub struct VersionRule {
    pub version: TransferVersion,
    matches: fn(u32) -> bool,
    parse: fn(&Value) -> Option<DecodedTransfer>,
}

const V1020: VersionRule = VersionRule {
    version: TransferVersion::V1020,
    matches: before_1050,
    parse: parse_v1020,
};

const V1050: VersionRule = VersionRule {
    version: TransferVersion::V1050,
    matches: before_9130,
    parse: parse_v1050,
};

const V9130: VersionRule = VersionRule {
    version: TransferVersion::V9130,
    matches: any_version,
    parse: parse_v9130,
};

fn before_1050(spec_version: u32) -> bool {
    spec_version < 1050
}

fn before_9130(spec_version: u32) -> bool {
    spec_version < 9130
}

fn any_version(_: u32) -> bool {
    true
}

const KUSAMA_RULES: &[VersionRule] = &[V1020, V1050];
const POLKADOT_RULES: &[VersionRule] = &[V1050];

/// Decoder for transfer events across the runtime history of one chain.
pub struct TransferDecoder {
    rules: &'static [VersionRule],
    fallback: VersionRule,
}

impl TransferDecoder {
    /// Decoder following the transfer history of `network`.
    ///
    /// Fails with [`DomainError::UnknownNetwork`] for networks whose
    /// runtime history is not tabled.
    pub fn for_network(network: &str) -> DomainResult<Self> {
        let rules = match network.to_ascii_lowercase().as_str() {
            "kusama" => KUSAMA_RULES,
            "polkadot" => POLKADOT_RULES,
            other => {
                return Err(DomainError::UnknownNetwork(format!(
                    "{} has no transfer event history",
                    other
                )));
            }
        };
        Ok(Self {
            rules,
            fallback: V9130,
        })
    }

    /// Pick the rule for a runtime version: first match wins, else fallback.
    pub fn select(&self, spec_version: u32) -> &VersionRule {
        self.rules
            .iter()
            .find(|rule| (rule.matches)(spec_version))
            .unwrap_or(&self.fallback)
    }

    /// Decode one raw transfer event into its canonical triple.
    pub fn decode(&self, event: &RawEvent) -> DomainResult<DecodedTransfer> {
        let rule = self.select(event.spec_version);
        (rule.parse)(&event.payload).ok_or_else(|| {
            DomainError::UnrecognizedEventShape(format!(
                "event {} (spec {}) does not match {} schema: {}",
                event.id, event.spec_version, rule.version, event.payload
            ))
        })
    }
}

/// `Transfer(AccountId, AccountId, Balance, Balance)`; the trailing fee is ignored.
fn parse_v1020(payload: &Value) -> Option<DecodedTransfer> {
    let fields = payload.as_array().filter(|a| a.len() == 4)?;
    positional(fields)
}

/// `Transfer(AccountId, AccountId, Balance)`.
fn parse_v1050(payload: &Value) -> Option<DecodedTransfer> {
    let fields = payload.as_array().filter(|a| a.len() == 3)?;
    positional(fields)
}

/// `Transfer { from, to, amount }`.
fn parse_v9130(payload: &Value) -> Option<DecodedTransfer> {
    Some(DecodedTransfer {
        from: extract_field(payload, &["from"], 0, parse_account)?,
        to: extract_field(payload, &["to"], 1, parse_account)?,
        amount: extract_field(payload, &["amount"], 2, parse_amount)?,
    })
}

fn positional(fields: &[Value]) -> Option<DecodedTransfer> {
    Some(DecodedTransfer {
        from: parse_account(&fields[0])?,
        to: parse_account(&fields[1])?,
        amount: parse_amount(&fields[2])?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn account_hex(byte: u8) -> String {
        format!("0x{}", hex::encode([byte; 32]))
    }

    fn event(spec_version: u32, payload: Value) -> RawEvent {
        RawEvent {
            id: "0000000001-000000-00000".into(),
            name: "Balances.Transfer".into(),
            spec_version,
            payload,
        }
    }

    fn kusama() -> TransferDecoder {
        TransferDecoder::for_network("kusama").unwrap()
    }

    fn polkadot() -> TransferDecoder {
        TransferDecoder::for_network("polkadot").unwrap()
    }

    fn expected(amount: u128) -> DecodedTransfer {
        DecodedTransfer {
            from: AccountId([1; 32]),
            to: AccountId([2; 32]),
            amount,
        }
    }

    // Test critique: chaque version sélectionne la règle la plus ancienne applicable
    #[test]
    fn test_dispatch_order() {
        let decoder = kusama();
        let cases = [
            (0, TransferVersion::V1020),
            (1020, TransferVersion::V1020),
            (1049, TransferVersion::V1020),
            (1050, TransferVersion::V1050),
            (2030, TransferVersion::V1050),
            (9129, TransferVersion::V1050),
            (9130, TransferVersion::V9130),
            (1_000_000, TransferVersion::V9130),
        ];
        for (runtime, version) in cases {
            assert_eq!(decoder.select(runtime).version, version, "runtime {}", runtime);
        }
    }

    #[test]
    fn test_decode_each_version() {
        let decoder = kusama();

        let v1020 = event(1020, json!([account_hex(1), account_hex(2), "500", "10"]));
        assert_eq!(decoder.decode(&v1020).unwrap(), expected(500));

        let v1050 = event(2000, json!([account_hex(1), account_hex(2), 700]));
        assert_eq!(decoder.decode(&v1050).unwrap(), expected(700));

        let v9130 = event(9430, json!({"from": account_hex(1), "to": account_hex(2), "amount": "900"}));
        assert_eq!(decoder.decode(&v9130).unwrap(), expected(900));
    }

    // Un payload ancien ne doit jamais être lu par le parseur récent
    #[test]
    fn test_old_shape_is_not_misread_by_newer_rule() {
        let decoder = kusama();
        // V1020 payload carries a fee in slot 3; under V1050 it must fail, not drop the fee.
        let four_fields = json!([account_hex(1), account_hex(2), "500", "10"]);
        assert!(decoder.decode(&event(1050, four_fields.clone())).is_err());
        assert!(decoder.decode(&event(1020, four_fields)).is_ok());
    }

    #[test]
    fn test_malformed_fallback_payload() {
        let decoder = kusama();
        let err = decoder
            .decode(&event(9130, json!({"from": account_hex(1), "amount": "1"})))
            .unwrap_err();
        match err {
            DomainError::UnrecognizedEventShape(msg) => {
                assert!(msg.contains("V9130"));
                assert!(msg.contains("0000000001-000000-00000"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_fallback_accepts_wrapped_accounts() {
        let decoder = kusama();
        let payload = json!({"from": {"Id": account_hex(1)}, "to": [account_hex(2)], "amount": 42});
        assert_eq!(decoder.decode(&event(9430, payload)).unwrap(), expected(42));
    }

    // Test critique: les numéros de runtime de Polkadot ne suivent pas ceux de Kusama
    #[test]
    fn test_polkadot_history() {
        let decoder = polkadot();
        assert_eq!(decoder.select(0).version, TransferVersion::V1050);
        assert_eq!(decoder.select(25).version, TransferVersion::V1050);
        assert_eq!(decoder.select(9140).version, TransferVersion::V9130);

        let launch = event(25, json!([account_hex(1), account_hex(2), "100"]));
        assert_eq!(decoder.decode(&launch).unwrap(), expected(100));

        let named = event(9140, json!({"from": account_hex(1), "to": account_hex(2), "amount": "3"}));
        assert_eq!(decoder.decode(&named).unwrap(), expected(3));

        // Polkadot never emitted the four-field shape
        let four_fields = event(25, json!([account_hex(1), account_hex(2), "100", "1"]));
        assert!(decoder.decode(&four_fields).is_err());
    }

    #[test]
    fn test_network_without_history_rejected() {
        assert!(matches!(
            TransferDecoder::for_network("astar"),
            Err(DomainError::UnknownNetwork(msg)) if msg.contains("astar")
        ));
    }
}
