//! SS58 address codec.
//!
//! Converts 32-byte raw account identifiers into network-scoped SS58 text
//! and back. The layout is `base58(prefix ‖ account ‖ checksum)` where the
//! prefix takes one byte below 64 and two bytes up to 16383, and the
//! checksum is the first two bytes of `blake2b-512("SS58PRE" ‖ prefix ‖ account)`.

use blake2::{Blake2b512, Digest};

use crate::error::{DomainError, DomainResult};
use crate::models::{AccountId, Address};

const CHECKSUM_PREAMBLE: &[u8] = b"SS58PRE";
const CHECKSUM_LEN: usize = 2;
const ACCOUNT_LEN: usize = 32;
const MAX_PREFIX: u16 = 0b0011_1111_1111_1111;

/// Named networks and their registered SS58 prefixes.
const KNOWN_NETWORKS: &[(&str, u16)] = &[
    ("polkadot", 0),
    ("kusama", 2),
    ("astar", 5),
    ("acala", 10),
    ("substrate", 42),
    ("westend", 42),
    ("rococo", 42),
    ("allfeat", 440),
];

/// Codec bound to one SS58 network prefix.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Ss58Codec {
    prefix: u16,
}

impl Ss58Codec {
    /// Resolve a network by name (case-insensitive) or bare decimal prefix.
    pub fn for_network(network: &str) -> DomainResult<Self> {
        let name = network.trim().to_ascii_lowercase();
        if let Some((_, prefix)) = KNOWN_NETWORKS.iter().find(|(n, _)| *n == name) {
            return Ok(Self { prefix: *prefix });
        }
        match name.parse::<u16>() {
            Ok(prefix) => Self::from_prefix(prefix),
            Err(_) => Err(DomainError::UnknownNetwork(network.to_string())),
        }
    }

    pub fn from_prefix(prefix: u16) -> DomainResult<Self> {
        if prefix > MAX_PREFIX {
            return Err(DomainError::UnknownNetwork(format!(
                "prefix {} exceeds {}",
                prefix, MAX_PREFIX
            )));
        }
        Ok(Self { prefix })
    }

    pub fn prefix(&self) -> u16 {
        self.prefix
    }

    /// Encode raw identifier bytes as an SS58 address.
    pub fn encode(&self, raw: &[u8]) -> DomainResult<Address> {
        if raw.len() != ACCOUNT_LEN {
            return Err(DomainError::InvalidIdentifierLength {
                expected: ACCOUNT_LEN,
                actual: raw.len(),
            });
        }

        let mut payload = prefix_bytes(self.prefix);
        payload.extend_from_slice(raw);
        let checksum = checksum(&payload);
        payload.extend_from_slice(&checksum);

        Ok(Address::new(bs58::encode(payload).into_string()))
    }

    /// Decode an SS58 address, requiring it to carry this codec's prefix.
    pub fn decode(&self, address: &str) -> DomainResult<AccountId> {
        let data = bs58::decode(address)
            .into_vec()
            .map_err(|e| DomainError::InvalidAddressFormat(format!("{}: {}", address, e)))?;

        let (prefix_len, prefix) = match data.first() {
            Some(&first @ 0..=63) => (1, u16::from(first)),
            Some(&first @ 64..=127) => {
                let second = *data.get(1).ok_or_else(|| {
                    DomainError::InvalidAddressFormat(format!("{}: truncated prefix", address))
                })?;
                let lower = (first << 2) | (second >> 6);
                let upper = second & 0b0011_1111;
                (2, u16::from(lower) | (u16::from(upper) << 8))
            }
            _ => {
                return Err(DomainError::InvalidAddressFormat(format!(
                    "{}: invalid prefix byte",
                    address
                )));
            }
        };

        if data.len() != prefix_len + ACCOUNT_LEN + CHECKSUM_LEN {
            return Err(DomainError::InvalidAddressFormat(format!(
                "{}: expected {} bytes, got {}",
                address,
                prefix_len + ACCOUNT_LEN + CHECKSUM_LEN,
                data.len()
            )));
        }

        let body_len = prefix_len + ACCOUNT_LEN;
        if checksum(&data[..body_len])[..] != data[body_len..] {
            return Err(DomainError::InvalidAddressFormat(format!(
                "{}: checksum mismatch",
                address
            )));
        }

        if prefix != self.prefix {
            return Err(DomainError::InvalidAddressFormat(format!(
                "{}: prefix {} does not match network prefix {}",
                address, prefix, self.prefix
            )));
        }

        let mut account = [0u8; ACCOUNT_LEN];
        account.copy_from_slice(&data[prefix_len..body_len]);
        Ok(AccountId(account))
    }
}

/// Encode `raw` under the named network.
pub fn encode(network: &str, raw: &[u8]) -> DomainResult<Address> {
    Ss58Codec::for_network(network)?.encode(raw)
}

/// Decode `address` under the named network.
pub fn decode(network: &str, address: &Address) -> DomainResult<AccountId> {
    Ss58Codec::for_network(network)?.decode(address.as_str())
}

fn prefix_bytes(prefix: u16) -> Vec<u8> {
    if prefix < 64 {
        vec![prefix as u8]
    } else {
        let first = (((prefix & 0b0000_0000_1111_1100) >> 2) as u8) | 0b0100_0000;
        let second = ((prefix >> 8) as u8) | (((prefix & 0b0000_0000_0000_0011) as u8) << 6);
        vec![first, second]
    }
}

fn checksum(body: &[u8]) -> [u8; CHECKSUM_LEN] {
    let mut hasher = Blake2b512::new();
    hasher.update(CHECKSUM_PREAMBLE);
    hasher.update(body);
    let digest = hasher.finalize();
    [digest[0], digest[1]]
}
