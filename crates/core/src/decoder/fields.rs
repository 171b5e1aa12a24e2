//! Field extraction from dynamically decoded event payloads.
//!
//! The block source renders SCALE values as JSON, and the exact rendering of
//! an account or an amount depends on the runtime metadata of the block:
//!
//! - accounts: `"0x.."` hex, `{ "Id": "0x.." }`, `["0x.."]`, or 32 raw bytes
//! - amounts: JSON numbers (u64 range) or decimal strings (full u128 range)

use serde_json::Value;

use crate::models::AccountId;

/// Extract a field by trying each key in order, then falling back to a position.
pub fn extract_field<T>(
    data: &Value,
    keys: &[&str],
    index: usize,
    parser: fn(&Value) -> Option<T>,
) -> Option<T> {
    keys.iter()
        .find_map(|key| data.get(*key))
        .or_else(|| data.get(index))
        .and_then(parser)
}

/// Parse a 32-byte account from any of its JSON renderings.
pub fn parse_account(value: &Value) -> Option<AccountId> {
    match value {
        Value::String(s) => AccountId::from_hex(s).ok(),
        Value::Object(obj) => obj.get("Id").or_else(|| obj.get("id")).and_then(parse_account),
        Value::Array(arr) if arr.len() == 1 => parse_account(&arr[0]),
        Value::Array(arr) if arr.len() == 32 => {
            let mut bytes = [0u8; 32];
            for (slot, v) in bytes.iter_mut().zip(arr) {
                *slot = u8::try_from(v.as_u64()?).ok()?;
            }
            Some(AccountId(bytes))
        }
        _ => None,
    }
}

/// Parse a u128 amount from a JSON number or decimal string.
pub fn parse_amount(value: &Value) -> Option<u128> {
    match value {
        Value::Number(n) => n.as_u64().map(u128::from),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}
