//! Shared helper functions for PostgreSQL row conversion.

use chrono::{DateTime, Utc};

use tally_core::error::{StorageError, StorageResult};
use tally_core::models::Balance;

/// Convert a `Vec<u8>` to a fixed-size 32-byte array.
///
/// Returns an error if the length doesn't match.
pub fn bytes_to_hash32(bytes: Vec<u8>, field_name: &str) -> StorageResult<[u8; 32]> {
    bytes.try_into().map_err(|v: Vec<u8>| {
        StorageError::SerializationError(format!(
            "{} has invalid length: expected 32, got {}",
            field_name,
            v.len()
        ))
    })
}

/// Parse a `NUMERIC::TEXT` column into a balance.
pub fn parse_balance(s: &str, field_name: &str) -> StorageResult<Balance> {
    s.parse().map_err(|e| {
        StorageError::SerializationError(format!("{} parse error: {} (value: {})", field_name, e, s))
    })
}

/// Convert a block timestamp in milliseconds to a `TIMESTAMPTZ` value.
pub fn millis_to_datetime(millis: u64) -> StorageResult<DateTime<Utc>> {
    i64::try_from(millis)
        .ok()
        .and_then(DateTime::from_timestamp_millis)
        .ok_or_else(|| {
            StorageError::SerializationError(format!("timestamp out of range: {}", millis))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    // Test critique: erreurs incluent le nom du champ pour debug
    #[test]
    fn test_error_includes_field_name() {
        let bad_bytes = vec![1u8; 16]; // mauvaise longueur
        let result = bytes_to_hash32(bad_bytes, "cursor.last_indexed_hash");
        let err = result.unwrap_err().to_string();
        assert!(err.contains("cursor.last_indexed_hash"));
        assert!(err.contains("expected 32"));
    }

    #[test]
    fn test_parse_negative_balance() {
        let balance = parse_balance("-340282366920938463463374607431768211455", "accounts.balance")
            .unwrap();
        assert!(balance.is_negative());
        assert_eq!(balance.magnitude(), u128::MAX);

        let err = parse_balance("12.5", "accounts.balance").unwrap_err();
        assert!(err.to_string().contains("accounts.balance"));
    }

    #[test]
    fn test_millis_to_datetime() {
        let dt = millis_to_datetime(1_700_000_000_123).unwrap();
        assert_eq!(dt.timestamp_millis(), 1_700_000_000_123);
        assert!(millis_to_datetime(u64::MAX).is_err());
    }
}
