//! Signed 128-bit ledger balance.
//!
//! Transfer-derived balances go negative whenever an account spends funds
//! that reached it through something other than a transfer (genesis
//! endowment, staking rewards). The magnitude keeps the full `u128` range of
//! on-chain amounts; every operation is checked and never wraps.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Sign-and-magnitude balance. Zero is always non-negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(into = "String", try_from = "String")]
pub struct Balance {
    negative: bool,
    magnitude: u128,
}

impl Balance {
    pub const ZERO: Balance = Balance {
        negative: false,
        magnitude: 0,
    };

    fn signed(negative: bool, magnitude: u128) -> Self {
        Self {
            negative: negative && magnitude != 0,
            magnitude,
        }
    }

    pub fn is_negative(&self) -> bool {
        self.negative
    }

    pub fn magnitude(&self) -> u128 {
        self.magnitude
    }

    /// Credit `amount`. Returns `None` on overflow.
    pub fn checked_add(self, amount: u128) -> Option<Self> {
        if !self.negative {
            return self.magnitude.checked_add(amount).map(|m| Self::signed(false, m));
        }
        if amount >= self.magnitude {
            Some(Self::signed(false, amount - self.magnitude))
        } else {
            Some(Self::signed(true, self.magnitude - amount))
        }
    }

    /// Debit `amount`. Returns `None` on overflow.
    pub fn checked_sub(self, amount: u128) -> Option<Self> {
        if self.negative {
            return self.magnitude.checked_add(amount).map(|m| Self::signed(true, m));
        }
        if self.magnitude >= amount {
            Some(Self::signed(false, self.magnitude - amount))
        } else {
            Some(Self::signed(true, amount - self.magnitude))
        }
    }
}

impl From<u128> for Balance {
    fn from(value: u128) -> Self {
        Self::signed(false, value)
    }
}

impl fmt::Display for Balance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.negative {
            write!(f, "-{}", self.magnitude)
        } else {
            write!(f, "{}", self.magnitude)
        }
    }
}

impl FromStr for Balance {
    type Err = std::num::ParseIntError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.strip_prefix('-') {
            Some(digits) => Ok(Self::signed(true, digits.parse()?)),
            None => Ok(Self::signed(false, s.parse()?)),
        }
    }
}

impl From<Balance> for String {
    fn from(balance: Balance) -> Self {
        balance.to_string()
    }
}

impl TryFrom<String> for Balance {
    type Error = std::num::ParseIntError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debit_below_zero_goes_negative() {
        let b = Balance::from(30).checked_sub(50).unwrap();
        assert!(b.is_negative());
        assert_eq!(b.magnitude(), 20);
        assert_eq!(b.to_string(), "-20");
    }

    #[test]
    fn credit_back_to_positive() {
        let b = Balance::ZERO.checked_sub(50).unwrap().checked_add(80).unwrap();
        assert_eq!(b, Balance::from(30));
    }

    #[test]
    fn zero_is_never_negative() {
        let b = Balance::ZERO.checked_sub(7).unwrap().checked_add(7).unwrap();
        assert_eq!(b, Balance::ZERO);
        assert!(!b.is_negative());
        assert_eq!("-0".parse::<Balance>().unwrap(), Balance::ZERO);
    }

    // Test critique: pas de wraparound silencieux aux bornes u128
    #[test]
    fn overflow_is_reported() {
        assert!(Balance::from(u128::MAX).checked_add(1).is_none());
        let most_negative = Balance::ZERO.checked_sub(u128::MAX).unwrap();
        assert!(most_negative.checked_sub(1).is_none());
        assert_eq!(most_negative.checked_add(u128::MAX), Some(Balance::ZERO));
    }

    #[test]
    fn parse_and_display_roundtrip() {
        for text in ["0", "12345", "-987654321", "340282366920938463463374607431768211455"] {
            assert_eq!(text.parse::<Balance>().unwrap().to_string(), text);
        }
        assert!("12a".parse::<Balance>().is_err());
    }

    #[test]
    fn serializes_as_decimal_string() {
        let b = Balance::ZERO.checked_sub(5).unwrap();
        assert_eq!(serde_json::to_string(&b).unwrap(), "\"-5\"");
        let back: Balance = serde_json::from_str("\"-5\"").unwrap();
        assert_eq!(back, b);
    }
}
