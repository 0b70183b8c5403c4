//! Ledger-tracked unique identifiers
//!
//! Identifiers are the contract's `uint256` values, so ordering is always
//! numeric, never lexical, and anything past 2^256 - 1 is rejected.

use crate::error::{Result, TraceError};
use crate::utils::strip_hex_prefix;
use alloy_primitives::U256;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TokenId(U256);

impl TokenId {
    pub fn zero() -> TokenId {
        TokenId(U256::ZERO)
    }

    pub fn is_zero(&self) -> bool {
        self.0.is_zero()
    }

    /// The following identifier, or `None` at the top of the `uint256` range
    pub fn next(&self) -> Option<TokenId> {
        self.0.checked_add(U256::from(1u64)).map(TokenId)
    }

    pub fn as_u256(&self) -> U256 {
        self.0
    }

    /// Strict parse of a decimal string (the serialized form)
    pub fn from_decimal(raw: &str) -> Result<TokenId> {
        if raw.is_empty() || !raw.bytes().all(|b| b.is_ascii_digit()) {
            return Err(TokenId::invalid(raw));
        }
        U256::from_str_radix(raw, 10)
            .map(TokenId)
            .map_err(|_| TokenId::invalid(raw))
    }

    /// Strict parse of user input: `0x`-prefixed hex or plain decimal.
    ///
    /// Unprefixed input made only of digits is read as decimal; unprefixed
    /// input containing `a-f` is read as hex.
    pub fn parse_strict(raw: &str) -> Result<TokenId> {
        let trimmed = raw.trim();
        let has_prefix = trimmed.starts_with("0x") || trimmed.starts_with("0X");
        let digits = strip_hex_prefix(trimmed);
        if digits.is_empty() {
            return Err(TokenId::invalid(raw));
        }
        if !has_prefix && digits.bytes().all(|b| b.is_ascii_digit()) {
            return TokenId::from_decimal(digits);
        }
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(TokenId::invalid(raw));
        }
        U256::from_str_radix(digits, 16)
            .map(TokenId)
            .map_err(|_| TokenId::invalid(raw))
    }

    /// Lenient parse for direct user input: anything unparseable becomes the
    /// zero identifier and is logged.
    pub fn parse_user_input(raw: &str) -> TokenId {
        match TokenId::parse_strict(raw) {
            Ok(id) => id,
            Err(e) => {
                log::warn!("Mapping unparseable token id input to zero: {e}");
                TokenId::zero()
            }
        }
    }

    fn invalid(raw: &str) -> TraceError {
        TraceError::Validation(format!(
            "Token id '{raw}' is not a hexadecimal or decimal uint256"
        ))
    }
}

impl From<u64> for TokenId {
    fn from(value: u64) -> Self {
        TokenId(U256::from(value))
    }
}

impl From<U256> for TokenId {
    fn from(value: U256) -> Self {
        TokenId(value)
    }
}

impl FromStr for TokenId {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self> {
        TokenId::parse_strict(s)
    }
}

impl fmt::Display for TokenId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for TokenId {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.0.to_string())
    }
}

impl<'de> Deserialize<'de> for TokenId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        TokenId::from_decimal(&raw).map_err(serde::de::Error::custom)
    }
}
