use crate::error::{Result, TraceError};
use crate::utils::{strip_hex_prefix, to_hex_prefixed};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

pub const ADDRESS_LEN: usize = 20;

/// A 20-byte account address. Parsing is case-insensitive and never checks an
/// EIP-55 checksum, so two addresses compare equal whenever their hex forms
/// match ignoring case. Displayed as lowercase hex.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Address(alloy_primitives::Address);

impl Address {
    pub const ZERO: Address = Address(alloy_primitives::Address::ZERO);

    pub fn parse(raw: &str) -> Result<Address> {
        let digits = strip_hex_prefix(raw.trim());
        if digits.len() != ADDRESS_LEN * 2 {
            return Err(TraceError::Decode(format!(
                "Address '{raw}' must be {} hex digits",
                ADDRESS_LEN * 2
            )));
        }
        alloy_primitives::Address::from_str(digits)
            .map(Address)
            .map_err(|e| TraceError::Decode(format!("Invalid address '{raw}': {e}")))
    }

    /// Takes the trailing 20 bytes; shorter input is left-padded with zeros
    pub fn from_slice(bytes: &[u8]) -> Address {
        let mut out = [0u8; ADDRESS_LEN];
        if bytes.len() >= ADDRESS_LEN {
            out.copy_from_slice(&bytes[bytes.len() - ADDRESS_LEN..]);
        } else {
            out[ADDRESS_LEN - bytes.len()..].copy_from_slice(bytes);
        }
        Address(alloy_primitives::Address::from(out))
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.0.as_slice()
    }

    pub fn is_zero(&self) -> bool {
        self.0 == alloy_primitives::Address::ZERO
    }

    /// Case-insensitive comparison against a textual address
    pub fn matches(&self, raw: &str) -> bool {
        Address::parse(raw).map(|other| other == *self).unwrap_or(false)
    }
}

impl From<alloy_primitives::Address> for Address {
    fn from(address: alloy_primitives::Address) -> Self {
        Address(address)
    }
}

impl From<Address> for alloy_primitives::Address {
    fn from(address: Address) -> Self {
        address.0
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", to_hex_prefixed(self.as_bytes()))
    }
}

impl FromStr for Address {
    type Err = TraceError;

    fn from_str(s: &str) -> Result<Self> {
        Address::parse(s)
    }
}

impl Serialize for Address {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for Address {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Address::parse(&raw).map_err(serde::de::Error::custom)
    }
}
