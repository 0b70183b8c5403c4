// JSON helpers for the sled-backed stores
use crate::error::{Result, TraceError};
use serde::de::DeserializeOwned;
use serde::Serialize;

/// Serialize a record for storage
pub fn serialize<T: Serialize>(data: &T) -> Result<Vec<u8>> {
    serde_json::to_vec(data)
        .map_err(|e| TraceError::Serialization(format!("Serialization failed: {e}")))
}

/// Deserialize a stored record
pub fn deserialize<T: DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes)
        .map_err(|e| TraceError::Serialization(format!("Deserialization failed: {e}")))
}

/// Stable byte form of a JSON document: object keys sorted, no whitespace.
///
/// `serde_json::Value` keeps maps in a `BTreeMap` unless `preserve_order` is on,
/// so writing the value back out is already canonical.
pub fn canonical_json(value: &serde_json::Value) -> Result<Vec<u8>> {
    serialize(value)
}
