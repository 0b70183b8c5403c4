//! Utility functions and helpers
//!
//! Hashing, signing, hex and JSON helpers shared by the adapters.

pub mod crypto;
pub mod serialization;

pub use crypto::{
    base58_encode, current_timestamp, decode_hex, ecdsa_p256_sha256_sign_digest,
    ecdsa_p256_sha256_sign_verify, keccak256_digest, new_key_pair, sha256_digest,
    strip_hex_prefix, to_hex_prefixed,
};

pub use serialization::{canonical_json, deserialize, serialize};
