use crate::core::Address;
use crate::error::{Result, TraceError};
use crate::utils::keccak256_digest;
use data_encoding::HEXLOWER;
use ring::rand::SystemRandom;
use ring::signature::{EcdsaKeyPair, KeyPair, ECDSA_P256_SHA256_FIXED_SIGNING};
use serde::{Deserialize, Serialize};

/// A locally held signing key
#[derive(Clone, Serialize, Deserialize)]
pub struct WalletKeys {
    #[serde(with = "hex_bytes")]
    pkcs8: Vec<u8>,
    #[serde(with = "hex_bytes")]
    public_key: Vec<u8>,
}

impl WalletKeys {
    pub fn new() -> Result<WalletKeys> {
        let pkcs8 = crate::utils::new_key_pair()?;
        Self::from_pkcs8(pkcs8)
    }

    pub fn from_pkcs8(pkcs8: Vec<u8>) -> Result<WalletKeys> {
        let rng = SystemRandom::new();
        let key_pair =
            EcdsaKeyPair::from_pkcs8(&ECDSA_P256_SHA256_FIXED_SIGNING, pkcs8.as_ref(), &rng)
                .map_err(|e| {
                    TraceError::Decode(format!("Failed to create key pair from PKCS8: {e}"))
                })?;
        let public_key = key_pair.public_key().as_ref().to_vec();
        Ok(WalletKeys { pkcs8, public_key })
    }

    /// Last 20 bytes of keccak-256 over the uncompressed point without its tag byte
    pub fn address(&self) -> Address {
        address_from_public_key(&self.public_key)
    }

    pub fn public_key(&self) -> &[u8] {
        self.public_key.as_slice()
    }

    pub fn pkcs8(&self) -> &[u8] {
        self.pkcs8.as_slice()
    }
}

impl std::fmt::Debug for WalletKeys {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WalletKeys")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

pub fn address_from_public_key(public_key: &[u8]) -> Address {
    let point = public_key.strip_prefix(&[0x04u8]).unwrap_or(public_key);
    Address::from_slice(&keccak256_digest(point))
}

mod hex_bytes {
    use super::HEXLOWER;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&HEXLOWER.encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        HEXLOWER
            .decode(raw.as_bytes())
            .map_err(serde::de::Error::custom)
    }
}
