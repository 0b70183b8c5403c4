//! Wallet identity and key management
//!
//! The orchestrators depend only on the [`WalletIdentityProvider`] trait.
//! `LocalWallet` and `Wallets` back it with locally generated ECDSA keys.

pub mod identity;
pub mod keys;
pub mod local;
pub mod wallets;

pub use crate::core::Address;
pub use identity::{require_signer, WalletEvent, WalletIdentityProvider};
pub use keys::{address_from_public_key, WalletKeys};
pub use local::LocalWallet;
pub use wallets::{Wallets, WALLET_FILE};
