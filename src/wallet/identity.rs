use crate::core::Address;
use crate::error::{Result, TraceError};
use crate::ledger::{ContractCall, PendingTx};
use std::sync::mpsc::Receiver;

/// Connection and account notifications
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WalletEvent {
    Connected(Address),
    AccountChanged(Address),
    NetworkChanged(u64),
    Disconnected,
}

/// The connected signing identity.
///
/// This is a single mutable external resource: callers re-read the address
/// before every signing step instead of caching it across a suspension point.
pub trait WalletIdentityProvider: Send + Sync {
    fn current_address(&self) -> Option<Address>;

    fn network_id(&self) -> Option<u64>;

    /// Prompt for a signature and broadcast the signed call
    fn sign_and_send(&self, call: &ContractCall) -> Result<PendingTx>;

    fn subscribe(&self) -> Receiver<WalletEvent>;
}

/// Fresh read of the signer, checking the network when one is configured
pub fn require_signer(
    wallet: &dyn WalletIdentityProvider,
    expected_network: Option<u64>,
) -> Result<Address> {
    let address = wallet.current_address().ok_or(TraceError::WalletNotConnected)?;
    if let Some(expected) = expected_network {
        match wallet.network_id() {
            Some(actual) if actual == expected => {}
            Some(actual) => return Err(TraceError::NetworkMismatch { expected, actual }),
            None => return Err(TraceError::WalletNotConnected),
        }
    }
    Ok(address)
}
