use crate::core::MintReceipt;
use crate::error::Result;
use crate::ledger::{PendingTx, SignedCall};

/// RPC surface of a ledger node
pub trait LedgerNode: Send + Sync {
    /// Submit a signed call to the network
    fn broadcast(&self, signed: SignedCall) -> Result<PendingTx>;

    /// `Ok(None)` while the transaction is not yet confirmed
    fn receipt(&self, tx_hash: &str) -> Result<Option<MintReceipt>>;
}
