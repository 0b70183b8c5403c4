use crate::config::Settings;
use crate::core::{Address, MintReceipt, TokenId};
use crate::error::{Result, TraceError};
use crate::ledger::{ContractCall, LedgerNode, PendingTx};
use crate::wallet::WalletIdentityProvider;
use crate::workflow::CancellationToken;
use log::{debug, info, warn};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Builds contract calls, hands them to the wallet for signing and waits for receipts
#[derive(Clone)]
pub struct LedgerClient {
    wallet: Arc<dyn WalletIdentityProvider>,
    node: Arc<dyn LedgerNode>,
    contract: Address,
    receipt_timeout: Duration,
    poll_interval: Duration,
}

impl LedgerClient {
    pub fn new(
        wallet: Arc<dyn WalletIdentityProvider>,
        node: Arc<dyn LedgerNode>,
        contract: Address,
    ) -> LedgerClient {
        let defaults = Settings::default();
        LedgerClient {
            wallet,
            node,
            contract,
            receipt_timeout: defaults.receipt_timeout(),
            poll_interval: defaults.receipt_poll_interval(),
        }
    }

    pub fn from_settings(
        wallet: Arc<dyn WalletIdentityProvider>,
        node: Arc<dyn LedgerNode>,
        settings: &Settings,
    ) -> Result<LedgerClient> {
        let contract = Address::parse(&settings.contract_address)?;
        Ok(LedgerClient::new(wallet, node, contract)
            .with_timeouts(settings.receipt_timeout(), settings.receipt_poll_interval()))
    }

    pub fn with_timeouts(mut self, receipt_timeout: Duration, poll_interval: Duration) -> Self {
        self.receipt_timeout = receipt_timeout;
        self.poll_interval = poll_interval;
        self
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    pub fn wallet(&self) -> &dyn WalletIdentityProvider {
        self.wallet.as_ref()
    }

    /// Mint `quantity` identifiers of supply one, all pointing at `token_uri`
    pub fn mint(&self, token_uri: &str, quantity: u64) -> Result<PendingTx> {
        let count = usize::try_from(quantity)
            .map_err(|_| TraceError::Validation(format!("Quantity {quantity} too large")))?;
        let call = ContractCall::MintBatch {
            contract: self.contract,
            token_uri: token_uri.to_string(),
            amounts: vec![1; count],
        };
        self.wallet.sign_and_send(&call)
    }

    /// Transfer `ids` from `from` to `to`.
    ///
    /// Aligned amounts select the batch call. Missing amounts, or amounts whose
    /// length differs from the ids, fall back to the single-identifier path.
    pub fn transfer(
        &self,
        from: Address,
        ids: &[TokenId],
        amounts: Option<&[u64]>,
        to: Address,
    ) -> Result<PendingTx> {
        let call = match amounts {
            Some(amounts) if amounts.len() == ids.len() => ContractCall::TransferBatch {
                contract: self.contract,
                from,
                to,
                ids: ids.to_vec(),
                amounts: amounts.to_vec(),
            },
            other => {
                if let Some(amounts) = other {
                    warn!(
                        "Transfer amounts ({}) not aligned with identifiers ({}); using single transfers",
                        amounts.len(),
                        ids.len()
                    );
                }
                ContractCall::TransferSingle {
                    contract: self.contract,
                    from,
                    to,
                    ids: ids.to_vec(),
                }
            }
        };
        self.wallet.sign_and_send(&call)
    }

    /// Poll the node until the receipt shows up, the timeout passes or the token is cancelled.
    ///
    /// Transport errors while polling are logged and polling continues.
    pub fn await_receipt(
        &self,
        pending: &PendingTx,
        cancel: Option<&CancellationToken>,
    ) -> Result<MintReceipt> {
        let deadline = Instant::now() + self.receipt_timeout;
        loop {
            if let Some(token) = cancel {
                token.check()?;
            }
            match self.node.receipt(&pending.tx_hash) {
                Ok(Some(receipt)) => {
                    info!(
                        "Transaction {} confirmed in block {}",
                        pending.tx_hash, receipt.block_number
                    );
                    return Ok(receipt);
                }
                Ok(None) => debug!("Transaction {} still pending", pending.tx_hash),
                Err(e) => warn!("Polling receipt for {} failed: {e}", pending.tx_hash),
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(TraceError::ConfirmationTimeout {
                    tx_hash: pending.tx_hash.clone(),
                });
            }
            thread::sleep(self.poll_interval.min(deadline - now));
        }
    }
}
