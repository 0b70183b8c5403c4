// This is where I re-attempt an on-chain transfer for an invoice whose first attempt failed
// The identifiers always come from the invoice itself and are never re-derived
// A retry that is already running for an invoice turns a second call into a no-op

use crate::core::{MintReceipt, TokenId, TransferInvoice};
use crate::error::{ChainOutcome, Result, Step, StepFailure, TraceError};
use crate::ledger::{LedgerClient, PendingTx};
use crate::storage::{PersistenceGateway, TransferSubmission};
use crate::wallet::require_signer;
use crate::workflow::CancellationToken;
use log::{error, info, warn};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryOutcome {
    Completed { record_id: String, tx_hash: String },
    /// Another retry for the same invoice was still running; nothing was done
    AlreadyInFlight,
}

pub struct TransferRetryWorkflow {
    ledger: LedgerClient,
    gateway: Arc<dyn PersistenceGateway>,
    expected_network: Option<u64>,
    in_flight: Mutex<HashSet<String>>,
}

// Releases the invoice id when the attempt ends, however it ends
struct InFlightGuard<'a> {
    in_flight: &'a Mutex<HashSet<String>>,
    invoice_id: String,
}

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        match self.in_flight.lock() {
            Ok(mut ids) => {
                ids.remove(&self.invoice_id);
            }
            Err(poisoned) => {
                poisoned.into_inner().remove(&self.invoice_id);
            }
        }
    }
}

impl TransferRetryWorkflow {
    pub fn new(
        ledger: LedgerClient,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> TransferRetryWorkflow {
        TransferRetryWorkflow {
            ledger,
            gateway,
            expected_network: None,
            in_flight: Mutex::new(HashSet::new()),
        }
    }

    pub fn with_expected_network(mut self, network_id: Option<u64>) -> Self {
        self.expected_network = network_id;
        self
    }

    pub fn is_in_flight(&self, invoice_id: &str) -> bool {
        self.in_flight
            .lock()
            .map(|ids| ids.contains(invoice_id))
            .unwrap_or(false)
    }

    fn claim(&self, invoice_id: &str) -> Option<InFlightGuard<'_>> {
        let mut ids = match self.in_flight.lock() {
            Ok(ids) => ids,
            Err(poisoned) => poisoned.into_inner(),
        };
        if !ids.insert(invoice_id.to_string()) {
            return None;
        }
        Some(InFlightGuard {
            in_flight: &self.in_flight,
            invoice_id: invoice_id.to_string(),
        })
    }

    /// Re-submit the invoice's transfer and record it.
    ///
    /// Cancelling the token abandons the wait and skips persistence. A
    /// transfer that was already broadcast may still confirm afterwards.
    ///
    /// The token is not consulted while the wallet's signing prompt is open.
    /// A cancel that arrives then cannot withdraw the signature: the call is
    /// broadcast once the prompt returns, and the attempt fails straight
    /// after with [`ChainOutcome::Pending`] carrying that transaction's hash.
    pub fn retry(
        &self,
        invoice: &TransferInvoice,
        cancel: &CancellationToken,
    ) -> Result<RetryOutcome> {
        let Some(_guard) = self.claim(&invoice.id) else {
            info!("Retry for invoice {} already in flight, ignoring", invoice.id);
            return Ok(RetryOutcome::AlreadyInFlight);
        };
        invoice.ensure_retryable()?;
        cancel.check()?;

        info!("Retrying transfer for invoice {}", invoice.id);
        self.verify_wallet(invoice)?;

        cancel.check().map_err(|e| {
            self.fail(
                invoice,
                Step::Transferring,
                Some(Step::VerifyingWallet),
                ChainOutcome::NotSubmitted,
                e,
            )
        })?;
        let pending = self
            .ledger
            .transfer(
                invoice.from,
                &invoice.token_ids,
                invoice.amounts.as_deref(),
                invoice.to,
            )
            .map_err(|e| {
                self.fail(
                    invoice,
                    Step::Transferring,
                    Some(Step::VerifyingWallet),
                    ChainOutcome::NotSubmitted,
                    e,
                )
            })?;
        let receipt = self.confirm(invoice, &pending, Some(cancel))?;
        let tx_hash = receipt.transaction_hash;

        cancel.check().map_err(|e| {
            warn!("Invoice {} cancelled after {tx_hash} confirmed; not recording it", invoice.id);
            self.fail(
                invoice,
                Step::Persisting,
                Some(Step::Transferring),
                ChainOutcome::Confirmed {
                    tx_hash: tx_hash.clone(),
                },
                e,
            )
        })?;
        let record_id = self.persist(invoice, &tx_hash)?;
        Ok(RetryOutcome::Completed { record_id, tx_hash })
    }

    /// Record a transfer that already confirmed but was never saved.
    ///
    /// Only the persistence step runs again; nothing is signed or broadcast.
    /// The receipt must carry transfer events from the invoice's sender to its
    /// recipient covering every one of its identifiers, otherwise nothing is
    /// written and the invoice keeps its status.
    pub fn resume_persistence(
        &self,
        invoice: &TransferInvoice,
        tx_hash: &str,
    ) -> Result<RetryOutcome> {
        let Some(_guard) = self.claim(&invoice.id) else {
            info!("Invoice {} is busy, ignoring resume", invoice.id);
            return Ok(RetryOutcome::AlreadyInFlight);
        };
        let pending = PendingTx::new(tx_hash.to_string())?;
        let receipt = self.confirm(invoice, &pending, None)?;
        self.verify_transfer(invoice, &receipt)?;
        let record_id = self.persist(invoice, &receipt.transaction_hash)?;
        Ok(RetryOutcome::Completed {
            record_id,
            tx_hash: receipt.transaction_hash,
        })
    }

    // Fresh read of the signer; a mismatch never reaches the wallet's signing prompt
    fn verify_wallet(&self, invoice: &TransferInvoice) -> Result<()> {
        let signer = require_signer(self.ledger.wallet(), self.expected_network).map_err(|e| {
            self.fail(invoice, Step::VerifyingWallet, None, ChainOutcome::NotSubmitted, e)
        })?;
        if signer != invoice.from {
            let mismatch = TraceError::WalletMismatch {
                expected: invoice.from.to_string(),
                actual: signer.to_string(),
            };
            return Err(self.fail(
                invoice,
                Step::VerifyingWallet,
                None,
                ChainOutcome::NotSubmitted,
                mismatch,
            ));
        }
        Ok(())
    }

    // Every identifier of the invoice has to move from its sender to its recipient in this receipt
    fn verify_transfer(&self, invoice: &TransferInvoice, receipt: &MintReceipt) -> Result<()> {
        let moved: HashSet<TokenId> = receipt
            .events()
            .iter()
            .filter_map(|event| event.transfer_parts())
            .filter(|(from, to, _)| *from == invoice.from && *to == invoice.to)
            .flat_map(|(_, _, ids)| ids)
            .collect();
        if invoice.token_ids.iter().all(|id| moved.contains(id)) {
            return Ok(());
        }
        Err(self.fail(
            invoice,
            Step::Persisting,
            None,
            ChainOutcome::NotSubmitted,
            TraceError::NoMatchingTransfer {
                tx_hash: receipt.transaction_hash.clone(),
                invoice_id: invoice.id.clone(),
            },
        ))
    }

    fn confirm(
        &self,
        invoice: &TransferInvoice,
        pending: &PendingTx,
        cancel: Option<&CancellationToken>,
    ) -> Result<MintReceipt> {
        let receipt = self.ledger.await_receipt(pending, cancel).map_err(|e| {
            if let TraceError::Cancelled = e {
                warn!(
                    "Stopped waiting for {}; it may still confirm on the network",
                    pending.tx_hash
                );
            }
            self.fail(
                invoice,
                Step::Transferring,
                Some(Step::VerifyingWallet),
                ChainOutcome::Pending {
                    tx_hash: pending.tx_hash.clone(),
                },
                e,
            )
        })?;
        if !receipt.is_success() {
            return Err(self.fail(
                invoice,
                Step::Transferring,
                Some(Step::VerifyingWallet),
                ChainOutcome::Reverted {
                    tx_hash: receipt.transaction_hash.clone(),
                },
                TraceError::TransactionReverted {
                    tx_hash: receipt.transaction_hash.clone(),
                },
            ));
        }
        Ok(receipt)
    }

    fn persist(&self, invoice: &TransferInvoice, tx_hash: &str) -> Result<String> {
        let submission = TransferSubmission {
            invoice_id: invoice.id.clone(),
            transaction_hash: tx_hash.to_string(),
            token_ids: invoice.token_ids.clone(),
        };
        let record_id = self
            .gateway
            .save_transfer(&submission)
            .and_then(|response| response.into_record_id())
            .map_err(|e| {
                self.fail(
                    invoice,
                    Step::Persisting,
                    Some(Step::Transferring),
                    ChainOutcome::Confirmed {
                        tx_hash: tx_hash.to_string(),
                    },
                    e,
                )
            })?;
        info!(
            "Invoice {} transferred in {tx_hash}, recorded as {record_id}",
            invoice.id
        );
        Ok(record_id)
    }

    fn fail(
        &self,
        invoice: &TransferInvoice,
        step: Step,
        last_completed: Option<Step>,
        chain: ChainOutcome,
        cause: TraceError,
    ) -> TraceError {
        let failure = StepFailure::new(step, last_completed, chain, cause);
        error!("Transfer retry for invoice {} {failure}", invoice.id);
        failure.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Address, InvoiceStatus, LogEntry};
    use crate::ledger::ContractCall;
    use crate::testnet::{
        contract_address, test_address, MemoryGateway, ReceiptPlan, ScriptedNode, ScriptedWallet,
    };
    use std::thread;
    use std::time::Duration;

    struct Harness {
        workflow: Arc<TransferRetryWorkflow>,
        wallet: Arc<ScriptedWallet>,
        node: Arc<ScriptedNode>,
        gateway: Arc<MemoryGateway>,
    }

    fn harness() -> Harness {
        let wallet = Arc::new(ScriptedWallet::connected());
        let node = Arc::new(ScriptedNode::new());
        node.set_default(ReceiptPlan::Logs(Vec::new()));
        let gateway = Arc::new(MemoryGateway::new());
        let ledger = LedgerClient::new(wallet.clone(), node.clone(), contract_address())
            .with_timeouts(Duration::from_millis(60), Duration::from_millis(5));
        Harness {
            workflow: Arc::new(TransferRetryWorkflow::new(ledger, gateway.clone())),
            wallet,
            node,
            gateway,
        }
    }

    fn invoice(h: &Harness, amounts: Option<Vec<u64>>) -> TransferInvoice {
        let invoice = TransferInvoice::new(
            "LOT1",
            h.wallet.address(),
            test_address("22"),
            vec![TokenId::from(4), TokenId::from(5)],
            amounts,
        )
        .unwrap();
        h.gateway.insert_invoice(invoice.clone());
        invoice
    }

    // Logs of a transfer of `ids` from the invoice's sender to its recipient
    fn transfer_logs(inv: &TransferInvoice, ids: &[TokenId]) -> ReceiptPlan {
        let amounts = vec![1; ids.len()];
        ReceiptPlan::Logs(vec![LogEntry::transfer_batch(
            &contract_address(),
            &inv.from,
            &inv.from,
            &inv.to,
            ids,
            &amounts,
        )])
    }

    #[test]
    fn test_retry_records_original_identifiers() {
        let h = harness();
        let inv = invoice(&h, Some(vec![1, 1]));
        let outcome = h.workflow.retry(&inv, &CancellationToken::new()).unwrap();
        let RetryOutcome::Completed { tx_hash, .. } = outcome else {
            panic!("expected a completed retry");
        };

        let transfers = h.gateway.transfers();
        assert_eq!(transfers.len(), 1);
        assert_eq!(transfers[0].token_ids, inv.token_ids);
        assert_eq!(transfers[0].transaction_hash, tx_hash);
        assert_eq!(h.gateway.invoice(&inv.id).unwrap().status, InvoiceStatus::Sent);
        assert!(matches!(h.wallet.calls()[0], ContractCall::TransferBatch { .. }));
    }

    #[test]
    fn test_wallet_mismatch_never_signs() {
        let h = harness();
        let inv = invoice(&h, None);
        h.wallet.set_address(Some(test_address("99")));
        let err = h.workflow.retry(&inv, &CancellationToken::new()).unwrap_err();
        let failure = err.step_failure().unwrap();
        assert_eq!(failure.step, Step::VerifyingWallet);
        assert!(matches!(failure.cause, TraceError::WalletMismatch { .. }));
        assert!(h.wallet.calls().is_empty());
        assert!(h.gateway.transfers().is_empty());
    }

    #[test]
    fn test_mismatch_check_is_case_insensitive() {
        let h = harness();
        let upper = format!("0x{}", "ab".repeat(20).to_uppercase());
        h.wallet
            .set_address(Some(crate::core::Address::parse(&upper).unwrap()));
        let inv = invoice(&h, None);
        assert!(h.workflow.retry(&inv, &CancellationToken::new()).is_ok());
    }

    #[test]
    fn test_disconnected_wallet_is_rejected() {
        let h = harness();
        let inv = invoice(&h, None);
        h.wallet.set_address(None);
        let err = h.workflow.retry(&inv, &CancellationToken::new()).unwrap_err();
        assert!(matches!(
            err.step_failure().unwrap().cause,
            TraceError::WalletNotConnected
        ));
    }

    #[test]
    fn test_concurrent_retry_is_a_no_op() {
        let h = harness();
        let inv = invoice(&h, None);
        let (entered, release) = h.wallet.pause_signing();

        let workflow = h.workflow.clone();
        let first_invoice = inv.clone();
        let first =
            thread::spawn(move || workflow.retry(&first_invoice, &CancellationToken::new()));
        entered.recv().unwrap();

        assert!(h.workflow.is_in_flight(&inv.id));
        let second = h.workflow.retry(&inv, &CancellationToken::new()).unwrap();
        assert_eq!(second, RetryOutcome::AlreadyInFlight);

        release.send(()).unwrap();
        assert!(matches!(
            first.join().unwrap().unwrap(),
            RetryOutcome::Completed { .. }
        ));
        assert_eq!(h.wallet.calls().len(), 1);
        assert_eq!(h.gateway.transfers().len(), 1);
        assert!(!h.workflow.is_in_flight(&inv.id));
    }

    #[test]
    fn test_cancel_during_wait_skips_persistence() {
        let h = harness();
        h.node.set_default(ReceiptPlan::Never);
        let ledger = LedgerClient::new(h.wallet.clone(), h.node.clone(), contract_address())
            .with_timeouts(Duration::from_secs(30), Duration::from_millis(5));
        let workflow = TransferRetryWorkflow::new(ledger, h.gateway.clone());
        let inv = invoice(&h, None);
        let token = CancellationToken::new();

        let remote = token.clone();
        let canceller = thread::spawn(move || {
            thread::sleep(Duration::from_millis(30));
            remote.cancel();
        });
        let err = workflow.retry(&inv, &token).unwrap_err();
        canceller.join().unwrap();

        let failure = err.step_failure().unwrap();
        assert!(matches!(failure.cause, TraceError::Cancelled));
        assert!(matches!(failure.chain, ChainOutcome::Pending { .. }));
        assert!(h.gateway.transfers().is_empty());
        assert_eq!(h.gateway.invoice(&inv.id).unwrap().status, InvoiceStatus::Pending);
    }

    #[test]
    fn test_cancelled_before_start_does_nothing() {
        let h = harness();
        let inv = invoice(&h, None);
        let token = CancellationToken::new();
        token.cancel();
        assert!(matches!(
            h.workflow.retry(&inv, &token),
            Err(TraceError::Cancelled)
        ));
        assert!(h.wallet.calls().is_empty());
    }

    #[test]
    fn test_save_failure_then_resume_is_idempotent() {
        let h = harness();
        let inv = invoice(&h, None);
        h.node.plan("0xtx1", transfer_logs(&inv, &inv.token_ids));
        h.gateway.fail_next_save();
        let err = h.workflow.retry(&inv, &CancellationToken::new()).unwrap_err();
        let failure = err.step_failure().unwrap();
        assert_eq!(failure.step, Step::Persisting);
        let tx_hash = failure.chain.tx_hash().unwrap().to_string();

        let first = h.workflow.resume_persistence(&inv, &tx_hash).unwrap();
        let again = h.workflow.resume_persistence(&inv, &tx_hash).unwrap();
        assert_eq!(first, again);
        assert_eq!(h.gateway.transfers().len(), 1);
        assert_eq!(h.wallet.calls().len(), 1);
    }

    #[test]
    fn test_sent_invoice_is_not_retried() {
        let h = harness();
        let mut inv = invoice(&h, None);
        inv.transition(InvoiceStatus::Sent).unwrap();
        assert!(matches!(
            h.workflow.retry(&inv, &CancellationToken::new()),
            Err(TraceError::InvalidInvoice(_))
        ));
    }

    #[test]
    fn test_reverted_transfer_is_not_recorded() {
        let h = harness();
        h.node.set_default(ReceiptPlan::Reverted);
        let inv = invoice(&h, None);
        let err = h.workflow.retry(&inv, &CancellationToken::new()).unwrap_err();
        assert!(matches!(
            err.step_failure().unwrap().chain,
            ChainOutcome::Reverted { .. }
        ));
        assert!(h.gateway.transfers().is_empty());
    }

    #[test]
    fn test_wrong_network_is_caught_before_signing() {
        let h = harness();
        let inv = invoice(&h, None);
        h.wallet.set_network(137);
        let ledger = LedgerClient::new(h.wallet.clone(), h.node.clone(), contract_address());
        let workflow = TransferRetryWorkflow::new(ledger, h.gateway.clone())
            .with_expected_network(Some(1));
        let err = workflow.retry(&inv, &CancellationToken::new()).unwrap_err();
        assert!(matches!(
            err.step_failure().unwrap().cause,
            TraceError::NetworkMismatch {
                expected: 1,
                actual: 137
            }
        ));
        assert!(h.wallet.calls().is_empty());
    }

    #[test]
    fn test_reverted_attempt_can_be_retried() {
        let h = harness();
        h.node.plan("0xtx1", ReceiptPlan::Reverted);
        let inv = invoice(&h, None);
        assert!(h.workflow.retry(&inv, &CancellationToken::new()).is_err());

        let outcome = h.workflow.retry(&inv, &CancellationToken::new()).unwrap();
        assert!(matches!(
            outcome,
            RetryOutcome::Completed { ref tx_hash, .. } if tx_hash == "0xtx2"
        ));
        assert!(matches!(h.wallet.calls()[1], ContractCall::TransferSingle { .. }));
    }

    #[test]
    fn test_resume_with_unrelated_transaction_writes_nothing() {
        let h = harness();
        let inv = invoice(&h, None);
        let mint = LogEntry::transfer_batch(
            &contract_address(),
            &inv.from,
            &Address::ZERO,
            &inv.from,
            &inv.token_ids,
            &[1, 1],
        );
        h.node.plan("0xmint", ReceiptPlan::Logs(vec![mint]));

        let err = h.workflow.resume_persistence(&inv, "0xmint").unwrap_err();
        let failure = err.step_failure().unwrap();
        assert_eq!(failure.step, Step::Persisting);
        assert_eq!(failure.chain, ChainOutcome::NotSubmitted);
        assert!(matches!(
            failure.cause,
            TraceError::NoMatchingTransfer { ref tx_hash, .. } if tx_hash == "0xmint"
        ));
        assert!(h.gateway.transfers().is_empty());
        assert_eq!(h.gateway.invoice(&inv.id).unwrap().status, InvoiceStatus::Pending);
        assert!(!h.workflow.is_in_flight(&inv.id));
    }

    #[test]
    fn test_resume_requires_every_identifier() {
        let h = harness();
        let inv = invoice(&h, None);
        h.node.plan("0xpartial", transfer_logs(&inv, &[TokenId::from(4)]));
        h.node.plan("0xother", {
            let amounts = [1, 1];
            ReceiptPlan::Logs(vec![LogEntry::transfer_batch(
                &contract_address(),
                &inv.from,
                &inv.from,
                &test_address("33"),
                &inv.token_ids,
                &amounts,
            )])
        });

        assert!(h.workflow.resume_persistence(&inv, "0xpartial").is_err());
        assert!(h.workflow.resume_persistence(&inv, "0xother").is_err());
        assert!(h.gateway.transfers().is_empty());

        h.node.plan("0xsingles", {
            let singles = inv
                .token_ids
                .iter()
                .map(|id| {
                    LogEntry::transfer_single(
                        &contract_address(),
                        &inv.from,
                        &inv.from,
                        &inv.to,
                        id,
                        1,
                    )
                })
                .collect();
            ReceiptPlan::Logs(singles)
        });
        assert!(h.workflow.resume_persistence(&inv, "0xsingles").is_ok());
        assert_eq!(h.gateway.transfers().len(), 1);
    }

    #[test]
    fn test_cancel_while_signing_still_reports_the_broadcast() {
        let h = harness();
        let inv = invoice(&h, None);
        let (entered, release) = h.wallet.pause_signing();
        let token = CancellationToken::new();

        let workflow = h.workflow.clone();
        let attempt = inv.clone();
        let remote = token.clone();
        let running = thread::spawn(move || workflow.retry(&attempt, &remote));
        entered.recv().unwrap();
        token.cancel();
        release.send(()).unwrap();

        let err = running.join().unwrap().unwrap_err();
        let failure = err.step_failure().unwrap();
        assert!(matches!(failure.cause, TraceError::Cancelled));
        assert_eq!(
            failure.chain,
            ChainOutcome::Pending {
                tx_hash: "0xtx1".to_string()
            }
        );
        assert_eq!(h.wallet.calls().len(), 1);
        assert!(h.gateway.transfers().is_empty());
    }

    #[test]
    fn test_cancel_after_confirmation_is_not_recorded() {
        let h = harness();
        let inv = invoice(&h, None);
        let token = CancellationToken::new();
        h.node.cancel_on_confirm(token.clone());

        let err = h.workflow.retry(&inv, &token).unwrap_err();
        let failure = err.step_failure().unwrap();
        assert_eq!(failure.step, Step::Persisting);
        assert_eq!(failure.last_completed, Some(Step::Transferring));
        assert!(matches!(failure.cause, TraceError::Cancelled));
        assert_eq!(
            failure.chain,
            ChainOutcome::Confirmed {
                tx_hash: "0xtx1".to_string()
            }
        );
        assert!(h.gateway.transfers().is_empty());
        assert_eq!(h.gateway.invoice(&inv.id).unwrap().status, InvoiceStatus::Pending);
    }
}
