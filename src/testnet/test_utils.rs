//! Scripted fakes of the four external boundaries

use crate::core::{
    Address, BatchRequest, LogEntry, MintReceipt, ReceiptStatus, TransferInvoice,
};
use crate::error::{Result, TraceError};
use crate::ledger::{ContractCall, LedgerNode, PendingTx, SignedCall};
use crate::storage::{
    apply_transfer, content_id_for, ContentRecord, ContentStore, MintSubmission,
    PersistenceGateway, SaveResponse, TransferSubmission,
};
use crate::utils::canonical_json;
use crate::wallet::{WalletEvent, WalletIdentityProvider};
use crate::workflow::CancellationToken;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Mutex;

pub const TEST_NETWORK_ID: u64 = 1;

/// Fixed "today" so date-window validation is deterministic
pub fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 6, 1).unwrap()
}

pub fn contract_address() -> Address {
    Address::parse("0x0000000000000000000000000000000000001155").unwrap()
}

/// `test_address("ab")` is 0xabab...ab
pub fn test_address(byte: &str) -> Address {
    Address::parse(&format!("0x{}", byte.repeat(20))).unwrap()
}

/// A valid request manufactured ten days before [`today`]
pub fn batch_request(batch_code: &str, quantity: u64) -> BatchRequest {
    BatchRequest {
        drug_id: "paracetamol-500".to_string(),
        batch_code: batch_code.to_string(),
        quantity,
        mfg_date: today() - chrono::Duration::days(10),
        shelf_life_months: 24,
        notes: "test batch".to_string(),
    }
}

/// Wallet that records every call it is asked to sign
pub struct ScriptedWallet {
    address: Mutex<Option<Address>>,
    network_id: Mutex<Option<u64>>,
    calls: Mutex<Vec<ContractCall>>,
    decline_next: AtomicBool,
    fail_next: AtomicBool,
    sent: AtomicUsize,
    gate: Mutex<Option<(Sender<()>, Receiver<()>)>>,
    subscribers: Mutex<Vec<Sender<WalletEvent>>>,
}

impl ScriptedWallet {
    pub fn connected() -> ScriptedWallet {
        ScriptedWallet {
            address: Mutex::new(Some(test_address("11"))),
            network_id: Mutex::new(Some(TEST_NETWORK_ID)),
            calls: Mutex::new(Vec::new()),
            decline_next: AtomicBool::new(false),
            fail_next: AtomicBool::new(false),
            sent: AtomicUsize::new(0),
            gate: Mutex::new(None),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Current address, or the zero address when disconnected
    pub fn address(&self) -> Address {
        self.current_address().unwrap_or(Address::ZERO)
    }

    pub fn set_address(&self, address: Option<Address>) {
        *self.address.lock().unwrap() = address;
        let event = match address {
            Some(address) => WalletEvent::AccountChanged(address),
            None => WalletEvent::Disconnected,
        };
        self.subscribers
            .lock()
            .unwrap()
            .retain(|tx| tx.send(event.clone()).is_ok());
    }

    pub fn set_network(&self, network_id: u64) {
        *self.network_id.lock().unwrap() = Some(network_id);
    }

    /// Every call that reached the signing prompt, declined ones included
    pub fn calls(&self) -> Vec<ContractCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn decline_next(&self) {
        self.decline_next.store(true, Ordering::SeqCst);
    }

    /// The next broadcast fails with a transport error
    pub fn fail_next_broadcast(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    /// Hold the next signing prompt open.
    ///
    /// The first receiver fires once a call is waiting inside the prompt;
    /// sending on the returned sender lets it continue.
    pub fn pause_signing(&self) -> (Receiver<()>, Sender<()>) {
        let (entered_tx, entered_rx) = channel();
        let (release_tx, release_rx) = channel();
        *self.gate.lock().unwrap() = Some((entered_tx, release_rx));
        (entered_rx, release_tx)
    }
}

impl WalletIdentityProvider for ScriptedWallet {
    fn current_address(&self) -> Option<Address> {
        *self.address.lock().unwrap()
    }

    fn network_id(&self) -> Option<u64> {
        *self.network_id.lock().unwrap()
    }

    fn sign_and_send(&self, call: &ContractCall) -> Result<PendingTx> {
        self.calls.lock().unwrap().push(call.clone());

        let gate = self.gate.lock().unwrap().take();
        if let Some((entered, release)) = gate {
            let _ = entered.send(());
            let _ = release.recv();
        }

        if self.decline_next.swap(false, Ordering::SeqCst) {
            return Err(TraceError::SignatureDeclined("declined in test".to_string()));
        }
        if self.current_address().is_none() {
            return Err(TraceError::WalletNotConnected);
        }
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(TraceError::LedgerTransport("node unreachable".to_string()));
        }
        let n = self.sent.fetch_add(1, Ordering::SeqCst) + 1;
        PendingTx::new(format!("0xtx{n}"))
    }

    fn subscribe(&self) -> Receiver<WalletEvent> {
        let (tx, rx) = channel();
        self.subscribers.lock().unwrap().push(tx);
        rx
    }
}

/// How the scripted node answers a receipt request
#[derive(Debug, Clone)]
pub enum ReceiptPlan {
    /// Confirmed successfully with these logs
    Logs(Vec<LogEntry>),
    Reverted,
    /// Never confirms
    Never,
    TransportError,
}

/// Ledger node whose receipts are scripted per transaction hash
pub struct ScriptedNode {
    default_plan: Mutex<ReceiptPlan>,
    plans: Mutex<HashMap<String, ReceiptPlan>>,
    polls: AtomicUsize,
    cancel_on_confirm: Mutex<Option<CancellationToken>>,
}

impl ScriptedNode {
    pub fn new() -> ScriptedNode {
        ScriptedNode {
            default_plan: Mutex::new(ReceiptPlan::Never),
            plans: Mutex::new(HashMap::new()),
            polls: AtomicUsize::new(0),
            cancel_on_confirm: Mutex::new(None),
        }
    }

    pub fn set_default(&self, plan: ReceiptPlan) {
        *self.default_plan.lock().unwrap() = plan;
    }

    pub fn plan(&self, tx_hash: &str, plan: ReceiptPlan) {
        self.plans.lock().unwrap().insert(tx_hash.to_string(), plan);
    }

    pub fn poll_count(&self) -> usize {
        self.polls.load(Ordering::SeqCst)
    }

    /// Cancel `token` as the next successful receipt is handed out
    pub fn cancel_on_confirm(&self, token: CancellationToken) {
        *self.cancel_on_confirm.lock().unwrap() = Some(token);
    }
}

impl LedgerNode for ScriptedNode {
    fn broadcast(&self, _signed: SignedCall) -> Result<PendingTx> {
        Err(TraceError::LedgerTransport(
            "scripted node does not accept broadcasts".to_string(),
        ))
    }

    fn receipt(&self, tx_hash: &str) -> Result<Option<MintReceipt>> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        let plan = match self.plans.lock().unwrap().get(tx_hash) {
            Some(plan) => plan.clone(),
            None => self.default_plan.lock().unwrap().clone(),
        };
        let receipt = |status: ReceiptStatus, logs: Vec<LogEntry>| MintReceipt {
            transaction_hash: tx_hash.to_string(),
            block_number: 1,
            status,
            logs,
        };
        match plan {
            ReceiptPlan::Logs(logs) => {
                if let Some(token) = self.cancel_on_confirm.lock().unwrap().take() {
                    token.cancel();
                }
                Ok(Some(receipt(ReceiptStatus::Success, logs)))
            }
            ReceiptPlan::Reverted => Ok(Some(receipt(ReceiptStatus::Reverted, Vec::new()))),
            ReceiptPlan::Never => Ok(None),
            ReceiptPlan::TransportError => {
                Err(TraceError::LedgerTransport("rpc timeout".to_string()))
            }
        }
    }
}

/// Content store kept in memory
pub struct ScriptedContentStore {
    fail_next: Mutex<Option<TraceError>>,
    puts: AtomicUsize,
}

impl ScriptedContentStore {
    pub fn new() -> ScriptedContentStore {
        ScriptedContentStore {
            fail_next: Mutex::new(None),
            puts: AtomicUsize::new(0),
        }
    }

    pub fn fail_next(&self, error: TraceError) {
        *self.fail_next.lock().unwrap() = Some(error);
    }

    pub fn put_count(&self) -> usize {
        self.puts.load(Ordering::SeqCst)
    }
}

impl ContentStore for ScriptedContentStore {
    fn put(&self, metadata: &serde_json::Value, replication: u32) -> Result<ContentRecord> {
        self.puts.fetch_add(1, Ordering::SeqCst);
        if let Some(error) = self.fail_next.lock().unwrap().take() {
            return Err(error);
        }
        let content_id = content_id_for(&canonical_json(metadata)?);
        Ok(ContentRecord {
            locator: format!("ipfs://{content_id}"),
            content_id,
            metadata: metadata.clone(),
            replication,
        })
    }
}

/// In-memory backend with the same invoice rules as the sled one
pub struct MemoryGateway {
    mints: Mutex<Vec<MintSubmission>>,
    transfers: Mutex<Vec<TransferSubmission>>,
    invoices: Mutex<HashMap<String, TransferInvoice>>,
    fail_next_save: AtomicBool,
}

impl MemoryGateway {
    pub fn new() -> MemoryGateway {
        MemoryGateway {
            mints: Mutex::new(Vec::new()),
            transfers: Mutex::new(Vec::new()),
            invoices: Mutex::new(HashMap::new()),
            fail_next_save: AtomicBool::new(false),
        }
    }

    pub fn fail_next_save(&self) {
        self.fail_next_save.store(true, Ordering::SeqCst);
    }

    pub fn mints(&self) -> Vec<MintSubmission> {
        self.mints.lock().unwrap().clone()
    }

    pub fn transfers(&self) -> Vec<TransferSubmission> {
        self.transfers.lock().unwrap().clone()
    }

    pub fn insert_invoice(&self, invoice: TransferInvoice) {
        self.invoices
            .lock()
            .unwrap()
            .insert(invoice.id.clone(), invoice);
    }

    pub fn invoice(&self, invoice_id: &str) -> Option<TransferInvoice> {
        self.invoices.lock().unwrap().get(invoice_id).cloned()
    }

    fn check_outage(&self) -> Result<()> {
        if self.fail_next_save.swap(false, Ordering::SeqCst) {
            return Err(TraceError::Persistence("backend unavailable".to_string()));
        }
        Ok(())
    }
}

impl PersistenceGateway for MemoryGateway {
    fn save_mint(&self, submission: &MintSubmission) -> Result<SaveResponse> {
        self.check_outage()?;
        let mut mints = self.mints.lock().unwrap();
        mints.push(submission.clone());
        Ok(SaveResponse::ok(format!("mint-{}", mints.len())))
    }

    fn save_transfer(&self, submission: &TransferSubmission) -> Result<SaveResponse> {
        self.check_outage()?;
        let mut invoices = self.invoices.lock().unwrap();
        let invoice = invoices
            .get_mut(&submission.invoice_id)
            .ok_or_else(|| TraceError::Persistence("unknown invoice".to_string()))?;
        let mut transfers = self.transfers.lock().unwrap();
        if !apply_transfer(invoice, submission)? {
            let position = transfers
                .iter()
                .position(|t| t.transaction_hash == submission.transaction_hash)
                .unwrap_or(0);
            return Ok(SaveResponse::ok(format!("transfer-{}", position + 1)));
        }
        transfers.push(submission.clone());
        Ok(SaveResponse::ok(format!("transfer-{}", transfers.len())))
    }

    fn load_invoice(&self, invoice_id: &str) -> Result<Option<TransferInvoice>> {
        Ok(self.invoice(invoice_id))
    }

    fn save_invoice(&self, invoice: &TransferInvoice) -> Result<()> {
        self.insert_invoice(invoice.clone());
        Ok(())
    }
}
