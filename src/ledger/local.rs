//! In-process contract simulator
//!
//! Behaves like a small multi-token contract behind a node: identifiers are
//! assigned sequentially from 1, ownership is tracked, and every confirmed
//! call gets a receipt with the same event logs a real deployment emits.
//! Failure switches let tests and demos exercise transport errors, missing
//! batch-mint events and receipts that never arrive. Opened with a snapshot
//! path, the contract state survives between runs of the CLI.

use crate::core::{Address, LogEntry, MintReceipt, ReceiptStatus, TokenId};
use crate::error::{Result, TraceError};
use crate::ledger::{ContractCall, LedgerNode, PendingTx, SignedCall};
use crate::utils::{
    deserialize, ecdsa_p256_sha256_sign_verify, keccak256_digest, serialize, to_hex_prefixed,
};
use crate::wallet::address_from_public_key;
use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::RwLock;

#[derive(Serialize, Deserialize)]
struct Holding {
    owner: Address,
    supply: u64,
    uri: String,
}

#[derive(Serialize, Deserialize)]
struct LedgerState {
    next_token_id: TokenId,
    holdings: HashMap<TokenId, Holding>,
    receipts: HashMap<String, MintReceipt>,
    #[serde(default)]
    withheld: HashMap<String, MintReceipt>,
    block_number: u64,
}

impl LedgerState {
    fn genesis() -> LedgerState {
        LedgerState {
            next_token_id: TokenId::from(1),
            holdings: HashMap::new(),
            receipts: HashMap::new(),
            withheld: HashMap::new(),
            block_number: 0,
        }
    }
}

pub struct LocalLedger {
    contract: Address,
    snapshot: Option<PathBuf>,
    state: RwLock<LedgerState>,
    emit_batch_mint: AtomicBool,
    withhold_receipts: AtomicBool,
    fail_next_broadcast: AtomicBool,
    broadcasts: AtomicUsize,
}

impl LocalLedger {
    pub fn new(contract: Address) -> LocalLedger {
        LocalLedger {
            contract,
            snapshot: None,
            state: RwLock::new(LedgerState::genesis()),
            emit_batch_mint: AtomicBool::new(true),
            withhold_receipts: AtomicBool::new(false),
            fail_next_broadcast: AtomicBool::new(false),
            broadcasts: AtomicUsize::new(0),
        }
    }

    /// Load the contract state from `path` if it exists and write it back after every block
    pub fn open(contract: Address, path: &Path) -> Result<LocalLedger> {
        let mut ledger = LocalLedger::new(contract);
        if path.exists() {
            let bytes = fs::read(path)?;
            let state: LedgerState = deserialize(&bytes)?;
            info!(
                "Loaded ledger snapshot at block {} ({} tokens)",
                state.block_number,
                state.holdings.len()
            );
            ledger.state = RwLock::new(state);
        }
        ledger.snapshot = Some(path.to_path_buf());
        Ok(ledger)
    }

    pub fn contract(&self) -> Address {
        self.contract
    }

    fn save_snapshot(&self, state: &LedgerState) -> Result<()> {
        if let Some(path) = &self.snapshot {
            fs::write(path, serialize(state)?)
                .map_err(|e| TraceError::LedgerTransport(format!("Failed to write snapshot: {e}")))?;
        }
        Ok(())
    }

    /// Toggle the contract-specific `BatchMinted` event on mints
    pub fn set_emit_batch_mint(&self, emit: bool) {
        self.emit_batch_mint.store(emit, Ordering::SeqCst);
    }

    /// Keep new receipts back until `release_withheld` is called
    pub fn set_withhold_receipts(&self, withhold: bool) {
        self.withhold_receipts.store(withhold, Ordering::SeqCst);
    }

    pub fn release_withheld(&self) {
        if let Ok(mut state) = self.state.write() {
            let withheld: Vec<(String, MintReceipt)> = state.withheld.drain().collect();
            state.receipts.extend(withheld);
        }
    }

    /// The next broadcast fails as if the node were unreachable
    pub fn fail_next_broadcast(&self) {
        self.fail_next_broadcast.store(true, Ordering::SeqCst);
    }

    /// Broadcasts the node accepted
    pub fn broadcast_count(&self) -> usize {
        self.broadcasts.load(Ordering::SeqCst)
    }

    pub fn owner_of(&self, id: &TokenId) -> Option<Address> {
        let state = self.state.read().ok()?;
        state.holdings.get(id).map(|holding| holding.owner)
    }

    pub fn uri_of(&self, id: &TokenId) -> Option<String> {
        let state = self.state.read().ok()?;
        state.holdings.get(id).map(|holding| holding.uri.clone())
    }

    fn verify(&self, signed: &SignedCall) -> Result<Vec<u8>> {
        if signed.call.contract() != &self.contract {
            return Err(TraceError::LedgerTransport(format!(
                "Node has no contract at {}",
                signed.call.contract()
            )));
        }
        if address_from_public_key(&signed.public_key) != signed.signer {
            return Err(TraceError::LedgerTransport(
                "Signer does not match public key".to_string(),
            ));
        }
        let payload = signed.call.signing_payload(signed.nonce)?;
        if !ecdsa_p256_sha256_sign_verify(&signed.public_key, &signed.signature, &payload) {
            return Err(TraceError::LedgerTransport("Invalid signature".to_string()));
        }
        Ok(payload)
    }

    fn execute(&self, state: &mut LedgerState, signed: &SignedCall) -> Result<Vec<LogEntry>> {
        let signer = signed.signer;
        match &signed.call {
            ContractCall::MintBatch {
                token_uri, amounts, ..
            } => {
                if amounts.is_empty() || amounts.contains(&0) {
                    return Err(TraceError::TransactionReverted {
                        tx_hash: String::new(),
                    });
                }
                let mut ids = Vec::with_capacity(amounts.len());
                for amount in amounts {
                    let id = state.next_token_id.clone();
                    state.next_token_id = id.next().ok_or_else(|| {
                        TraceError::TransactionReverted {
                            tx_hash: String::new(),
                        }
                    })?;
                    state.holdings.insert(
                        id.clone(),
                        Holding {
                            owner: signer,
                            supply: *amount,
                            uri: token_uri.clone(),
                        },
                    );
                    ids.push(id);
                }
                let mut logs = Vec::new();
                if self.emit_batch_mint.load(Ordering::SeqCst) {
                    logs.push(LogEntry::batch_minted(&self.contract, &signer, &ids, amounts));
                }
                logs.push(LogEntry::transfer_batch(
                    &self.contract,
                    &signer,
                    &Address::ZERO,
                    &signer,
                    &ids,
                    amounts,
                ));
                Ok(logs)
            }
            ContractCall::TransferBatch {
                from,
                to,
                ids,
                amounts,
                ..
            } => {
                if ids.len() != amounts.len() {
                    return Err(TraceError::TransactionReverted {
                        tx_hash: String::new(),
                    });
                }
                let moves: Vec<(TokenId, u64)> =
                    ids.iter().cloned().zip(amounts.iter().copied()).collect();
                Self::move_holdings(state, &signer, from, to, &moves)?;
                Ok(vec![LogEntry::transfer_batch(
                    &self.contract,
                    &signer,
                    from,
                    to,
                    ids,
                    amounts,
                )])
            }
            ContractCall::TransferSingle { from, to, ids, .. } => {
                let moves: Vec<(TokenId, u64)> = ids.iter().map(|id| (id.clone(), 1)).collect();
                Self::move_holdings(state, &signer, from, to, &moves)?;
                Ok(ids
                    .iter()
                    .map(|id| LogEntry::transfer_single(&self.contract, &signer, from, to, id, 1))
                    .collect())
            }
        }
    }

    // Whole-lot moves only: every id must belong to `from` and the amount must match its supply
    fn move_holdings(
        state: &mut LedgerState,
        signer: &Address,
        from: &Address,
        to: &Address,
        moves: &[(TokenId, u64)],
    ) -> Result<()> {
        let reverted = || TraceError::TransactionReverted {
            tx_hash: String::new(),
        };
        if signer != from || to.is_zero() || moves.is_empty() {
            return Err(reverted());
        }
        for (id, amount) in moves {
            match state.holdings.get(id) {
                Some(holding) if holding.owner == *from && holding.supply == *amount => {}
                _ => {
                    debug!("Transfer of {id} from {from} rejected by contract");
                    return Err(reverted());
                }
            }
        }
        for (id, _) in moves {
            if let Some(holding) = state.holdings.get_mut(id) {
                holding.owner = *to;
            }
        }
        Ok(())
    }
}

impl LedgerNode for LocalLedger {
    fn broadcast(&self, signed: SignedCall) -> Result<PendingTx> {
        if self.fail_next_broadcast.swap(false, Ordering::SeqCst) {
            warn!("Simulated node outage on broadcast");
            return Err(TraceError::LedgerTransport(
                "Node unreachable".to_string(),
            ));
        }
        let payload = self.verify(&signed)?;

        let mut preimage = signed.signature.clone();
        preimage.extend_from_slice(&payload);
        let tx_hash = to_hex_prefixed(&keccak256_digest(&preimage));

        let mut state = self
            .state
            .write()
            .map_err(|e| TraceError::LedgerTransport(format!("Ledger state poisoned: {e}")))?;
        state.block_number += 1;
        let (status, logs) = match self.execute(&mut state, &signed) {
            Ok(logs) => (ReceiptStatus::Success, logs),
            Err(TraceError::TransactionReverted { .. }) => (ReceiptStatus::Reverted, Vec::new()),
            Err(e) => return Err(e),
        };
        let receipt = MintReceipt {
            transaction_hash: tx_hash.clone(),
            block_number: state.block_number,
            status,
            logs,
        };
        info!(
            "Block {} includes {} ({:?})",
            state.block_number,
            tx_hash,
            receipt.status
        );
        if self.withhold_receipts.load(Ordering::SeqCst) {
            state.withheld.insert(tx_hash.clone(), receipt);
        } else {
            state.receipts.insert(tx_hash.clone(), receipt);
        }
        self.save_snapshot(&state)?;
        self.broadcasts.fetch_add(1, Ordering::SeqCst);
        PendingTx::new(tx_hash)
    }

    fn receipt(&self, tx_hash: &str) -> Result<Option<MintReceipt>> {
        let state = self
            .state
            .read()
            .map_err(|e| TraceError::LedgerTransport(format!("Ledger state poisoned: {e}")))?;
        Ok(state.receipts.get(tx_hash).cloned())
    }
}
