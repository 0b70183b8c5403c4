// This is my production pipeline: validate, store metadata, mint, reconcile, persist
// Every step runs on the caller's thread and the state only ever moves forward
// Once a mint is broadcast nothing here can undo it, so failures after that point say so

use crate::core::{
    BatchRequest, Clock, MintReceipt, ReceiptReconciler, SystemClock, ValidatedBatch,
};
use crate::error::{ChainOutcome, Result, Step, StepFailure, TraceError};
use crate::ledger::LedgerClient;
use crate::storage::{ContentStore, MintSubmission, PersistenceGateway};
use crate::wallet::require_signer;
use crate::workflow::{MintOutcome, WorkflowState};
use log::{error, info, warn};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex};

const DEFAULT_REPLICATION: u32 = 3;

pub struct ProductionWorkflow {
    content_store: Arc<dyn ContentStore>,
    ledger: LedgerClient,
    gateway: Arc<dyn PersistenceGateway>,
    clock: Arc<dyn Clock>,
    replication: u32,
    expected_network: Option<u64>,
    state: Mutex<WorkflowState>,
    subscribers: Mutex<Vec<Sender<WorkflowState>>>,
}

impl ProductionWorkflow {
    pub fn new(
        content_store: Arc<dyn ContentStore>,
        ledger: LedgerClient,
        gateway: Arc<dyn PersistenceGateway>,
    ) -> ProductionWorkflow {
        ProductionWorkflow {
            content_store,
            ledger,
            gateway,
            clock: Arc::new(SystemClock),
            replication: DEFAULT_REPLICATION,
            expected_network: None,
            state: Mutex::new(WorkflowState::Idle),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_replication(mut self, replication: u32) -> Self {
        self.replication = replication;
        self
    }

    pub fn with_expected_network(mut self, network_id: Option<u64>) -> Self {
        self.expected_network = network_id;
        self
    }

    pub fn state(&self) -> WorkflowState {
        match self.state.lock() {
            Ok(state) => state.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Every state the workflow enters from now on
    pub fn subscribe(&self) -> Receiver<WorkflowState> {
        let (tx, rx) = channel();
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.push(tx);
        }
        rx
    }

    /// Close the current attempt and go back to idle.
    ///
    /// Refused while an attempt is in flight.
    pub fn reset(&self) -> Result<()> {
        {
            let mut state = self
                .state
                .lock()
                .map_err(|_| TraceError::WorkflowBusy("state lock poisoned".to_string()))?;
            if !matches!(*state, WorkflowState::Idle) && !state.is_terminal() {
                return Err(TraceError::WorkflowBusy(format!(
                    "Cannot reset while {state}"
                )));
            }
            *state = WorkflowState::Idle;
        }
        self.notify(WorkflowState::Idle);
        Ok(())
    }

    /// Run one production attempt to completion.
    ///
    /// Validation errors come back as plain `Validation` errors and leave the
    /// workflow idle. Anything after that is a `Step` failure that names the
    /// last completed step and what the ledger has already seen.
    pub fn submit(&self, request: &BatchRequest) -> Result<MintOutcome> {
        self.begin()?;

        let batch = match request.validate(self.clock.today()) {
            Ok(batch) => batch,
            Err(e) => {
                warn!("Rejected batch {}: {e}", request.batch_code);
                self.set_state(WorkflowState::Idle);
                return Err(e);
            }
        };
        info!(
            "Validated batch {} of {} ({} units, expires {})",
            batch.batch_code, batch.drug_id, batch.quantity, batch.expiry_date
        );

        self.set_state(WorkflowState::Storing);
        let content = self
            .content_store
            .put(&batch.metadata(), self.replication)
            .map_err(|e| {
                self.fail(Step::Storing, Some(Step::Validating), ChainOutcome::NotSubmitted, e)
            })?;
        info!("Batch {} metadata stored at {}", batch.batch_code, content.locator);

        self.set_state(WorkflowState::Minting);
        let receipt = self.mint(&batch, &content.locator)?;
        let tx_hash = receipt.transaction_hash.clone();

        self.set_state(WorkflowState::Reconciling);
        let token_ids = ReceiptReconciler::reconcile(&receipt, batch.quantity as usize)
            .map_err(|e| {
                if let TraceError::NoEventsMatched { .. } = e {
                    error!("Mint {tx_hash} succeeded on-chain but its identifiers are unreadable");
                }
                self.fail(
                    Step::Reconciling,
                    Some(Step::Minting),
                    ChainOutcome::Confirmed {
                        tx_hash: tx_hash.clone(),
                    },
                    e,
                )
            })?;

        self.set_state(WorkflowState::Persisting);
        let submission = MintSubmission {
            drug_id: batch.drug_id.clone(),
            token_ids: token_ids.ids().to_vec(),
            transaction_hash: tx_hash.clone(),
            quantity: batch.quantity,
            content_locator: content.locator.clone(),
            mfg_date: Some(batch.mfg_date),
            exp_date: Some(batch.expiry_date),
            batch_number: Some(batch.batch_code.clone()),
            metadata: content.metadata.clone(),
            heuristic_ids: token_ids.is_heuristic(),
        };
        let record_id = self
            .gateway
            .save_mint(&submission)
            .and_then(|response| response.into_record_id())
            .map_err(|e| {
                error!("Minted but not saved: {tx_hash} needs manual reconciliation ({e})");
                self.fail(
                    Step::Persisting,
                    Some(Step::Reconciling),
                    ChainOutcome::Confirmed {
                        tx_hash: tx_hash.clone(),
                    },
                    e,
                )
            })?;

        let outcome = MintOutcome {
            record_id,
            tx_hash,
            token_ids,
            content,
            batch,
        };
        info!(
            "Batch {} completed as record {} ({} identifiers)",
            outcome.batch.batch_code,
            outcome.record_id,
            outcome.token_ids.len()
        );
        self.set_state(WorkflowState::Completed(Box::new(outcome.clone())));
        Ok(outcome)
    }

    // Broadcast the mint and wait for it. Not cancellable once broadcast.
    fn mint(&self, batch: &ValidatedBatch, locator: &str) -> Result<MintReceipt> {
        let not_submitted = |e: TraceError| {
            self.fail(Step::Minting, Some(Step::Storing), ChainOutcome::NotSubmitted, e)
        };
        let signer =
            require_signer(self.ledger.wallet(), self.expected_network).map_err(not_submitted)?;
        info!("Minting {} units of batch {} as {signer}", batch.quantity, batch.batch_code);

        let pending = self.ledger.mint(locator, batch.quantity).map_err(not_submitted)?;
        let receipt = self.ledger.await_receipt(&pending, None).map_err(|e| {
            self.fail(
                Step::Minting,
                Some(Step::Storing),
                ChainOutcome::Pending {
                    tx_hash: pending.tx_hash.clone(),
                },
                e,
            )
        })?;
        if !receipt.is_success() {
            return Err(self.fail(
                Step::Minting,
                Some(Step::Storing),
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

    fn begin(&self) -> Result<()> {
        {
            let mut state = self
                .state
                .lock()
                .map_err(|_| TraceError::WorkflowBusy("state lock poisoned".to_string()))?;
            if !state.accepts_submit() {
                return Err(TraceError::WorkflowBusy(format!(
                    "An attempt is already {state}"
                )));
            }
            *state = WorkflowState::Validating;
        }
        self.notify(WorkflowState::Validating);
        Ok(())
    }

    fn set_state(&self, next: WorkflowState) {
        match self.state.lock() {
            Ok(mut state) => *state = next.clone(),
            Err(_) => {
                error!("Failed to acquire lock on workflow state");
                return;
            }
        }
        self.notify(next);
    }

    fn fail(
        &self,
        step: Step,
        last_completed: Option<Step>,
        chain: ChainOutcome,
        cause: TraceError,
    ) -> TraceError {
        let failure = StepFailure::new(step, last_completed, chain, cause);
        error!("Production attempt {failure}");
        self.set_state(WorkflowState::Failed(Box::new(failure.clone())));
        failure.into()
    }

    fn notify(&self, state: WorkflowState) {
        if let Ok(mut subscribers) = self.subscribers.lock() {
            subscribers.retain(|tx| tx.send(state.clone()).is_ok());
        }
    }
}
