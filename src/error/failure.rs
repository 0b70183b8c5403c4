use crate::error::TraceError;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Steps a workflow attempt walks through, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Step {
    Validating,
    Storing,
    Minting,
    Reconciling,
    Persisting,
    VerifyingWallet,
    Transferring,
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Step::Validating => "validating",
            Step::Storing => "storing",
            Step::Minting => "minting",
            Step::Reconciling => "reconciling",
            Step::Persisting => "persisting",
            Step::VerifyingWallet => "verifying wallet",
            Step::Transferring => "transferring",
        };
        write!(f, "{name}")
    }
}

/// What the ledger has seen of this attempt at the moment it failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainOutcome {
    /// Nothing reached the network
    NotSubmitted,
    /// Broadcast, confirmation unknown
    Pending { tx_hash: String },
    /// Confirmed with failure status, no state change
    Reverted { tx_hash: String },
    /// Confirmed and irreversible
    Confirmed { tx_hash: String },
}

impl ChainOutcome {
    pub fn tx_hash(&self) -> Option<&str> {
        match self {
            ChainOutcome::NotSubmitted => None,
            ChainOutcome::Pending { tx_hash }
            | ChainOutcome::Reverted { tx_hash }
            | ChainOutcome::Confirmed { tx_hash } => Some(tx_hash),
        }
    }
}

/// A terminal failure of one workflow attempt.
#[derive(Debug, Clone)]
pub struct StepFailure {
    pub step: Step,
    pub last_completed: Option<Step>,
    pub chain: ChainOutcome,
    pub cause: TraceError,
}

impl StepFailure {
    pub fn new(
        step: Step,
        last_completed: Option<Step>,
        chain: ChainOutcome,
        cause: TraceError,
    ) -> StepFailure {
        StepFailure {
            step,
            last_completed,
            chain,
            cause,
        }
    }

    /// Ledger state changed (or may still change) and cannot be undone.
    pub fn is_irreversible(&self) -> bool {
        matches!(
            self.chain,
            ChainOutcome::Confirmed { .. } | ChainOutcome::Pending { .. }
        )
    }

    /// The mint confirmed but the backend record was not written.
    pub fn is_minted_not_saved(&self) -> bool {
        self.step == Step::Persisting && matches!(self.chain, ChainOutcome::Confirmed { .. })
    }

    /// The mint confirmed but its identifiers could not be read from the receipt.
    pub fn is_unrecoverable_read(&self) -> bool {
        matches!(self.cause, TraceError::NoEventsMatched { .. })
    }
}

impl fmt::Display for StepFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed while {}: {}", self.step, self.cause)?;
        match self.last_completed {
            Some(step) => write!(f, " (last completed step: {step})")?,
            None => write!(f, " (no step completed)")?,
        }
        match &self.chain {
            ChainOutcome::Confirmed { tx_hash } => write!(
                f,
                "; transaction {tx_hash} is confirmed on-chain, nothing was lost, manual reconciliation required"
            ),
            ChainOutcome::Pending { tx_hash } => {
                write!(f, "; transaction {tx_hash} was broadcast and may still confirm")
            }
            ChainOutcome::Reverted { tx_hash } => {
                write!(f, "; transaction {tx_hash} reverted, ledger unchanged")
            }
            ChainOutcome::NotSubmitted => write!(f, "; nothing was submitted to the ledger"),
        }
    }
}
