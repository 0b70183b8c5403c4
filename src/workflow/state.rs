use crate::core::{TokenIdSet, ValidatedBatch};
use crate::error::{Step, StepFailure};
use crate::storage::ContentRecord;
use std::fmt;

/// Everything a finished production attempt produced
#[derive(Debug, Clone, PartialEq)]
pub struct MintOutcome {
    /// Durable id returned by the backend
    pub record_id: String,
    pub tx_hash: String,
    pub token_ids: TokenIdSet,
    pub content: ContentRecord,
    pub batch: ValidatedBatch,
}

/// Per-attempt state of a production workflow.
///
/// Moves strictly forward: `Idle -> Validating -> Storing -> Minting ->
/// Reconciling -> Persisting -> Completed`, or into `Failed` from any step
/// after validation.
#[derive(Debug, Clone)]
pub enum WorkflowState {
    Idle,
    Validating,
    Storing,
    Minting,
    Reconciling,
    Persisting,
    Completed(Box<MintOutcome>),
    Failed(Box<StepFailure>),
}

impl WorkflowState {
    /// The step this state stands for, if it is one
    pub fn step(&self) -> Option<Step> {
        match self {
            WorkflowState::Validating => Some(Step::Validating),
            WorkflowState::Storing => Some(Step::Storing),
            WorkflowState::Minting => Some(Step::Minting),
            WorkflowState::Reconciling => Some(Step::Reconciling),
            WorkflowState::Persisting => Some(Step::Persisting),
            _ => None,
        }
    }

    /// A new attempt may start from here
    pub fn accepts_submit(&self) -> bool {
        matches!(self, WorkflowState::Idle | WorkflowState::Failed(_))
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkflowState::Completed(_) | WorkflowState::Failed(_))
    }
}

impl PartialEq for WorkflowState {
    // Failures compare by step and ledger outcome; the cause is informational
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (WorkflowState::Completed(a), WorkflowState::Completed(b)) => a == b,
            (WorkflowState::Failed(a), WorkflowState::Failed(b)) => {
                a.step == b.step && a.chain == b.chain
            }
            _ => std::mem::discriminant(self) == std::mem::discriminant(other),
        }
    }
}

impl fmt::Display for WorkflowState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WorkflowState::Idle => write!(f, "idle"),
            WorkflowState::Completed(outcome) => write!(f, "completed ({})", outcome.record_id),
            WorkflowState::Failed(failure) => write!(f, "failed ({})", failure.step),
            other => match other.step() {
                Some(step) => write!(f, "{step}"),
                None => write!(f, "unknown"),
            },
        }
    }
}
