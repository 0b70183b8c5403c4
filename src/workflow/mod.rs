//! Orchestrators
//!
//! `ProductionWorkflow` takes a new batch from validation to a persisted mint.
//! `TransferRetryWorkflow` re-attempts the on-chain transfer of an invoice.
//! Both run their steps sequentially on the caller's thread.

pub mod cancellation;
pub mod production;
pub mod state;
pub mod transfer_retry;

pub use cancellation::CancellationToken;
pub use production::ProductionWorkflow;
pub use state::{MintOutcome, WorkflowState};
pub use transfer_retry::{RetryOutcome, TransferRetryWorkflow};
