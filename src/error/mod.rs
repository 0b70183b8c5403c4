//! Error handling for the minting and transfer orchestrators
//!
//! Component-level failures are plain `TraceError` variants. Once a workflow has
//! started doing I/O, failures are wrapped in a [`StepFailure`] that records which
//! step broke, the last step that completed and what the ledger already did.

pub mod failure;

pub use failure::{ChainOutcome, Step, StepFailure};

use std::fmt;

/// Result type alias for orchestrator operations
pub type Result<T> = std::result::Result<T, TraceError>;

/// Comprehensive error types for the traceability core
#[derive(Debug, Clone)]
pub enum TraceError {
    /// Local input rejected before any I/O; never retried automatically
    Validation(String),
    /// Content store could not be reached
    StorageTransport(String),
    /// Content store refused the payload (e.g. oversized)
    StorageRejected(String),
    /// The signer declined the request
    SignatureDeclined(String),
    /// Key generation, key loading or signing broke inside the wallet
    Crypto(String),
    /// Node/RPC failure; the only kind a caller may retry automatically
    LedgerTransport(String),
    /// Broadcast but not confirmed in time; may still confirm out-of-band
    ConfirmationTimeout { tx_hash: String },
    /// Confirmed with a failure status
    TransactionReverted { tx_hash: String },
    /// No mint signal could be read out of a confirmed receipt
    NoEventsMatched { tx_hash: String },
    /// A confirmed transaction does not move the invoice's tokens between its parties
    NoMatchingTransfer { tx_hash: String, invoice_id: String },
    /// Backend rejected or failed to store a record
    Persistence(String),
    /// Connected wallet is not the originating address of an invoice
    WalletMismatch { expected: String, actual: String },
    /// No signing identity available
    WalletNotConnected,
    /// Wallet is on a different network than configured
    NetworkMismatch { expected: u64, actual: u64 },
    /// Caller cancelled an in-flight operation
    Cancelled,
    /// A second attempt was started while one is in flight
    WorkflowBusy(String),
    /// Invoice is missing or in a state that does not allow the operation
    InvalidInvoice(String),
    /// Malformed log, address or hex payload
    Decode(String),
    /// Configuration errors
    Config(String),
    /// Database-related errors
    Database(String),
    /// Serialization/deserialization errors
    Serialization(String),
    /// File I/O errors
    Io(String),
    /// A workflow step failed after the attempt started doing I/O
    Step(Box<StepFailure>),
}

impl TraceError {
    /// Only node/RPC failures are eligible for caller-driven retry.
    pub fn is_retryable(&self) -> bool {
        match self {
            TraceError::LedgerTransport(_) => true,
            TraceError::Step(failure) => failure.cause.is_retryable(),
            _ => false,
        }
    }

    pub fn step_failure(&self) -> Option<&StepFailure> {
        match self {
            TraceError::Step(failure) => Some(failure),
            _ => None,
        }
    }
}

impl fmt::Display for TraceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TraceError::Validation(msg) => write!(f, "Validation error: {msg}"),
            TraceError::StorageTransport(msg) => write!(f, "Content store unreachable: {msg}"),
            TraceError::StorageRejected(msg) => write!(f, "Content store rejected payload: {msg}"),
            TraceError::SignatureDeclined(msg) => write!(f, "Signature request declined: {msg}"),
            TraceError::Crypto(msg) => write!(f, "Wallet key or signing failure: {msg}"),
            TraceError::LedgerTransport(msg) => write!(f, "Ledger transport error: {msg}"),
            TraceError::ConfirmationTimeout { tx_hash } => {
                write!(
                    f,
                    "Transaction {tx_hash} not confirmed in time; it may still confirm later"
                )
            }
            TraceError::TransactionReverted { tx_hash } => {
                write!(f, "Transaction {tx_hash} reverted")
            }
            TraceError::NoEventsMatched { tx_hash } => {
                write!(
                    f,
                    "Transaction {tx_hash} succeeded on-chain but no minted identifiers could be read"
                )
            }
            TraceError::NoMatchingTransfer { tx_hash, invoice_id } => {
                write!(
                    f,
                    "Transaction {tx_hash} does not transfer the tokens of invoice {invoice_id}"
                )
            }
            TraceError::Persistence(msg) => write!(f, "Persistence error: {msg}"),
            TraceError::WalletMismatch { expected, actual } => {
                write!(
                    f,
                    "Connected wallet {actual} does not match expected address {expected}"
                )
            }
            TraceError::WalletNotConnected => write!(f, "No wallet connected"),
            TraceError::NetworkMismatch { expected, actual } => {
                write!(f, "Wallet is on network {actual}, expected {expected}")
            }
            TraceError::Cancelled => write!(f, "Operation cancelled"),
            TraceError::WorkflowBusy(msg) => write!(f, "Workflow busy: {msg}"),
            TraceError::InvalidInvoice(msg) => write!(f, "Invalid invoice: {msg}"),
            TraceError::Decode(msg) => write!(f, "Decode error: {msg}"),
            TraceError::Config(msg) => write!(f, "Configuration error: {msg}"),
            TraceError::Database(msg) => write!(f, "Database error: {msg}"),
            TraceError::Serialization(msg) => write!(f, "Serialization error: {msg}"),
            TraceError::Io(msg) => write!(f, "I/O error: {msg}"),
            TraceError::Step(failure) => write!(f, "{failure}"),
        }
    }
}

impl std::error::Error for TraceError {}

impl From<StepFailure> for TraceError {
    fn from(failure: StepFailure) -> Self {
        TraceError::Step(Box::new(failure))
    }
}

impl From<std::io::Error> for TraceError {
    fn from(err: std::io::Error) -> Self {
        TraceError::Io(err.to_string())
    }
}

impl From<sled::Error> for TraceError {
    fn from(err: sled::Error) -> Self {
        TraceError::Database(err.to_string())
    }
}

impl From<serde_json::Error> for TraceError {
    fn from(err: serde_json::Error) -> Self {
        TraceError::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for TraceError {
    fn from(err: toml::de::Error) -> Self {
        TraceError::Config(err.to_string())
    }
}
