//! # Pharma Trace - Production-to-Chain Minting & Transfer Orchestrator
//!
//! This is the part of my traceability system that actually talks to the chain.
//! When I come back to this code, here's what I need to remember:
//!
//! ## What It Does
//! - **Production**: validate a batch, upload its metadata, mint one token per unit,
//!   read the minted ids back out of the receipt and save the result
//! - **Reconciliation**: turn a receipt's event logs into exactly `quantity` ids,
//!   batch-mint event first, transfers from the zero address second
//! - **Transfer retry**: re-send an invoice's transfer with the ids it already has,
//!   with cancellation and a wallet check before anything is signed
//! - **Local adapters**: sled content store and backend, an in-process contract
//!   and an ECDSA P-256 wallet so the whole pipeline runs on one machine
//!
//! ## How I Organized My Code
//! - `core/`: batches, token ids, addresses, receipts, event decoding, the reconciler
//! - `wallet/`: the wallet identity trait, local keys and the local wallet
//! - `ledger/`: contract calls, the node trait, the ledger client and the local contract
//! - `storage/`: the content store and the persistence gateway
//! - `workflow/`: the two orchestrators, their state and cancellation
//! - `config/`: settings from TOML and the environment
//! - `error/`: the error enum and step failures
//! - `utils/`: hashing, signing, hex and JSON helpers
//! - `cli/`: the demo command line
//!
//! ## Things I Must Not Forget
//! - Once a mint is broadcast it cannot be undone; every failure after that says so
//! - Padding missing ids upward from the highest one found assumes the contract
//!   assigns ids sequentially; those sets are flagged as heuristic
//! - Always re-read the wallet address right before signing

pub mod cli;
pub mod config;
pub mod core;
pub mod error;
pub mod ledger;
pub mod storage;
pub mod utils;
pub mod wallet;
pub mod workflow;

#[cfg(test)]
pub mod testnet;

// Re-export commonly used types for convenience
pub use cli::{Command, Opt};
pub use config::{Config, Settings, GLOBAL_CONFIG};
pub use core::{
    Address, BatchRequest, Clock, DecodedEvent, FixedClock, InvoiceStatus, LogEntry,
    MintReceipt, ReceiptReconciler, ReceiptStatus, SystemClock, TokenId, TokenIdSet,
    TransferInvoice, ValidatedBatch,
};
pub use error::{ChainOutcome, Result, Step, StepFailure, TraceError};
pub use ledger::{ContractCall, LedgerClient, LedgerNode, LocalLedger, PendingTx};
pub use storage::{
    ContentRecord, ContentStore, MintSubmission, PersistenceGateway, SaveResponse,
    SledContentStore, SledGateway, TransferSubmission,
};
pub use wallet::{LocalWallet, WalletEvent, WalletIdentityProvider, WalletKeys, Wallets};
pub use workflow::{
    CancellationToken, MintOutcome, ProductionWorkflow, RetryOutcome, TransferRetryWorkflow,
    WorkflowState,
};
