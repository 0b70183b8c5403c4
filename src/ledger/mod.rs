//! Ledger access
//!
//! `LedgerClient` turns mint and transfer requests into contract calls, asks
//! the wallet to sign them and waits on a `LedgerNode` for the receipt.

pub mod call;
pub mod client;
pub mod local;
pub mod node;

pub use call::{ContractCall, PendingTx, SignedCall};
pub use client::LedgerClient;
pub use local::LocalLedger;
pub use node::LedgerNode;
