//! Core domain types
//!
//! Batches, identifiers, receipts and invoices, plus the receipt reconciler
//! that turns a confirmed mint into the authoritative identifier set.

pub mod address;
pub mod batch;
pub mod invoice;
pub mod receipt;
pub mod reconciler;
pub mod token_id;

pub use address::Address;
pub use batch::{BatchRequest, Clock, FixedClock, SystemClock, ValidatedBatch};
pub use invoice::{InvoiceStatus, TransferInvoice};
pub use receipt::{DecodedEvent, LogEntry, MintReceipt, ReceiptStatus};
pub use reconciler::{ReceiptReconciler, TokenIdSet};
pub use token_id::TokenId;
