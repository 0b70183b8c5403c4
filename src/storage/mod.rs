//! Off-chain storage
//!
//! The content store holds batch metadata documents; the persistence gateway
//! is the authoritative backend for mints, transfers and invoices. Both are
//! traits with sled-backed local implementations.

pub mod content_store;
pub mod persistence;
pub mod sled_gateway;

pub use content_store::{content_id_for, ContentRecord, ContentStore, SledContentStore};
pub use persistence::{
    apply_transfer, MintSubmission, PersistenceGateway, SaveResponse, TransferSubmission,
};
pub use sled_gateway::{MintRecord, SledGateway, TransferRecord};
