//! Content-addressed metadata storage
//!
//! Identifiers are CIDv0 style: base58 of the sha2-256 multihash over the
//! canonical JSON bytes, so equal documents always get equal identifiers.

use crate::error::{Result, TraceError};
use crate::utils::{
    base58_encode, canonical_json, current_timestamp, deserialize, serialize, sha256_digest,
};
use serde::{Deserialize, Serialize};
use sled::Db;
use std::path::Path;

const SHA2_256_CODE: u8 = 0x12;
const SHA2_256_LEN: u8 = 0x20;
const CONTENT_TREE: &str = "content";

/// Immutable pointer to an uploaded metadata document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContentRecord {
    pub locator: String,
    pub content_id: String,
    pub metadata: serde_json::Value,
    pub replication: u32,
}

pub trait ContentStore: Send + Sync {
    /// Upload a document and keep `replication` copies of it
    fn put(&self, metadata: &serde_json::Value, replication: u32) -> Result<ContentRecord>;
}

pub fn content_id_for(bytes: &[u8]) -> String {
    let mut multihash = vec![SHA2_256_CODE, SHA2_256_LEN];
    multihash.extend(sha256_digest(bytes));
    base58_encode(&multihash)
}

pub fn locator_for(content_id: &str) -> String {
    format!("ipfs://{content_id}")
}

#[derive(Serialize, Deserialize)]
struct StoredContent {
    metadata: serde_json::Value,
    replication: u32,
    stored_at: i64,
}

/// Local content store backed by sled
pub struct SledContentStore {
    db: Db,
    max_bytes: usize,
}

impl SledContentStore {
    pub fn open(path: &Path, max_bytes: usize) -> Result<SledContentStore> {
        let db = sled::open(path)
            .map_err(|e| TraceError::StorageTransport(format!("Failed to open content store: {e}")))?;
        Ok(SledContentStore { db, max_bytes })
    }

    pub fn get(&self, content_id: &str) -> Result<Option<ContentRecord>> {
        let tree = self.tree()?;
        let Some(bytes) = tree
            .get(content_id)
            .map_err(|e| TraceError::StorageTransport(format!("Failed to read content: {e}")))?
        else {
            return Ok(None);
        };
        let stored: StoredContent = deserialize(&bytes)?;
        Ok(Some(ContentRecord {
            locator: locator_for(content_id),
            content_id: content_id.to_string(),
            metadata: stored.metadata,
            replication: stored.replication,
        }))
    }

    fn tree(&self) -> Result<sled::Tree> {
        self.db
            .open_tree(CONTENT_TREE)
            .map_err(|e| TraceError::StorageTransport(format!("Failed to open content tree: {e}")))
    }
}

impl ContentStore for SledContentStore {
    fn put(&self, metadata: &serde_json::Value, replication: u32) -> Result<ContentRecord> {
        if replication == 0 {
            return Err(TraceError::StorageRejected(
                "Replication count must be at least 1".to_string(),
            ));
        }
        let bytes = canonical_json(metadata)?;
        if bytes.len() > self.max_bytes {
            return Err(TraceError::StorageRejected(format!(
                "Metadata is {} bytes, limit is {}",
                bytes.len(),
                self.max_bytes
            )));
        }
        let content_id = content_id_for(&bytes);
        let stored = StoredContent {
            metadata: metadata.clone(),
            replication,
            stored_at: current_timestamp()?,
        };
        let tree = self.tree()?;
        tree.insert(content_id.as_bytes(), serialize(&stored)?)
            .map_err(|e| TraceError::StorageTransport(format!("Failed to store content: {e}")))?;
        tree.flush()
            .map_err(|e| TraceError::StorageTransport(format!("Failed to flush content: {e}")))?;
        log::info!("Stored metadata as {content_id} ({} bytes, x{replication})", bytes.len());
        Ok(ContentRecord {
            locator: locator_for(&content_id),
            content_id,
            metadata: metadata.clone(),
            replication,
        })
    }
}
