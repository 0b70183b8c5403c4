// This is my sled-backed stand-in for the authoritative backend
// Mints, transfers and invoices each live in their own tree, records are JSON keyed by UUID
// Secondary "by transaction" trees make repeated saves of the same transaction return the first record

use crate::core::{Address, InvoiceStatus, TokenId, TransferInvoice};
use crate::error::{Result, TraceError};
use crate::storage::persistence::{
    apply_transfer, MintSubmission, PersistenceGateway, SaveResponse, TransferSubmission,
};
use crate::utils::{current_timestamp, deserialize, serialize};
use log::info;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use sled::{Db, Tree};
use std::path::Path;
use uuid::Uuid;

const MINTS_TREE: &str = "mints";
const MINTS_BY_TX_TREE: &str = "mints_by_tx";
const TRANSFERS_TREE: &str = "transfers";
const TRANSFERS_BY_TX_TREE: &str = "transfers_by_tx";
const INVOICES_TREE: &str = "invoices";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintRecord {
    pub id: String,
    pub saved_at: i64,
    #[serde(flatten)]
    pub submission: MintSubmission,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRecord {
    pub id: String,
    pub saved_at: i64,
    #[serde(flatten)]
    pub submission: TransferSubmission,
}

pub struct SledGateway {
    db: Db,
}

fn backend(e: sled::Error) -> TraceError {
    TraceError::Persistence(format!("Backend storage error: {e}"))
}

impl SledGateway {
    pub fn open(path: &Path) -> Result<SledGateway> {
        let db = sled::open(path).map_err(backend)?;
        Ok(SledGateway { db })
    }

    fn tree(&self, name: &str) -> Result<Tree> {
        self.db.open_tree(name).map_err(backend)
    }

    fn get_json<T: DeserializeOwned>(&self, tree: &str, key: &str) -> Result<Option<T>> {
        match self.tree(tree)?.get(key).map_err(backend)? {
            Some(bytes) => Ok(Some(deserialize(&bytes)?)),
            None => Ok(None),
        }
    }

    fn put_json<T: Serialize>(&self, tree: &str, key: &str, value: &T) -> Result<()> {
        let tree = self.tree(tree)?;
        tree.insert(key, serialize(value)?).map_err(backend)?;
        Ok(())
    }

    fn index_lookup(&self, tree: &str, tx_hash: &str) -> Result<Option<String>> {
        match self.tree(tree)?.get(tx_hash.to_ascii_lowercase()).map_err(backend)? {
            Some(bytes) => String::from_utf8(bytes.to_vec())
                .map(Some)
                .map_err(|e| TraceError::Persistence(format!("Corrupt index entry: {e}"))),
            None => Ok(None),
        }
    }

    fn index_insert(&self, tree: &str, tx_hash: &str, record_id: &str) -> Result<()> {
        self.tree(tree)?
            .insert(tx_hash.to_ascii_lowercase(), record_id.as_bytes())
            .map_err(backend)?;
        Ok(())
    }

    fn flush(&self) -> Result<()> {
        self.db.flush().map_err(backend)?;
        Ok(())
    }

    pub fn mint_record(&self, record_id: &str) -> Result<Option<MintRecord>> {
        self.get_json(MINTS_TREE, record_id)
    }

    pub fn transfer_record(&self, record_id: &str) -> Result<Option<TransferRecord>> {
        self.get_json(TRANSFERS_TREE, record_id)
    }

    /// Open a new pending invoice
    pub fn create_invoice(
        &self,
        batch_ref: &str,
        from: Address,
        to: Address,
        token_ids: Vec<TokenId>,
        amounts: Option<Vec<u64>>,
    ) -> Result<TransferInvoice> {
        let invoice = TransferInvoice::new(batch_ref, from, to, token_ids, amounts)?;
        self.save_invoice(&invoice)?;
        self.flush()?;
        info!("Created invoice {} for batch {batch_ref}", invoice.id);
        Ok(invoice)
    }

    pub fn mark_received(&self, invoice_id: &str) -> Result<TransferInvoice> {
        self.move_invoice(invoice_id, InvoiceStatus::Received)
    }

    pub fn cancel_invoice(&self, invoice_id: &str) -> Result<TransferInvoice> {
        self.move_invoice(invoice_id, InvoiceStatus::Cancelled)
    }

    pub fn list_invoices(&self) -> Result<Vec<TransferInvoice>> {
        let mut invoices = Vec::new();
        for item in self.tree(INVOICES_TREE)?.iter() {
            let (_, bytes) = item.map_err(backend)?;
            invoices.push(deserialize(&bytes)?);
        }
        Ok(invoices)
    }

    fn move_invoice(&self, invoice_id: &str, next: InvoiceStatus) -> Result<TransferInvoice> {
        let mut invoice = self
            .load_invoice(invoice_id)?
            .ok_or_else(|| TraceError::InvalidInvoice(format!("Unknown invoice {invoice_id}")))?;
        invoice.transition(next)?;
        self.save_invoice(&invoice)?;
        self.flush()?;
        info!("Invoice {invoice_id} is now {next}");
        Ok(invoice)
    }
}

impl PersistenceGateway for SledGateway {
    fn save_mint(&self, submission: &MintSubmission) -> Result<SaveResponse> {
        if let Some(existing) = self.index_lookup(MINTS_BY_TX_TREE, &submission.transaction_hash)? {
            info!(
                "Mint {} already recorded as {existing}",
                submission.transaction_hash
            );
            return Ok(SaveResponse::ok(existing));
        }
        if submission.token_ids.len() as u64 != submission.quantity {
            return Ok(SaveResponse {
                success: false,
                data: format!(
                    "{} identifiers for a quantity of {}",
                    submission.token_ids.len(),
                    submission.quantity
                ),
            });
        }
        let record = MintRecord {
            id: Uuid::new_v4().to_string(),
            saved_at: current_timestamp()?,
            submission: submission.clone(),
        };
        self.put_json(MINTS_TREE, &record.id, &record)?;
        self.index_insert(MINTS_BY_TX_TREE, &submission.transaction_hash, &record.id)?;
        self.flush()?;
        info!(
            "Recorded mint {} as {}",
            submission.transaction_hash, record.id
        );
        Ok(SaveResponse::ok(record.id))
    }

    fn save_transfer(&self, submission: &TransferSubmission) -> Result<SaveResponse> {
        let mut invoice = self.load_invoice(&submission.invoice_id)?.ok_or_else(|| {
            TraceError::Persistence(format!("Unknown invoice {}", submission.invoice_id))
        })?;
        if !apply_transfer(&mut invoice, submission)? {
            if let Some(existing) =
                self.index_lookup(TRANSFERS_BY_TX_TREE, &submission.transaction_hash)?
            {
                return Ok(SaveResponse::ok(existing));
            }
        }
        let record = TransferRecord {
            id: Uuid::new_v4().to_string(),
            saved_at: current_timestamp()?,
            submission: submission.clone(),
        };
        self.put_json(TRANSFERS_TREE, &record.id, &record)?;
        self.index_insert(TRANSFERS_BY_TX_TREE, &submission.transaction_hash, &record.id)?;
        self.save_invoice(&invoice)?;
        self.flush()?;
        info!(
            "Recorded transfer {} for invoice {}",
            submission.transaction_hash, invoice.id
        );
        Ok(SaveResponse::ok(record.id))
    }

    fn load_invoice(&self, invoice_id: &str) -> Result<Option<TransferInvoice>> {
        self.get_json(INVOICES_TREE, invoice_id)
    }

    fn save_invoice(&self, invoice: &TransferInvoice) -> Result<()> {
        self.put_json(INVOICES_TREE, &invoice.id, invoice)
    }
}
