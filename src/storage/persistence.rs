use crate::core::{InvoiceStatus, TokenId, TransferInvoice};
use crate::error::{Result, TraceError};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

/// A reconciled mint handed to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintSubmission {
    pub drug_id: String,
    pub token_ids: Vec<TokenId>,
    pub transaction_hash: String,
    pub quantity: u64,
    pub content_locator: String,
    #[serde(default)]
    pub mfg_date: Option<NaiveDate>,
    #[serde(default)]
    pub exp_date: Option<NaiveDate>,
    #[serde(default)]
    pub batch_number: Option<String>,
    pub metadata: serde_json::Value,
    /// Part of `token_ids` was synthesized during reconciliation
    #[serde(default)]
    pub heuristic_ids: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferSubmission {
    pub invoice_id: String,
    pub transaction_hash: String,
    pub token_ids: Vec<TokenId>,
}

/// Backend reply: `{success, data}` where `data` is the durable record id
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SaveResponse {
    pub success: bool,
    pub data: String,
}

impl SaveResponse {
    pub fn ok(record_id: String) -> SaveResponse {
        SaveResponse {
            success: true,
            data: record_id,
        }
    }

    /// Turn an unsuccessful reply into an error, otherwise hand back the record id
    pub fn into_record_id(self) -> Result<String> {
        if !self.success {
            return Err(TraceError::Persistence(format!(
                "Backend refused the record: {}",
                self.data
            )));
        }
        Ok(self.data)
    }
}

/// The authoritative backend
pub trait PersistenceGateway: Send + Sync {
    fn save_mint(&self, submission: &MintSubmission) -> Result<SaveResponse>;

    fn save_transfer(&self, submission: &TransferSubmission) -> Result<SaveResponse>;

    fn load_invoice(&self, invoice_id: &str) -> Result<Option<TransferInvoice>>;

    fn save_invoice(&self, invoice: &TransferInvoice) -> Result<()>;
}

/// Apply a confirmed transfer to its invoice.
///
/// Returns `false` when the invoice already records this exact transaction, so
/// a repeated save after a lost reply does not fail.
pub fn apply_transfer(
    invoice: &mut TransferInvoice,
    submission: &TransferSubmission,
) -> Result<bool> {
    if invoice.status == InvoiceStatus::Sent
        && invoice.transaction_hash.as_deref() == Some(submission.transaction_hash.as_str())
    {
        return Ok(false);
    }
    if submission.token_ids != invoice.token_ids {
        return Err(TraceError::Persistence(format!(
            "Transfer for invoice {} lists different identifiers than the invoice",
            invoice.id
        )));
    }
    invoice.transition(InvoiceStatus::Sent)?;
    invoice.transaction_hash = Some(submission.transaction_hash.clone());
    Ok(true)
}
