use crate::core::{Address, TokenId};
use crate::error::{Result, TraceError};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum InvoiceStatus {
    Pending,
    Sent,
    Received,
    Cancelled,
}

impl fmt::Display for InvoiceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InvoiceStatus::Pending => write!(f, "pending"),
            InvoiceStatus::Sent => write!(f, "sent"),
            InvoiceStatus::Received => write!(f, "received"),
            InvoiceStatus::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// A transfer of already-minted identifiers between two parties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferInvoice {
    pub id: String,
    pub batch_ref: String,
    pub from: Address,
    pub to: Address,
    pub token_ids: Vec<TokenId>,
    /// Per-identifier amounts for a batch transfer; may be absent or misaligned
    #[serde(default)]
    pub amounts: Option<Vec<u64>>,
    pub status: InvoiceStatus,
    #[serde(default)]
    pub transaction_hash: Option<String>,
}

impl TransferInvoice {
    pub fn new(
        batch_ref: &str,
        from: Address,
        to: Address,
        token_ids: Vec<TokenId>,
        amounts: Option<Vec<u64>>,
    ) -> Result<TransferInvoice> {
        if token_ids.is_empty() {
            return Err(TraceError::InvalidInvoice(
                "An invoice must move at least one identifier".to_string(),
            ));
        }
        if to.is_zero() {
            return Err(TraceError::InvalidInvoice(
                "Destination cannot be the zero address".to_string(),
            ));
        }
        if from == to {
            return Err(TraceError::InvalidInvoice(
                "Sender and destination are the same".to_string(),
            ));
        }
        Ok(TransferInvoice {
            id: uuid::Uuid::new_v4().to_string(),
            batch_ref: batch_ref.to_string(),
            from,
            to,
            token_ids,
            amounts,
            status: InvoiceStatus::Pending,
            transaction_hash: None,
        })
    }

    /// Only pending invoices may be (re)submitted on-chain
    pub fn ensure_retryable(&self) -> Result<()> {
        match self.status {
            InvoiceStatus::Pending => Ok(()),
            other => Err(TraceError::InvalidInvoice(format!(
                "Invoice {} is {other}; only pending invoices can be retried",
                self.id
            ))),
        }
    }

    /// Move along `pending -> sent -> received`, or to `cancelled` from `pending`
    pub fn transition(&mut self, next: InvoiceStatus) -> Result<()> {
        let allowed = matches!(
            (self.status, next),
            (InvoiceStatus::Pending, InvoiceStatus::Sent)
                | (InvoiceStatus::Pending, InvoiceStatus::Cancelled)
                | (InvoiceStatus::Sent, InvoiceStatus::Received)
        );
        if !allowed {
            return Err(TraceError::InvalidInvoice(format!(
                "Invoice {} cannot move from {} to {next}",
                self.id, self.status
            )));
        }
        self.status = next;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn invoice() -> TransferInvoice {
        TransferInvoice::new(
            "LOT1",
            Address::parse("0x1111111111111111111111111111111111111111").unwrap(),
            Address::parse("0x2222222222222222222222222222222222222222").unwrap(),
            vec![TokenId::from(1), TokenId::from(2)],
            Some(vec![1, 1]),
        )
        .unwrap()
    }

    #[test]
    fn test_lifecycle() {
        let mut inv = invoice();
        assert_eq!(inv.status, InvoiceStatus::Pending);
        inv.transition(InvoiceStatus::Sent).unwrap();
        assert!(inv.ensure_retryable().is_err());
        inv.transition(InvoiceStatus::Received).unwrap();
        assert!(inv.transition(InvoiceStatus::Cancelled).is_err());
    }

    #[test]
    fn test_cannot_cancel_after_sent() {
        let mut inv = invoice();
        inv.transition(InvoiceStatus::Sent).unwrap();
        assert!(inv.transition(InvoiceStatus::Cancelled).is_err());
    }

    #[test]
    fn test_empty_invoice_rejected() {
        let from = Address::parse("0x1111111111111111111111111111111111111111").unwrap();
        let to = Address::parse("0x2222222222222222222222222222222222222222").unwrap();
        assert!(TransferInvoice::new("LOT1", from, to, vec![], None).is_err());
        assert!(TransferInvoice::new("LOT1", from, from, vec![TokenId::from(1)], None).is_err());
        assert!(
            TransferInvoice::new("LOT1", from, Address::ZERO, vec![TokenId::from(1)], None)
                .is_err()
        );
    }

    #[test]
    fn test_json_shape() {
        let inv = invoice();
        let json = serde_json::to_value(&inv).unwrap();
        assert_eq!(json["status"], "pending");
        assert_eq!(json["tokenIds"][1], "2");
        let back: TransferInvoice = serde_json::from_value(json).unwrap();
        assert_eq!(back, inv);
    }
}
