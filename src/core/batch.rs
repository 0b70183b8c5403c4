//! Production batch requests and their validation
//!
//! Validation is purely local and happens before any I/O. A request that
//! passes becomes a [`ValidatedBatch`] carrying the normalized batch code and
//! the derived expiry date.

use crate::error::{Result, TraceError};
use chrono::{Months, NaiveDate};
use serde::{Deserialize, Serialize};
use serde_json::json;

pub const MAX_BATCH_CODE_LEN: usize = 30;
/// Exclusive upper bound
pub const MAX_QUANTITY: u64 = 10_000_000;
pub const MFG_WINDOW_DAYS: i64 = 60;
pub const MAX_SHELF_LIFE_MONTHS: u32 = 120;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchRequest {
    pub drug_id: String,
    pub batch_code: String,
    pub quantity: u64,
    pub mfg_date: NaiveDate,
    pub shelf_life_months: u32,
    #[serde(default)]
    pub notes: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidatedBatch {
    pub drug_id: String,
    pub batch_code: String,
    pub quantity: u64,
    pub mfg_date: NaiveDate,
    pub expiry_date: NaiveDate,
    pub notes: String,
}

/// Source of "today" for the manufacturing-date window
pub trait Clock: Send + Sync {
    fn today(&self) -> NaiveDate;
}

pub struct SystemClock;

impl Clock for SystemClock {
    fn today(&self) -> NaiveDate {
        chrono::Local::now().date_naive()
    }
}

/// A clock pinned to one day
pub struct FixedClock(pub NaiveDate);

impl Clock for FixedClock {
    fn today(&self) -> NaiveDate {
        self.0
    }
}

/// Trim and upper-case a batch code, then check it is 1-30 ASCII letters/digits
pub fn normalize_batch_code(raw: &str) -> Result<String> {
    let code = raw.trim().to_ascii_uppercase();
    if code.is_empty() {
        return Err(TraceError::Validation("Batch code is required".to_string()));
    }
    if code.len() > MAX_BATCH_CODE_LEN {
        return Err(TraceError::Validation(format!(
            "Batch code must be at most {MAX_BATCH_CODE_LEN} characters"
        )));
    }
    if !code.bytes().all(|b| b.is_ascii_alphanumeric()) {
        return Err(TraceError::Validation(format!(
            "Batch code '{raw}' may only contain letters and digits"
        )));
    }
    Ok(code)
}

impl BatchRequest {
    pub fn validate(&self, today: NaiveDate) -> Result<ValidatedBatch> {
        let drug_id = self.drug_id.trim();
        if drug_id.is_empty() {
            return Err(TraceError::Validation("Drug reference is required".to_string()));
        }

        let batch_code = normalize_batch_code(&self.batch_code)?;

        if self.quantity < 1 || self.quantity >= MAX_QUANTITY {
            return Err(TraceError::Validation(format!(
                "Quantity must be between 1 and {}",
                MAX_QUANTITY - 1
            )));
        }

        let earliest = today - chrono::Duration::days(MFG_WINDOW_DAYS);
        if self.mfg_date > today {
            return Err(TraceError::Validation(
                "Manufacturing date cannot be in the future".to_string(),
            ));
        }
        if self.mfg_date < earliest {
            return Err(TraceError::Validation(format!(
                "Manufacturing date must be within the last {MFG_WINDOW_DAYS} days"
            )));
        }

        if self.shelf_life_months == 0 || self.shelf_life_months > MAX_SHELF_LIFE_MONTHS {
            return Err(TraceError::Validation(format!(
                "Shelf life must be between 1 and {MAX_SHELF_LIFE_MONTHS} months"
            )));
        }
        let expiry_date = self
            .mfg_date
            .checked_add_months(Months::new(self.shelf_life_months))
            .ok_or_else(|| TraceError::Validation("Expiry date out of range".to_string()))?;
        if expiry_date <= self.mfg_date {
            return Err(TraceError::Validation(
                "Expiry date must be after manufacturing date".to_string(),
            ));
        }

        Ok(ValidatedBatch {
            drug_id: drug_id.to_string(),
            batch_code,
            quantity: self.quantity,
            mfg_date: self.mfg_date,
            expiry_date,
            notes: self.notes.trim().to_string(),
        })
    }
}

impl ValidatedBatch {
    /// Metadata document uploaded to the content store for this batch
    pub fn metadata(&self) -> serde_json::Value {
        json!({
            "name": format!("{} batch {}", self.drug_id, self.batch_code),
            "description": self.notes,
            "properties": {
                "drugId": self.drug_id,
                "batchNumber": self.batch_code,
                "quantity": self.quantity,
                "mfgDate": self.mfg_date.to_string(),
                "expDate": self.expiry_date.to_string(),
            },
        })
    }
}
