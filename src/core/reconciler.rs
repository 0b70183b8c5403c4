// This file turns a confirmed mint receipt into the authoritative list of minted identifiers
// The order of the checks below is fixed: other systems read the same receipts the same way

use crate::core::batch::MAX_QUANTITY;
use crate::core::receipt::{DecodedEvent, MintReceipt};
use crate::core::TokenId;
use crate::error::{Result, TraceError};
use log::{info, warn};
use serde::{Deserialize, Serialize};

/// The reconciled outcome of a mint: strictly increasing, no duplicates,
/// exactly as long as the quantity asked for.
///
/// A receipt that lists fewer identifiers than were minted still reconciles;
/// the set is then completed sequentially above the highest listed id and
/// flagged through [`TokenIdSet::is_heuristic`]. That flag is the only
/// partial outcome: there is no separate error for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenIdSet {
    ids: Vec<TokenId>,
    heuristic: bool,
}

impl TokenIdSet {
    pub fn ids(&self) -> &[TokenId] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// True when part of the set was synthesized rather than read from the receipt
    pub fn is_heuristic(&self) -> bool {
        self.heuristic
    }
}

// Where the identifiers were found
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum MintSource {
    BatchMintEvent,
    ZeroAddressTransfers,
}

pub struct ReceiptReconciler;

impl ReceiptReconciler {
    pub fn reconcile(receipt: &MintReceipt, expected_quantity: usize) -> Result<TokenIdSet> {
        if expected_quantity < 1 || expected_quantity as u64 >= MAX_QUANTITY {
            return Err(TraceError::Validation(format!(
                "Expected quantity must be between 1 and {}, got {expected_quantity}",
                MAX_QUANTITY - 1
            )));
        }
        let events = receipt.events();

        // I take the contract's own batch-mint event verbatim when it is there
        let (mut ids, source) = match Self::first_batch_mint(&events) {
            Some(ids) => (ids, MintSource::BatchMintEvent),
            None => (
                Self::zero_address_transfers(&events),
                MintSource::ZeroAddressTransfers,
            ),
        };

        if ids.is_empty() {
            warn!(
                "No mint events matched in receipt {}",
                receipt.transaction_hash
            );
            return Err(TraceError::NoEventsMatched {
                tx_hash: receipt.transaction_hash.clone(),
            });
        }

        // Numeric sort; the chain guarantees uniqueness so there is no dedup pass
        ids.sort();

        let mut heuristic = false;
        if ids.len() < expected_quantity {
            // Assumes the contract hands out identifiers sequentially. If it ever
            // stops doing that, this attributes tokens that were never minted here.
            let missing = expected_quantity - ids.len();
            warn!(
                "Receipt {} lists {} of {} identifiers; synthesizing {} above the highest",
                receipt.transaction_hash,
                ids.len(),
                expected_quantity,
                missing
            );
            let mut last = ids[ids.len() - 1].clone();
            for _ in 0..missing {
                last = last.next().ok_or_else(|| {
                    TraceError::Decode(format!("Cannot synthesize identifiers above {last}"))
                })?;
                ids.push(last.clone());
            }
            heuristic = true;
        } else if ids.len() > expected_quantity {
            ids.truncate(expected_quantity);
        }

        info!(
            "Reconciled {} identifiers from receipt {} via {:?}",
            ids.len(),
            receipt.transaction_hash,
            source
        );
        Ok(TokenIdSet { ids, heuristic })
    }

    fn first_batch_mint(events: &[DecodedEvent]) -> Option<Vec<TokenId>> {
        events.iter().find_map(|event| match event {
            DecodedEvent::BatchMint { ids, .. } if !ids.is_empty() => Some(ids.clone()),
            _ => None,
        })
    }

    fn zero_address_transfers(events: &[DecodedEvent]) -> Vec<TokenId> {
        events.iter().filter_map(DecodedEvent::minted_ids).flatten().collect()
    }
}
