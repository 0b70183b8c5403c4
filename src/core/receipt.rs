//! Confirmed transaction receipts and the event decoding step
//!
//! A [`MintReceipt`] is produced once per submitted transaction and never
//! mutated. Its raw logs are decoded into a closed set of [`DecodedEvent`]
//! variants so reconciliation can match on shape instead of probing fields.

use crate::core::{Address, TokenId};
use crate::error::{Result, TraceError};
use crate::utils::{decode_hex, to_hex_prefixed};
use alloy_primitives::{B256, U256};
use alloy_sol_types::{SolEvent, TopicList};
use serde::{Deserialize, Serialize};

// Event ABI of the batch contract. `BatchMinted` is its own; the transfer
// events are the ERC-1155 ones plus the ERC-721 `Transfer` with an indexed id.
mod contract {
    alloy_sol_types::sol! {
        event BatchMinted(address indexed to, uint256[] ids, uint256[] amounts);
        event TransferSingle(
            address indexed operator,
            address indexed from,
            address indexed to,
            uint256 id,
            uint256 value
        );
        event TransferBatch(
            address indexed operator,
            address indexed from,
            address indexed to,
            uint256[] ids,
            uint256[] values
        );
        event Transfer(address indexed from, address indexed to, uint256 indexed id);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReceiptStatus {
    Success,
    Reverted,
}

/// One raw log entry as returned by the node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEntry {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MintReceipt {
    pub transaction_hash: String,
    pub block_number: u64,
    pub status: ReceiptStatus,
    pub logs: Vec<LogEntry>,
}

impl MintReceipt {
    pub fn is_success(&self) -> bool {
        self.status == ReceiptStatus::Success
    }

    /// Decoded events in log order
    pub fn events(&self) -> Vec<DecodedEvent> {
        self.logs.iter().map(LogEntry::decode).collect()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DecodedEvent {
    /// Contract-specific batch mint: identifiers in contract order
    BatchMint {
        to: Address,
        ids: Vec<TokenId>,
        amounts: Vec<U256>,
    },
    TransferSingle {
        operator: Address,
        from: Address,
        to: Address,
        id: TokenId,
        value: U256,
    },
    TransferBatch {
        operator: Address,
        from: Address,
        to: Address,
        ids: Vec<TokenId>,
        values: Vec<U256>,
    },
    Unknown,
}

impl DecodedEvent {
    /// Identifiers created by this event if it is a transfer out of the zero address
    pub fn minted_ids(&self) -> Option<Vec<TokenId>> {
        match self {
            DecodedEvent::TransferSingle { from, .. } | DecodedEvent::TransferBatch { from, .. }
                if !from.is_zero() =>
            {
                None
            }
            _ => self.transferred_ids(),
        }
    }

    /// `(from, to, ids)` of a transfer event of either shape
    pub fn transfer_parts(&self) -> Option<(Address, Address, Vec<TokenId>)> {
        match self {
            DecodedEvent::TransferSingle { from, to, id, .. } => {
                Some((*from, *to, vec![id.clone()]))
            }
            DecodedEvent::TransferBatch { from, to, ids, .. } => Some((*from, *to, ids.clone())),
            _ => None,
        }
    }

    fn transferred_ids(&self) -> Option<Vec<TokenId>> {
        self.transfer_parts().map(|(_, _, ids)| ids)
    }
}

fn to_ids(values: Vec<U256>) -> Vec<TokenId> {
    values.into_iter().map(TokenId::from).collect()
}

impl LogEntry {
    /// Decode into a known event; malformed or foreign logs become `Unknown`
    pub fn decode(&self) -> DecodedEvent {
        match self.try_decode() {
            Ok(event) => event,
            Err(e) => {
                log::debug!("Treating log from {} as unknown: {e}", self.address);
                DecodedEvent::Unknown
            }
        }
    }

    fn try_decode(&self) -> Result<DecodedEvent> {
        let topics = self
            .topics
            .iter()
            .map(|raw| parse_topic(raw))
            .collect::<Result<Vec<B256>>>()?;
        let Some(topic0) = topics.first().copied() else {
            return Ok(DecodedEvent::Unknown);
        };
        let data = decode_hex(&self.data)?;

        if topic0 == contract::BatchMinted::SIGNATURE_HASH {
            let event: contract::BatchMinted = decode_event(&topics, &data)?;
            return Ok(DecodedEvent::BatchMint {
                to: event.to.into(),
                ids: to_ids(event.ids),
                amounts: event.amounts,
            });
        }
        if topic0 == contract::TransferSingle::SIGNATURE_HASH {
            let event: contract::TransferSingle = decode_event(&topics, &data)?;
            return Ok(DecodedEvent::TransferSingle {
                operator: event.operator.into(),
                from: event.from.into(),
                to: event.to.into(),
                id: TokenId::from(event.id),
                value: event.value,
            });
        }
        if topic0 == contract::TransferBatch::SIGNATURE_HASH {
            let event: contract::TransferBatch = decode_event(&topics, &data)?;
            return Ok(DecodedEvent::TransferBatch {
                operator: event.operator.into(),
                from: event.from.into(),
                to: event.to.into(),
                ids: to_ids(event.ids),
                values: event.values,
            });
        }
        // ERC-20 shares the `Transfer` signature but indexes one topic fewer
        // and carries an amount, not an id; it stays unknown.
        if topic0 == contract::Transfer::SIGNATURE_HASH && topics.len() == 4 {
            let event: contract::Transfer = decode_event(&topics, &data)?;
            return Ok(DecodedEvent::TransferSingle {
                operator: event.from.into(),
                from: event.from.into(),
                to: event.to.into(),
                id: TokenId::from(event.id),
                value: U256::from(1u64),
            });
        }
        Ok(DecodedEvent::Unknown)
    }

    pub fn batch_minted(
        contract: &Address,
        to: &Address,
        ids: &[TokenId],
        amounts: &[u64],
    ) -> LogEntry {
        LogEntry::from_event(
            contract,
            &contract::BatchMinted {
                to: (*to).into(),
                ids: ids.iter().map(TokenId::as_u256).collect(),
                amounts: amounts.iter().map(|a| U256::from(*a)).collect(),
            },
        )
    }

    pub fn transfer_single(
        contract: &Address,
        operator: &Address,
        from: &Address,
        to: &Address,
        id: &TokenId,
        value: u64,
    ) -> LogEntry {
        LogEntry::from_event(
            contract,
            &contract::TransferSingle {
                operator: (*operator).into(),
                from: (*from).into(),
                to: (*to).into(),
                id: id.as_u256(),
                value: U256::from(value),
            },
        )
    }

    pub fn transfer_batch(
        contract: &Address,
        operator: &Address,
        from: &Address,
        to: &Address,
        ids: &[TokenId],
        values: &[u64],
    ) -> LogEntry {
        LogEntry::from_event(
            contract,
            &contract::TransferBatch {
                operator: (*operator).into(),
                from: (*from).into(),
                to: (*to).into(),
                ids: ids.iter().map(TokenId::as_u256).collect(),
                values: values.iter().map(|v| U256::from(*v)).collect(),
            },
        )
    }

    fn from_event<E: SolEvent>(contract: &Address, event: &E) -> LogEntry {
        let encoded = event.encode_log_data();
        LogEntry {
            address: contract.to_string(),
            topics: encoded
                .topics()
                .iter()
                .map(|topic| to_hex_prefixed(topic.as_slice()))
                .collect(),
            data: to_hex_prefixed(encoded.data.as_ref()),
        }
    }
}

fn parse_topic(raw: &str) -> Result<B256> {
    let bytes = decode_hex(raw)?;
    B256::try_from(bytes.as_slice())
        .map_err(|_| TraceError::Decode(format!("Topic '{raw}' is not 32 bytes")))
}

// Indexed fields must fill exactly the topics the event declares
fn decode_event<E: SolEvent>(topics: &[B256], data: &[u8]) -> Result<E> {
    let expected = <E::TopicList as TopicList>::COUNT;
    if topics.len() != expected {
        return Err(TraceError::Decode(format!(
            "{} expects {expected} topics, found {}",
            E::SIGNATURE,
            topics.len()
        )));
    }
    E::decode_raw_log(topics.iter().copied(), data, true)
        .map_err(|e| TraceError::Decode(format!("{}: {e}", E::SIGNATURE)))
}
