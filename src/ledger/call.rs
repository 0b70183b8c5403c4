use crate::core::{Address, TokenId};
use crate::error::Result;
use crate::utils::{current_timestamp, serialize};
use serde::{Deserialize, Serialize};

/// A contract call waiting for a signature
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "camelCase")]
pub enum ContractCall {
    /// Mint one identifier per amount entry, all pointing at `token_uri`
    MintBatch {
        contract: Address,
        token_uri: String,
        amounts: Vec<u64>,
    },
    /// One call moving every id with its aligned amount
    TransferBatch {
        contract: Address,
        from: Address,
        to: Address,
        ids: Vec<TokenId>,
        amounts: Vec<u64>,
    },
    /// Ids moved one at a time with an amount of one each, in a single transaction
    TransferSingle {
        contract: Address,
        from: Address,
        to: Address,
        ids: Vec<TokenId>,
    },
}

impl ContractCall {
    pub fn method(&self) -> &'static str {
        match self {
            ContractCall::MintBatch { .. } => "mintBatch",
            ContractCall::TransferBatch { .. } => "safeBatchTransferFrom",
            ContractCall::TransferSingle { .. } => "safeTransferFrom",
        }
    }

    pub fn contract(&self) -> &Address {
        match self {
            ContractCall::MintBatch { contract, .. }
            | ContractCall::TransferBatch { contract, .. }
            | ContractCall::TransferSingle { contract, .. } => contract,
        }
    }

    /// Bytes covered by the signature
    pub fn signing_payload(&self, nonce: u64) -> Result<Vec<u8>> {
        let mut payload = serialize(self)?;
        payload.extend_from_slice(&nonce.to_be_bytes());
        Ok(payload)
    }
}

/// A call signed by a wallet, ready for broadcast
#[derive(Debug, Clone)]
pub struct SignedCall {
    pub call: ContractCall,
    pub signer: Address,
    pub public_key: Vec<u8>,
    pub nonce: u64,
    pub signature: Vec<u8>,
}

/// Handle to a broadcast transaction
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTx {
    pub tx_hash: String,
    pub submitted_at: i64,
}

impl PendingTx {
    pub fn new(tx_hash: String) -> Result<PendingTx> {
        Ok(PendingTx {
            tx_hash,
            submitted_at: current_timestamp()?,
        })
    }
}
