//! Wire envelope exchanged between nodes.
//!
//! Every message is a JSON object `{"rpc": <verb>, "payload": <string>}`.
//! The payload is itself the JSON encoding of a block, chain or transaction,
//! or empty for a chain request.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use wotschain_chain::Blockchain;
use wotschain_core::{Block, Transaction};

/// Errors raised while decoding messages.
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, CodecError>;

/// Remote procedure verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Rpc {
    /// Ask a peer for its whole chain.
    BlockchainRequest,
    /// A peer's chain, in answer to a request.
    BlockchainReception,
    /// A freshly mined block.
    BlockReception,
    /// A signed transfer to admit.
    TransactionRequest,
}

/// The envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub rpc: Rpc,
    #[serde(default)]
    pub payload: String,
}

impl Message {
    fn with_payload<T: Serialize>(rpc: Rpc, value: &T) -> Self {
        let payload = serde_json::to_string(value).expect("serialization should not fail");
        Self { rpc, payload }
    }

    pub fn blockchain_request() -> Self {
        Self {
            rpc: Rpc::BlockchainRequest,
            payload: String::new(),
        }
    }

    pub fn blockchain_reception(chain: &Blockchain) -> Self {
        Self::with_payload(Rpc::BlockchainReception, chain)
    }

    pub fn block_reception(block: &Block) -> Self {
        Self::with_payload(Rpc::BlockReception, block)
    }

    pub fn transaction_request(tx: &Transaction) -> Self {
        Self::with_payload(Rpc::TransactionRequest, tx)
    }

    /// Serialize the envelope.
    pub fn encode(&self) -> Vec<u8> {
        serde_json::to_vec(self).expect("serialization should not fail")
    }

    /// Parse an envelope. Unknown verbs are a decode error.
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(bytes)?)
    }

    /// Parse the payload as `T`.
    pub fn decode_payload<T: DeserializeOwned>(&self) -> Result<T> {
        Ok(serde_json::from_str(&self.payload)?)
    }
}
