//! Transaction types and signing.

use crate::crypto::{Address, CryptoError};
use crate::hash::{hash, Hash};
use crate::mss::{MerkleSigTree, MssSignature};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

/// Errors that can occur during transaction operations.
#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("transaction hash does not match its contents")]
    HashMismatch,
    #[error(transparent)]
    Crypto(#[from] CryptoError),
}

/// A value transfer between two addresses.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Sender's address (MSS root).
    pub sender: Address,
    /// Recipient's address.
    pub receiver: Address,
    /// Value to transfer.
    pub amount: u64,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Digest over sender, receiver, amount and timestamp.
    pub hash: Hash,
    /// Sender's MSS signature over `hash`.
    pub signature: MssSignature,
}

/// The hashed part of a transaction.
#[derive(Serialize)]
struct TransactionPreimage<'a> {
    sender: &'a Address,
    receiver: &'a Address,
    amount: u64,
    timestamp: u64,
}

impl Transaction {
    /// Create a transfer stamped with the current time and sign it with the
    /// sender's tree. Consumes one leaf of `signer`.
    pub fn transfer(
        signer: &mut MerkleSigTree,
        receiver: Address,
        amount: u64,
    ) -> Result<Self, TransactionError> {
        Self::transfer_at(signer, receiver, amount, current_timestamp())
    }

    /// Same as [`Transaction::transfer`] with an explicit timestamp.
    pub fn transfer_at(
        signer: &mut MerkleSigTree,
        receiver: Address,
        amount: u64,
        timestamp: u64,
    ) -> Result<Self, TransactionError> {
        let sender = signer.public_key();
        let hash = Self::compute_hash(&sender, &receiver, amount, timestamp);
        let signature = signer.sign(&hash)?;
        Ok(Self {
            sender,
            receiver,
            amount,
            timestamp,
            hash,
            signature,
        })
    }

    /// Digest over the transfer fields.
    pub fn compute_hash(sender: &Address, receiver: &Address, amount: u64, timestamp: u64) -> Hash {
        let preimage = TransactionPreimage {
            sender,
            receiver,
            amount,
            timestamp,
        };
        let encoded = bincode::serialize(&preimage).expect("serialization should not fail");
        hash(&encoded)
    }

    /// Recompute the hash from this transaction's fields.
    pub fn recompute_hash(&self) -> Hash {
        Self::compute_hash(&self.sender, &self.receiver, self.amount, self.timestamp)
    }

    /// Check the stored hash against the fields.
    pub fn verify_hash(&self) -> Result<(), TransactionError> {
        if self.recompute_hash() == self.hash {
            Ok(())
        } else {
            Err(TransactionError::HashMismatch)
        }
    }

    /// Verify the hash and the sender's signature over it.
    pub fn verify(&self) -> Result<(), TransactionError> {
        self.verify_hash()?;
        self.signature.verify(&self.sender, &self.hash)?;
        Ok(())
    }
}

/// Get the current Unix timestamp.
pub fn current_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}
