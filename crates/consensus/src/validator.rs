//! Transaction, block and chain validation rules.
//!
//! These checks are stateless apart from the ledger or parent block passed
//! in. Execution and the replay check against the chain live in the chain
//! crate.

use std::collections::HashSet;
use thiserror::Error;
use wotschain_core::{Block, Hash, Ledger, Transaction, TransactionError};

/// Errors that can occur during validation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("transaction hash mismatch")]
    TransactionHashMismatch,

    #[error("transaction signature verification failed")]
    InvalidSignature,

    #[error("unknown sender {0}")]
    UnknownSender(String),

    #[error("insufficient balance (required {required}, available {available})")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("block index mismatch (expected {expected}, got {got})")]
    InvalidIndex { expected: u64, got: u64 },

    #[error("block prev_hash mismatch")]
    InvalidPrevHash,

    #[error("block hash does not match its fields")]
    InvalidBlockHash,

    #[error("duplicate transaction in block")]
    DuplicateTransaction,

    #[error("chain is empty")]
    EmptyChain,

    #[error("chain does not start at index 0 (got {0})")]
    InvalidGenesis(u64),
}

pub type Result<T> = std::result::Result<T, ValidationError>;

impl From<TransactionError> for ValidationError {
    fn from(err: TransactionError) -> Self {
        match err {
            TransactionError::HashMismatch => ValidationError::TransactionHashMismatch,
            TransactionError::Crypto(_) => ValidationError::InvalidSignature,
        }
    }
}

/// Transaction validator.
pub struct TransactionValidator;

impl TransactionValidator {
    /// Verify the hash and the MSS signature.
    pub fn validate_transaction(tx: &Transaction) -> Result<()> {
        tx.verify()?;
        Ok(())
    }

    /// Check the sender can fund the transfer in `ledger`.
    ///
    /// A sender with no ledger entry cannot spend anything.
    pub fn validate_against_state(tx: &Transaction, ledger: &Ledger) -> Result<()> {
        let account = ledger
            .get(&tx.sender)
            .ok_or_else(|| ValidationError::UnknownSender(tx.sender.to_hex()))?;

        if !account.has_balance(tx.amount) {
            return Err(ValidationError::InsufficientBalance {
                required: tx.amount,
                available: account.balance,
            });
        }

        Ok(())
    }

    /// Full transaction validation (hash + signature + state checks).
    pub fn validate_full(tx: &Transaction, ledger: &Ledger) -> Result<()> {
        Self::validate_transaction(tx)?;
        Self::validate_against_state(tx, ledger)?;
        Ok(())
    }
}

/// Block validator.
pub struct BlockValidator;

impl BlockValidator {
    /// Stored hash matches the fields and no transaction appears twice.
    pub fn validate_block_structure(block: &Block) -> Result<()> {
        if !block.has_valid_hash() {
            return Err(ValidationError::InvalidBlockHash);
        }

        let mut seen = HashSet::new();
        for tx in &block.transactions {
            if !seen.insert(tx.hash) {
                return Err(ValidationError::DuplicateTransaction);
            }
        }

        Ok(())
    }

    /// Validate block extends the parent correctly.
    pub fn validate_block_extends_parent(
        block: &Block,
        parent_hash: Hash,
        parent_index: u64,
    ) -> Result<()> {
        if block.index != parent_index + 1 {
            return Err(ValidationError::InvalidIndex {
                expected: parent_index + 1,
                got: block.index,
            });
        }

        if block.prev_hash != parent_hash {
            return Err(ValidationError::InvalidPrevHash);
        }

        Ok(())
    }

    /// Verify every transaction's hash and signature.
    pub fn validate_block_transactions(block: &Block) -> Result<()> {
        for tx in &block.transactions {
            TransactionValidator::validate_transaction(tx)?;
        }
        Ok(())
    }

    /// Full block validation (structure + parent + transactions).
    pub fn validate_full(block: &Block, parent: &Block) -> Result<()> {
        Self::validate_block_structure(block)?;
        Self::validate_block_extends_parent(block, parent.hash, parent.index)?;
        Self::validate_block_transactions(block)?;
        Ok(())
    }
}

/// Whole-chain validator.
pub struct ChainValidator;

impl ChainValidator {
    /// Check linkage of a chain.
    ///
    /// The first block must have index 0, and every later block must follow
    /// its predecessor by one index, point at its hash, and carry a hash that
    /// matches its own fields. Work, signatures and balances are not checked
    /// here.
    pub fn validate_chain(blocks: &[Block]) -> Result<()> {
        let first = blocks.first().ok_or(ValidationError::EmptyChain)?;
        if first.index != 0 {
            return Err(ValidationError::InvalidGenesis(first.index));
        }
        if !first.has_valid_hash() {
            return Err(ValidationError::InvalidBlockHash);
        }

        for pair in blocks.windows(2) {
            let (parent, block) = (&pair[0], &pair[1]);
            Self::validate_link(parent, block)?;
        }

        Ok(())
    }

    fn validate_link(parent: &Block, block: &Block) -> Result<()> {
        BlockValidator::validate_block_extends_parent(block, parent.hash, parent.index)?;
        if !block.has_valid_hash() {
            return Err(ValidationError::InvalidBlockHash);
        }
        Ok(())
    }
}
