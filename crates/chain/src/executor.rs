//! Block execution engine.
//!
//! Executes the transfers of a block against a scratch copy of the ledger
//! and reports the resulting state commitment. The caller decides whether to
//! commit the new ledger.

use thiserror::Error;
use wotschain_core::{Block, Hash, Ledger, LedgerError, Transaction};

/// Errors that can occur during execution.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionError {
    #[error("transaction {tx} failed: {source}")]
    Transaction {
        tx: Hash,
        #[source]
        source: LedgerError,
    },

    #[error("block reward could not be credited: {0}")]
    Reward(#[source] LedgerError),
}

pub type Result<T> = std::result::Result<T, ExecutionError>;

/// Result of executing a block.
#[derive(Debug, Clone)]
pub struct BlockExecutionResult {
    /// Block hash.
    pub block_hash: Hash,
    /// Number of transfers applied.
    pub tx_count: usize,
    /// Ledger after the block.
    pub ledger: Ledger,
    /// Commitment of `ledger`.
    pub state_root: Hash,
}

/// Block executor.
pub struct Executor<'a> {
    /// Ledger at the parent block.
    ledger: &'a Ledger,
}

impl<'a> Executor<'a> {
    /// Create a new executor on top of `ledger`.
    pub fn new(ledger: &'a Ledger) -> Self {
        Self { ledger }
    }

    /// Apply a single transfer: debit the sender, credit the receiver.
    pub fn apply_transaction(ledger: &mut Ledger, tx: &Transaction) -> Result<()> {
        ledger
            .transfer(&tx.sender, &tx.receiver, tx.amount)
            .map_err(|source| ExecutionError::Transaction {
                tx: tx.hash,
                source,
            })
    }

    /// Execute every transfer in order, then mint the reward to the miner.
    ///
    /// The parent ledger is left untouched.
    pub fn execute_block(&self, block: &Block) -> Result<BlockExecutionResult> {
        let mut ledger = self.ledger.clone();

        for tx in &block.transactions {
            Self::apply_transaction(&mut ledger, tx)?;
        }

        ledger
            .credit(&block.miner_address, block.reward)
            .map_err(ExecutionError::Reward)?;

        let state_root = ledger.state_commitment();
        Ok(BlockExecutionResult {
            block_hash: block.hash,
            tx_count: block.transactions.len(),
            ledger,
            state_root,
        })
    }

    /// Split `candidates` into the transfers that still execute in order on
    /// top of the parent ledger and the ones that no longer do.
    pub fn select_executable(
        &self,
        candidates: Vec<Transaction>,
    ) -> (Vec<Transaction>, Vec<Transaction>) {
        let mut scratch = self.ledger.clone();
        let mut included = Vec::new();
        let mut dropped = Vec::new();

        for tx in candidates {
            match Self::apply_transaction(&mut scratch, &tx) {
                Ok(()) => included.push(tx),
                Err(_) => dropped.push(tx),
            }
        }

        (included, dropped)
    }
}
