//! Transaction mempool for pending transactions.
//!
//! The mempool stores admitted transfers waiting to be included in a block.
//! It performs no validation of its own; admission checks run before `add`.

use std::collections::{HashMap, VecDeque};
use thiserror::Error;
use wotschain_core::{Address, Hash, Transaction};

/// Errors that can occur during mempool operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MempoolError {
    #[error("transaction already in mempool")]
    DuplicateTransaction,

    #[error("mempool is full (capacity: {0})")]
    MempoolFull(usize),

    #[error("transaction not found in mempool")]
    TransactionNotFound,
}

pub type Result<T> = std::result::Result<T, MempoolError>;

/// Configuration for the mempool.
#[derive(Debug, Clone)]
pub struct MempoolConfig {
    /// Maximum number of transactions in the mempool.
    pub max_transactions: usize,
    /// Maximum transactions per sender.
    pub max_per_account: usize,
}

impl Default for MempoolConfig {
    fn default() -> Self {
        Self {
            max_transactions: 10_000,
            max_per_account: 100,
        }
    }
}

/// Transaction mempool.
#[derive(Debug)]
pub struct Mempool {
    /// Configuration.
    config: MempoolConfig,
    /// Transactions indexed by hash.
    transactions: HashMap<Hash, Transaction>,
    /// Transaction hashes grouped by sender, in arrival order.
    by_sender: HashMap<Address, VecDeque<Hash>>,
}

impl Mempool {
    /// Create a new mempool with default configuration.
    pub fn new() -> Self {
        Self::with_config(MempoolConfig::default())
    }

    /// Create a new mempool with the given configuration.
    pub fn with_config(config: MempoolConfig) -> Self {
        Self {
            config,
            transactions: HashMap::new(),
            by_sender: HashMap::new(),
        }
    }

    /// Get the number of transactions in the mempool.
    pub fn len(&self) -> usize {
        self.transactions.len()
    }

    /// Check if the mempool is empty.
    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Check if a transaction is in the mempool.
    pub fn contains(&self, tx_hash: &Hash) -> bool {
        self.transactions.contains_key(tx_hash)
    }

    /// Get a transaction from the mempool.
    pub fn get(&self, tx_hash: &Hash) -> Option<&Transaction> {
        self.transactions.get(tx_hash)
    }

    /// Add a transaction to the mempool.
    pub fn add(&mut self, tx: Transaction) -> Result<()> {
        let tx_hash = tx.hash;

        if self.contains(&tx_hash) {
            return Err(MempoolError::DuplicateTransaction);
        }

        if self.transactions.len() >= self.config.max_transactions {
            return Err(MempoolError::MempoolFull(self.config.max_transactions));
        }

        let sender_txs = self.by_sender.entry(tx.sender).or_default();
        if sender_txs.len() >= self.config.max_per_account {
            return Err(MempoolError::MempoolFull(self.config.max_per_account));
        }

        sender_txs.push_back(tx_hash);
        self.transactions.insert(tx_hash, tx);

        Ok(())
    }

    /// Remove a transaction from the mempool.
    pub fn remove(&mut self, tx_hash: &Hash) -> Result<Transaction> {
        let tx = self
            .transactions
            .remove(tx_hash)
            .ok_or(MempoolError::TransactionNotFound)?;

        if let Some(sender_txs) = self.by_sender.get_mut(&tx.sender) {
            sender_txs.retain(|h| h != tx_hash);
            if sender_txs.is_empty() {
                self.by_sender.remove(&tx.sender);
            }
        }

        Ok(tx)
    }

    /// Remove multiple transactions, ignoring hashes that are not pooled.
    pub fn remove_batch(&mut self, tx_hashes: &[Hash]) -> usize {
        tx_hashes
            .iter()
            .filter(|hash| self.remove(hash).is_ok())
            .count()
    }

    /// Keep only the transactions for which `keep` returns true. Returns the
    /// number removed.
    pub fn retain(&mut self, mut keep: impl FnMut(&Transaction) -> bool) -> usize {
        let doomed: Vec<Hash> = self
            .transactions
            .values()
            .filter(|tx| !keep(tx))
            .map(|tx| tx.hash)
            .collect();
        self.remove_batch(&doomed)
    }

    /// Get transactions from a specific sender, in arrival order.
    pub fn get_by_sender(&self, sender: &Address) -> Vec<Transaction> {
        self.by_sender
            .get(sender)
            .map(|hashes| {
                hashes
                    .iter()
                    .filter_map(|h| self.transactions.get(h).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Get pending transactions for block building.
    ///
    /// Returns up to `limit` transactions, oldest timestamp first. Ties are
    /// broken by hash so every node orders the same pool identically.
    pub fn get_pending(&self, limit: usize) -> Vec<Transaction> {
        let mut txs: Vec<_> = self.transactions.values().cloned().collect();
        txs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp).then(a.hash.cmp(&b.hash)));
        txs.truncate(limit);
        txs
    }

    /// Clear all transactions from the mempool.
    pub fn clear(&mut self) {
        self.transactions.clear();
        self.by_sender.clear();
    }

    /// Get mempool statistics.
    pub fn stats(&self) -> MempoolStats {
        MempoolStats {
            total_transactions: self.len(),
            unique_senders: self.by_sender.len(),
            capacity: self.config.max_transactions,
        }
    }
}

impl Default for Mempool {
    fn default() -> Self {
        Self::new()
    }
}

/// Mempool statistics.
#[derive(Debug, Clone)]
pub struct MempoolStats {
    /// Total number of transactions.
    pub total_transactions: usize,
    /// Number of unique senders.
    pub unique_senders: usize,
    /// Mempool capacity.
    pub capacity: usize,
}
