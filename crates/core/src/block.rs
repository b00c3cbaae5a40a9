//! Block structure and proof-of-work hashing.

use crate::crypto::Address;
use crate::hash::{hash, Hash};
use crate::transaction::{current_timestamp, Transaction};
use serde::{Deserialize, Serialize};

/// Coins minted to the miner of every block, genesis included.
pub const BLOCK_REWARD: u64 = 32;

/// A block of transactions.
///
/// The block hash commits to `(index, prev_hash, nonce)` only; the
/// transactions are bound to the block through the `state_root` that every
/// node recomputes by replaying them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    /// Block height (0 for genesis).
    pub index: u64,
    /// Hash of `(index, prev_hash, nonce)`.
    pub hash: Hash,
    /// Hash of the previous block (zero for genesis).
    pub prev_hash: Hash,
    /// Unix timestamp in seconds.
    pub timestamp: u64,
    /// Transactions, executed in order.
    pub transactions: Vec<Transaction>,
    /// Proof-of-work search counter.
    pub nonce: u64,
    /// Coins minted to `miner_address`.
    pub reward: u64,
    /// Address credited with the reward.
    pub miner_address: Address,
    /// Ledger commitment after executing this block.
    pub state_root: Hash,
}

#[derive(Serialize)]
struct BlockPreimage<'a> {
    index: u64,
    prev_hash: &'a Hash,
    nonce: u64,
}

impl Block {
    /// Create an unsealed candidate block. `hash` and `state_root` are filled
    /// in by mining and execution.
    pub fn new(
        index: u64,
        prev_hash: Hash,
        transactions: Vec<Transaction>,
        reward: u64,
        miner_address: Address,
    ) -> Self {
        let mut block = Self {
            index,
            hash: Hash::ZERO,
            prev_hash,
            timestamp: current_timestamp(),
            transactions,
            nonce: 0,
            reward,
            miner_address,
            state_root: Hash::ZERO,
        };
        block.hash = block.compute_hash();
        block
    }

    /// Create the genesis block minting `reward` to `miner_address`. The
    /// caller fills in `state_root` once the reward is credited.
    pub fn genesis(miner_address: Address, reward: u64) -> Self {
        Self::new(0, Hash::ZERO, Vec::new(), reward, miner_address)
    }

    /// Digest of `(index, prev_hash, nonce)`.
    pub fn compute_hash_of(index: u64, prev_hash: &Hash, nonce: u64) -> Hash {
        let preimage = BlockPreimage {
            index,
            prev_hash,
            nonce,
        };
        let encoded = bincode::serialize(&preimage).expect("serialization should not fail");
        hash(&encoded)
    }

    /// Recompute this block's hash from its fields.
    pub fn compute_hash(&self) -> Hash {
        Self::compute_hash_of(self.index, &self.prev_hash, self.nonce)
    }

    /// Set the nonce and refresh the stored hash.
    pub fn set_nonce(&mut self, nonce: u64) {
        self.nonce = nonce;
        self.hash = self.compute_hash();
    }

    /// The stored hash matches the fields.
    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.compute_hash()
    }

    /// Check if this is the genesis block.
    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.prev_hash == Hash::ZERO
    }

    /// Get the number of transactions in this block.
    pub fn tx_count(&self) -> usize {
        self.transactions.len()
    }

    /// Hashes of the included transactions, in block order.
    pub fn tx_hashes(&self) -> Vec<Hash> {
        self.transactions.iter().map(|tx| tx.hash).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_genesis_block() {
        let miner = Address::from_bytes([1u8; 32]);
        let genesis = Block::genesis(miner, BLOCK_REWARD);

        assert!(genesis.is_genesis());
        assert_eq!(genesis.index, 0);
        assert_eq!(genesis.prev_hash, Hash::ZERO);
        assert_eq!(genesis.miner_address, miner);
        assert_eq!(genesis.reward, 32);
        assert!(genesis.transactions.is_empty());
        assert!(genesis.has_valid_hash());
    }

    #[test]
    fn test_block_hash_deterministic() {
        let prev = hash(b"parent");
        assert_eq!(
            Block::compute_hash_of(3, &prev, 42),
            Block::compute_hash_of(3, &prev, 42)
        );
    }

    #[test]
    fn test_block_hash_changes_with_each_field() {
        let prev = hash(b"parent");
        let base = Block::compute_hash_of(3, &prev, 42);

        assert_ne!(base, Block::compute_hash_of(4, &prev, 42));
        assert_ne!(base, Block::compute_hash_of(3, &hash(b"other"), 42));
        assert_ne!(base, Block::compute_hash_of(3, &prev, 43));
    }

    #[test]
    fn test_hash_ignores_body() {
        let miner = Address::from_bytes([1u8; 32]);
        let mut block = Block::new(1, hash(b"parent"), vec![], BLOCK_REWARD, miner);
        let before = block.compute_hash();

        block.timestamp += 100;
        block.state_root = hash(b"state");
        block.reward = 1;
        assert_eq!(before, block.compute_hash());
    }

    #[test]
    fn test_set_nonce_refreshes_hash() {
        let miner = Address::from_bytes([1u8; 32]);
        let mut block = Block::new(1, hash(b"parent"), vec![], BLOCK_REWARD, miner);
        let before = block.hash;

        block.set_nonce(7);
        assert_ne!(before, block.hash);
        assert!(block.has_valid_hash());

        block.nonce = 8;
        assert!(!block.has_valid_hash());
    }
}
