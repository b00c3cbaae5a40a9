//! Core primitives for wotschain.
//!
//! This crate provides the fundamental types used throughout the node:
//! - Hashing (blake3) and addresses
//! - Winternitz one-time signatures and the Merkle signature scheme built on them
//! - Accounts and the ledger
//! - Transactions
//! - Blocks

pub mod account;
pub mod block;
pub mod crypto;
pub mod hash;
pub mod ledger;
pub mod mss;
pub mod transaction;
pub mod wots;

// Re-export commonly used types at the crate root
pub use account::{Account, LedgerError};
pub use block::{Block, BLOCK_REWARD};
pub use crypto::{Address, CryptoError};
pub use hash::{hash, hash_concat, Hash, H256};
pub use ledger::Ledger;
pub use mss::{MerkleSigTree, MssSignature};
pub use transaction::{current_timestamp, Transaction, TransactionError};
pub use wots::OneTimeSig;
