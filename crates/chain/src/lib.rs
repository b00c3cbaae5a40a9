//! Blockchain state for wotschain.
//!
//! This crate holds everything a node mutates:
//! - **Blockchain**: blocks plus the ledger they produce, behind a shared lock
//! - **Executor**: replays a block's transfers on a scratch ledger
//! - **Mempool**: admitted transactions waiting for a block
//!
//! # Example
//!
//! ```rust,no_run
//! use wotschain_chain::{Blockchain, SharedChain};
//! use wotschain_consensus::{PowConfig, ProofOfWork};
//! use wotschain_core::{Block, MerkleSigTree, BLOCK_REWARD};
//!
//! let keys = MerkleSigTree::generate(4).unwrap();
//! let chain = SharedChain::new(Blockchain::with_genesis(keys.public_key(), BLOCK_REWARD));
//!
//! // Mine an empty block on top of genesis.
//! let pow = ProofOfWork::new(PowConfig::new(2));
//! let tip = chain.last_block();
//! let mut block = Block::new(tip.index + 1, tip.hash, vec![], BLOCK_REWARD, keys.public_key());
//! pow.search(&mut block, || false).unwrap();
//! chain.commit_mined(block, |_| {}).unwrap();
//!
//! assert_eq!(chain.balance(&keys.public_key()), 2 * BLOCK_REWARD);
//! ```

pub mod blockchain;
pub mod executor;
pub mod mempool;

// Re-export commonly used types
pub use blockchain::{Blockchain, BlockchainError, BlockchainStats, SharedChain};
pub use executor::{BlockExecutionResult, ExecutionError, Executor};
pub use mempool::{Mempool, MempoolConfig, MempoolError, MempoolStats};
