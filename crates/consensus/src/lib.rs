//! Proof-of-work consensus for wotschain.
//!
//! This crate provides:
//! - The leading-zeros difficulty rule and nonce search
//! - Transaction validation (hash, MSS signature, balance checks)
//! - Block validation (structure, parent links, signatures)
//! - Whole-chain linkage validation used for fork choice
//!
//! # Example
//!
//! ```rust,no_run
//! use wotschain_consensus::{PowConfig, ProofOfWork, SearchOutcome};
//! use wotschain_core::{Address, Block, Hash, BLOCK_REWARD};
//!
//! let pow = ProofOfWork::new(PowConfig::new(3));
//! let mut block = Block::new(1, Hash::ZERO, vec![], BLOCK_REWARD, Address::ZERO);
//!
//! if let SearchOutcome::Found { nonce, .. } = pow.search(&mut block, || false).unwrap() {
//!     assert_eq!(block.nonce, nonce);
//!     pow.verify_block(&block).unwrap();
//! }
//! ```

pub mod pow;
pub mod validator;

// Re-export commonly used types
pub use pow::{ConsensusError, PowConfig, ProofOfWork, SearchOutcome, RESTART_CHECK_INTERVAL};
pub use validator::{BlockValidator, ChainValidator, TransactionValidator, ValidationError};
