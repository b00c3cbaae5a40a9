//! Proof-of-work consensus.
//!
//! A block is valid work when the hex rendering of its hash starts with
//! `difficulty` zero characters. Difficulty is a fixed configuration value;
//! there is no retargeting.

use thiserror::Error;
use wotschain_core::{Block, BLOCK_REWARD};

/// Errors that can occur during consensus operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConsensusError {
    #[error("insufficient work (required {required} leading zeros, got {got})")]
    InsufficientWork { required: usize, got: usize },

    #[error("block hash does not match its fields")]
    InvalidHash,

    #[error("invalid block reward (expected {expected}, got {got})")]
    InvalidReward { expected: u64, got: u64 },

    #[error("nonce space exhausted")]
    NonceSpaceExhausted,
}

pub type Result<T> = std::result::Result<T, ConsensusError>;

/// Nonces tried between two calls to the restart check.
pub const RESTART_CHECK_INTERVAL: u64 = 256;

/// Proof-of-work configuration.
#[derive(Debug, Clone)]
pub struct PowConfig {
    /// Required leading zero hex characters in a block hash.
    pub difficulty: usize,
    /// Coins minted per block.
    pub reward: u64,
}

impl Default for PowConfig {
    fn default() -> Self {
        Self {
            difficulty: 4,
            reward: BLOCK_REWARD,
        }
    }
}

impl PowConfig {
    /// Create a new configuration with the given difficulty and the standard reward.
    pub fn new(difficulty: usize) -> Self {
        Self {
            difficulty,
            ..Self::default()
        }
    }
}

/// Result of a nonce search.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchOutcome {
    /// The block now carries a nonce meeting the difficulty.
    Found { nonce: u64, attempts: u64 },
    /// The restart check asked to abandon the candidate.
    Restart { attempts: u64 },
}

/// Proof-of-work engine.
#[derive(Debug, Clone, Default)]
pub struct ProofOfWork {
    config: PowConfig,
}

impl ProofOfWork {
    /// Create a new engine with the given configuration.
    pub fn new(config: PowConfig) -> Self {
        Self { config }
    }

    /// Get the configuration.
    pub fn config(&self) -> &PowConfig {
        &self.config
    }

    /// Check the difficulty predicate on a block's stored hash.
    pub fn meets_difficulty(&self, block: &Block) -> bool {
        block.hash.leading_zero_nibbles() >= self.config.difficulty
    }

    /// Verify the stored hash, the work and the reward of a non-genesis block.
    pub fn verify_block(&self, block: &Block) -> Result<()> {
        if !block.has_valid_hash() {
            return Err(ConsensusError::InvalidHash);
        }

        let got = block.hash.leading_zero_nibbles();
        if got < self.config.difficulty {
            return Err(ConsensusError::InsufficientWork {
                required: self.config.difficulty,
                got,
            });
        }

        self.verify_reward(block)
    }

    /// The block mints exactly the configured reward.
    pub fn verify_reward(&self, block: &Block) -> Result<()> {
        if block.reward != self.config.reward {
            return Err(ConsensusError::InvalidReward {
                expected: self.config.reward,
                got: block.reward,
            });
        }
        Ok(())
    }

    /// Increment the nonce from its current value until the hash meets the
    /// difficulty.
    ///
    /// Every `RESTART_CHECK_INTERVAL` attempts `should_restart` is polled; when
    /// it returns true the search stops and the block is left unsealed.
    pub fn search(
        &self,
        block: &mut Block,
        mut should_restart: impl FnMut() -> bool,
    ) -> Result<SearchOutcome> {
        let mut attempts = 0u64;
        loop {
            block.hash = block.compute_hash();
            attempts += 1;
            if self.meets_difficulty(block) {
                return Ok(SearchOutcome::Found {
                    nonce: block.nonce,
                    attempts,
                });
            }

            if attempts % RESTART_CHECK_INTERVAL == 0 && should_restart() {
                return Ok(SearchOutcome::Restart { attempts });
            }

            block.nonce = block
                .nonce
                .checked_add(1)
                .ok_or(ConsensusError::NonceSpaceExhausted)?;
        }
    }
}
