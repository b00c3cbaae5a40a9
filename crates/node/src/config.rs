//! Node configuration.

use std::time::Duration;
use wotschain_chain::MempoolConfig;
use wotschain_consensus::PowConfig;
use wotschain_core::mss::DEFAULT_HEIGHT;

/// Miner configuration.
#[derive(Debug, Clone)]
pub struct MinerConfig {
    /// Sleep between polls while the mempool is empty.
    pub idle_interval: Duration,
    /// Maximum transactions per block.
    pub max_block_transactions: usize,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            idle_interval: Duration::from_millis(500),
            max_block_transactions: 1000,
        }
    }
}

/// Everything a node needs to start.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Proof-of-work parameters.
    pub pow: PowConfig,
    /// Mempool limits.
    pub mempool: MempoolConfig,
    /// Miner loop settings.
    pub miner: MinerConfig,
    /// Height of the node's signing tree (2^height signatures).
    pub key_height: u32,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            pow: PowConfig::default(),
            mempool: MempoolConfig::default(),
            miner: MinerConfig::default(),
            key_height: DEFAULT_HEIGHT,
        }
    }
}

impl NodeConfig {
    pub fn with_difficulty(mut self, difficulty: usize) -> Self {
        self.pow.difficulty = difficulty;
        self
    }

    pub fn with_key_height(mut self, height: u32) -> Self {
        self.key_height = height;
        self
    }

    pub fn with_idle_interval(mut self, interval: Duration) -> Self {
        self.miner.idle_interval = interval;
        self
    }
}
