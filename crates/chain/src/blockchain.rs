//! Chain state and the shared handle used by the node and the miner.
//!
//! [`Blockchain`] is the plain value: the ordered blocks plus the ledger
//! obtained by executing them. [`SharedChain`] wraps it in a reader-writer
//! lock; every mutation goes through the write guard so readers never see a
//! block without its ledger update.

use crate::executor::{BlockExecutionResult, ExecutionError, Executor};
use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, info};
use wotschain_consensus::{
    BlockValidator, ChainValidator, ConsensusError, ProofOfWork, TransactionValidator,
    ValidationError,
};
use wotschain_core::{Address, Block, Hash, Ledger, Transaction};

/// Errors that can occur during blockchain operations.
#[derive(Debug, Error)]
pub enum BlockchainError {
    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),

    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("execution error: {0}")]
    Execution(#[from] ExecutionError),

    #[error("invalid chain: {0}")]
    InvalidChain(#[source] ValidationError),

    #[error("transaction {0} is already included in the chain")]
    AlreadyIncluded(Hash),

    #[error("block {index} is behind the tip {tip}")]
    StaleBlock { tip: u64, index: u64 },

    #[error("block {index} is ahead of the tip {tip}")]
    BlockAhead { tip: u64, index: u64 },

    #[error("state root mismatch (block {claimed}, computed {computed})")]
    StateDivergence { claimed: Hash, computed: Hash },

    #[error("candidate chain is not longer (local tip {local}, candidate tip {candidate})")]
    NotLonger { local: u64, candidate: u64 },

    #[error("candidate ledger does not match its tip state root")]
    LedgerMismatch,

    #[error("tip moved while the block was being mined")]
    TipChanged,
}

pub type Result<T> = std::result::Result<T, BlockchainError>;

/// Wire form of a chain; converted through [`Blockchain::from_parts`].
#[derive(Deserialize)]
struct ChainRecord {
    blocks: Vec<Block>,
    ledger: Ledger,
}

/// Ordered blocks plus the ledger they produce.
///
/// Never empty: the first block is the genesis block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "ChainRecord")]
pub struct Blockchain {
    blocks: Vec<Block>,
    ledger: Ledger,
}

impl TryFrom<ChainRecord> for Blockchain {
    type Error = ValidationError;

    fn try_from(record: ChainRecord) -> std::result::Result<Self, Self::Error> {
        Self::from_parts(record.blocks, record.ledger)
    }
}

impl Blockchain {
    /// Start a chain with a genesis block minting `reward` to `miner`.
    pub fn with_genesis(miner: Address, reward: u64) -> Self {
        let mut ledger = Ledger::new();
        ledger
            .credit(&miner, reward)
            .expect("crediting an empty ledger cannot overflow");

        let mut genesis = Block::genesis(miner, reward);
        genesis.state_root = ledger.state_commitment();

        Self {
            blocks: vec![genesis],
            ledger,
        }
    }

    /// Assemble a chain from received parts. Only non-emptiness is checked
    /// here; see [`Blockchain::validate`].
    pub fn from_parts(
        blocks: Vec<Block>,
        ledger: Ledger,
    ) -> std::result::Result<Self, ValidationError> {
        if blocks.is_empty() {
            return Err(ValidationError::EmptyChain);
        }
        Ok(Self { blocks, ledger })
    }

    /// All blocks, genesis first.
    pub fn blocks(&self) -> &[Block] {
        &self.blocks
    }

    /// Ledger after the last block.
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Get the genesis block.
    pub fn genesis(&self) -> &Block {
        &self.blocks[0]
    }

    /// Get the latest block.
    pub fn last_block(&self) -> &Block {
        &self.blocks[self.blocks.len() - 1]
    }

    /// Index of the latest block.
    pub fn last_index(&self) -> u64 {
        self.last_block().index
    }

    /// Number of blocks.
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    /// Never true for a chain built through this module.
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Balance of `address` at the tip.
    pub fn balance(&self, address: &Address) -> u64 {
        self.ledger.balance(address)
    }

    /// Whether a transaction with this hash is part of any block.
    pub fn contains_transaction(&self, tx_hash: &Hash) -> bool {
        self.blocks
            .iter()
            .any(|block| block.transactions.iter().any(|tx| &tx.hash == tx_hash))
    }

    /// Check block linkage from genesis to tip.
    pub fn validate(&self) -> std::result::Result<(), ValidationError> {
        ChainValidator::validate_chain(&self.blocks)
    }

    /// Admission check for a transaction against the tip: hash, signature,
    /// replay and balance.
    pub fn check_transaction(&self, tx: &Transaction) -> Result<()> {
        TransactionValidator::validate_transaction(tx)?;
        if self.contains_transaction(&tx.hash) {
            return Err(BlockchainError::AlreadyIncluded(tx.hash));
        }
        TransactionValidator::validate_against_state(tx, &self.ledger)?;
        Ok(())
    }

    /// Validate a received block against the tip and execute it on a scratch
    /// ledger. Nothing is committed.
    pub fn prepare_block(&self, block: &Block, pow: &ProofOfWork) -> Result<BlockExecutionResult> {
        let tip = self.last_block();
        let expected = tip.index + 1;
        if block.index < expected {
            return Err(BlockchainError::StaleBlock {
                tip: tip.index,
                index: block.index,
            });
        }
        if block.index > expected {
            return Err(BlockchainError::BlockAhead {
                tip: tip.index,
                index: block.index,
            });
        }

        BlockValidator::validate_full(block, tip)?;
        pow.verify_block(block)?;

        if let Some(tx) = block
            .transactions
            .iter()
            .find(|tx| self.contains_transaction(&tx.hash))
        {
            return Err(BlockchainError::AlreadyIncluded(tx.hash));
        }

        let result = Executor::new(&self.ledger).execute_block(block)?;
        if result.state_root != block.state_root {
            return Err(BlockchainError::StateDivergence {
                claimed: block.state_root,
                computed: result.state_root,
            });
        }

        Ok(result)
    }

    /// Append a block together with the ledger it produces.
    pub fn commit(&mut self, block: Block, ledger: Ledger) {
        self.blocks.push(block);
        self.ledger = ledger;
    }

    /// Validate, execute and append a received block.
    pub fn import_block(
        &mut self,
        block: Block,
        pow: &ProofOfWork,
    ) -> Result<BlockExecutionResult> {
        let result = self.prepare_block(&block, pow)?;
        self.commit(block, result.ledger.clone());
        Ok(result)
    }

    /// Checks a candidate must pass before it can replace this chain.
    ///
    /// The candidate is replayed from its genesis block and the ledger it
    /// carries must equal the replayed one.
    pub fn check_replacement(&self, candidate: &Blockchain, pow: &ProofOfWork) -> Result<()> {
        if candidate.last_index() <= self.last_index() {
            return Err(BlockchainError::NotLonger {
                local: self.last_index(),
                candidate: candidate.last_index(),
            });
        }
        let ledger = Self::replay(&candidate.blocks, pow)?;
        if ledger != candidate.ledger {
            return Err(BlockchainError::LedgerMismatch);
        }
        Ok(())
    }

    /// Re-execute `blocks` on an empty ledger and return the ledger at the
    /// last block.
    ///
    /// Every block after genesis is checked the way an imported block is:
    /// linkage, signatures, work, reward, replay and state root. The genesis
    /// block needs no work but must mint the configured reward.
    pub fn replay(blocks: &[Block], pow: &ProofOfWork) -> Result<Ledger> {
        ChainValidator::validate_chain(blocks).map_err(BlockchainError::InvalidChain)?;

        let mut ledger = Ledger::new();
        let mut seen = HashSet::new();
        let mut parent: Option<&Block> = None;

        for block in blocks {
            match parent {
                Some(parent) => {
                    BlockValidator::validate_full(block, parent)?;
                    pow.verify_block(block)?;
                }
                None => {
                    BlockValidator::validate_block_structure(block)?;
                    BlockValidator::validate_block_transactions(block)?;
                    pow.verify_reward(block)?;
                }
            }

            for tx in &block.transactions {
                if !seen.insert(tx.hash) {
                    return Err(BlockchainError::AlreadyIncluded(tx.hash));
                }
            }

            let result = Executor::new(&ledger).execute_block(block)?;
            if result.state_root != block.state_root {
                return Err(BlockchainError::StateDivergence {
                    claimed: block.state_root,
                    computed: result.state_root,
                });
            }

            ledger = result.ledger;
            parent = Some(block);
        }

        Ok(ledger)
    }

    /// Get blockchain statistics.
    pub fn stats(&self) -> BlockchainStats {
        let tip = self.last_block();
        BlockchainStats {
            height: tip.index,
            latest_block_hash: tip.hash,
            latest_timestamp: tip.timestamp,
            state_root: tip.state_root,
            accounts: self.ledger.len(),
            total_supply: self.ledger.total_supply(),
        }
    }
}

/// Blockchain statistics.
#[derive(Debug, Clone)]
pub struct BlockchainStats {
    /// Index of the latest block.
    pub height: u64,
    /// Hash of the latest block.
    pub latest_block_hash: Hash,
    /// Timestamp of the latest block.
    pub latest_timestamp: u64,
    /// State root of the latest block.
    pub state_root: Hash,
    /// Number of ledger accounts.
    pub accounts: usize,
    /// Sum of all balances.
    pub total_supply: u128,
}

/// Thread-safe handle to the node's chain.
///
/// Many readers or one writer. Callers must not hold the mempool lock while
/// acquiring this one.
#[derive(Debug, Clone)]
pub struct SharedChain {
    inner: Arc<RwLock<Blockchain>>,
}

impl SharedChain {
    pub fn new(chain: Blockchain) -> Self {
        Self {
            inner: Arc::new(RwLock::new(chain)),
        }
    }

    /// Acquire a shared read guard.
    pub fn read(&self) -> RwLockReadGuard<'_, Blockchain> {
        self.inner.read()
    }

    /// Acquire the exclusive write guard.
    pub fn write(&self) -> RwLockWriteGuard<'_, Blockchain> {
        self.inner.write()
    }

    /// Clone of the latest block.
    pub fn last_block(&self) -> Block {
        self.read().last_block().clone()
    }

    pub fn last_index(&self) -> u64 {
        self.read().last_index()
    }

    /// Clone of the whole chain, for sending to a peer.
    pub fn snapshot(&self) -> Blockchain {
        self.read().clone()
    }

    /// Balance of `address` at the tip.
    pub fn balance(&self, address: &Address) -> u64 {
        self.read().balance(address)
    }

    /// Push a block the caller has already validated, together with the
    /// ledger its execution produced.
    pub fn append(&self, block: Block, ledger: Ledger) {
        self.write().commit(block, ledger);
    }

    /// Validate, execute and append a received block under the write lock.
    pub fn import_block(&self, block: Block, pow: &ProofOfWork) -> Result<BlockExecutionResult> {
        let mut chain = self.write();
        let result = chain.import_block(block, pow)?;
        debug!(
            block = %result.block_hash,
            txs = result.tx_count,
            "imported block"
        );
        Ok(result)
    }

    /// Replace the local chain with a strictly longer valid candidate.
    ///
    /// The candidate is replayed before the write lock is taken; the length
    /// comparison is repeated under the lock.
    pub fn replace(&self, candidate: Blockchain, pow: &ProofOfWork) -> Result<()> {
        self.read().check_replacement(&candidate, pow)?;

        let mut chain = self.write();
        if candidate.last_index() <= chain.last_index() {
            return Err(BlockchainError::NotLonger {
                local: chain.last_index(),
                candidate: candidate.last_index(),
            });
        }

        info!(
            from = chain.last_index(),
            to = candidate.last_index(),
            "replacing chain"
        );
        *chain = candidate;
        Ok(())
    }

    /// Execute a freshly mined block on top of the tip, fill in its state
    /// root and append it.
    ///
    /// `on_sealed` runs under the write lock after the state root is set and
    /// before the block is appended, so nothing can observe the new tip
    /// before it has been handed off.
    pub fn commit_mined(&self, mut block: Block, on_sealed: impl FnOnce(&Block)) -> Result<Block> {
        let mut chain = self.write();
        let tip = chain.last_block();
        if block.prev_hash != tip.hash || block.index != tip.index + 1 {
            return Err(BlockchainError::TipChanged);
        }

        let result = Executor::new(chain.ledger()).execute_block(&block)?;
        block.state_root = result.state_root;
        on_sealed(&block);
        chain.commit(block.clone(), result.ledger);

        info!(
            index = block.index,
            hash = %block.hash,
            txs = block.tx_count(),
            "mined block"
        );
        Ok(block)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wotschain_consensus::{PowConfig, SearchOutcome};
    use wotschain_core::{MerkleSigTree, BLOCK_REWARD};

    fn pow() -> ProofOfWork {
        ProofOfWork::new(PowConfig::new(1))
    }

    /// Build the next block on `chain`, mine it and fill in its state root.
    fn next_block(chain: &Blockchain, txs: Vec<Transaction>, miner: Address) -> Block {
        let tip = chain.last_block();
        let mut block = Block::new(tip.index + 1, tip.hash, txs, BLOCK_REWARD, miner);
        let outcome = pow().search(&mut block, || false).unwrap();
        assert!(matches!(outcome, SearchOutcome::Found { .. }));
        block.state_root = Executor::new(chain.ledger())
            .execute_block(&block)
            .unwrap()
            .state_root;
        block
    }

    fn extend(chain: &mut Blockchain, count: usize, miner: Address) {
        for _ in 0..count {
            let block = next_block(chain, vec![], miner);
            chain.import_block(block, &pow()).unwrap();
        }
    }

    #[test]
    fn test_genesis_chain() {
        let miner = Address::from_bytes([1u8; 32]);
        let chain = Blockchain::with_genesis(miner, BLOCK_REWARD);

        assert_eq!(chain.len(), 1);
        assert_eq!(chain.last_index(), 0);
        assert!(chain.genesis().is_genesis());
        assert_eq!(chain.balance(&miner), BLOCK_REWARD);
        assert_eq!(chain.last_block().state_root, chain.ledger().state_commitment());
        assert!(chain.validate().is_ok());
    }

    #[test]
    fn test_genesis_append_append_validates() {
        let miner = Address::from_bytes([1u8; 32]);
        let shared = SharedChain::new(Blockchain::with_genesis(miner, BLOCK_REWARD));

        for _ in 0..2 {
            let chain = shared.snapshot();
            let block = next_block(&chain, vec![], miner);
            let ledger = Executor::new(chain.ledger()).execute_block(&block).unwrap().ledger;
            shared.append(block, ledger);
        }

        let chain = shared.read();
        assert_eq!(chain.len(), 3);
        assert!(chain.validate().is_ok());
        assert_eq!(chain.last_block().state_root, chain.ledger().state_commitment());
    }

    #[test]
    fn test_import_block_with_transfer() {
        let mut alice = MerkleSigTree::generate(2).unwrap();
        let bob = Address::from_bytes([2u8; 32]);
        let mut chain = Blockchain::with_genesis(alice.public_key(), BLOCK_REWARD);

        let tx = Transaction::transfer(&mut alice, bob, 1).unwrap();
        assert!(chain.check_transaction(&tx).is_ok());

        let block = next_block(&chain, vec![tx.clone()], alice.public_key());
        let result = chain.import_block(block, &pow()).unwrap();

        assert_eq!(result.tx_count, 1);
        assert_eq!(chain.last_index(), 1);
        assert_eq!(chain.balance(&alice.public_key()), 31 + 32);
        assert_eq!(chain.balance(&bob), 1);
        assert!(chain.contains_transaction(&tx.hash));
        assert!(matches!(
            chain.check_transaction(&tx),
            Err(BlockchainError::AlreadyIncluded(_))
        ));
    }

    #[test]
    fn test_import_rejects_state_divergence() {
        let miner = Address::from_bytes([1u8; 32]);
        let mut chain = Blockchain::with_genesis(miner, BLOCK_REWARD);

        let mut block = next_block(&chain, vec![], miner);
        block.state_root = Hash::ZERO;
        assert!(matches!(
            chain.import_block(block, &pow()),
            Err(BlockchainError::StateDivergence { .. })
        ));
        assert_eq!(chain.last_index(), 0);
    }

    #[test]
    fn test_import_rejects_insufficient_work() {
        let miner = Address::from_bytes([1u8; 32]);
        let mut chain = Blockchain::with_genesis(miner, BLOCK_REWARD);
        let block = next_block(&chain, vec![], miner);

        let strict = ProofOfWork::new(PowConfig::new(64));
        assert!(matches!(
            chain.import_block(block, &strict),
            Err(BlockchainError::Consensus(ConsensusError::InsufficientWork { .. }))
        ));
    }

    #[test]
    fn test_import_classifies_out_of_order_blocks() {
        let miner = Address::from_bytes([1u8; 32]);
        let mut chain = Blockchain::with_genesis(miner, BLOCK_REWARD);
        let mut ahead = chain.clone();
        extend(&mut ahead, 2, miner);

        assert!(matches!(
            chain.import_block(ahead.blocks()[2].clone(), &pow()),
            Err(BlockchainError::BlockAhead { tip: 0, index: 2 })
        ));

        extend(&mut chain, 1, miner);
        assert!(matches!(
            chain.import_block(ahead.blocks()[1].clone(), &pow()),
            Err(BlockchainError::StaleBlock { tip: 1, index: 1 })
        ));
    }

    #[test]
    fn test_import_rejects_overspending_block() {
        let mut alice = MerkleSigTree::generate(2).unwrap();
        let bob = Address::from_bytes([2u8; 32]);
        let mut chain = Blockchain::with_genesis(alice.public_key(), BLOCK_REWARD);

        let tx = Transaction::transfer(&mut alice, bob, BLOCK_REWARD + 1).unwrap();
        let tip = chain.last_block();
        let mut block = Block::new(1, tip.hash, vec![tx], BLOCK_REWARD, bob);
        pow().search(&mut block, || false).unwrap();

        assert!(matches!(
            chain.import_block(block, &pow()),
            Err(BlockchainError::Execution(_))
        ));
    }

    #[test]
    fn test_replace_with_longer_chain() {
        let miner = Address::from_bytes([1u8; 32]);
        let base = Blockchain::with_genesis(miner, BLOCK_REWARD);

        let mut short = base.clone();
        extend(&mut short, 2, miner);
        let mut long = base;
        extend(&mut long, 4, miner);

        let shared = SharedChain::new(short.clone());
        shared.replace(long.clone(), &pow()).unwrap();
        assert_eq!(shared.last_index(), 4);
        assert_eq!(shared.snapshot(), long);

        assert!(matches!(
            shared.replace(short, &pow()),
            Err(BlockchainError::NotLonger {
                local: 4,
                candidate: 2
            })
        ));
    }

    #[test]
    fn test_replace_rejects_broken_or_inconsistent_chain() {
        let miner = Address::from_bytes([1u8; 32]);
        let local = Blockchain::with_genesis(miner, BLOCK_REWARD);
        let shared = SharedChain::new(local.clone());

        let mut broken = local.clone();
        extend(&mut broken, 3, miner);
        broken.blocks[2].prev_hash = Hash::ZERO;
        assert!(matches!(
            shared.replace(broken, &pow()),
            Err(BlockchainError::InvalidChain(ValidationError::InvalidPrevHash))
        ));

        let mut forged = local;
        extend(&mut forged, 3, miner);
        forged.ledger.credit(&miner, 1_000).unwrap();
        assert!(matches!(
            shared.replace(forged, &pow()),
            Err(BlockchainError::LedgerMismatch)
        ));
        assert_eq!(shared.last_index(), 0);
    }

    #[test]
    fn test_replace_replays_candidate() {
        let miner = Address::from_bytes([1u8; 32]);
        let local = Blockchain::with_genesis(miner, BLOCK_REWARD);
        let shared = SharedChain::new(local.clone());

        let mut honest = local.clone();
        extend(&mut honest, 2, miner);
        assert_eq!(
            Blockchain::replay(honest.blocks(), &pow()).unwrap(),
            *honest.ledger()
        );

        // Passes linkage but not the stricter work requirement.
        let strict = ProofOfWork::new(PowConfig::new(64));
        assert!(matches!(
            shared.replace(honest.clone(), &strict),
            Err(BlockchainError::Consensus(ConsensusError::InsufficientWork { .. }))
        ));

        // A genesis minting more than the configured reward.
        let mut greedy = Blockchain::with_genesis(miner, BLOCK_REWARD + 1);
        let block = next_block(&greedy, vec![], miner);
        greedy.blocks.push(block);
        assert!(matches!(
            shared.replace(greedy, &pow()),
            Err(BlockchainError::Consensus(ConsensusError::InvalidReward { .. }))
        ));

        // An intermediate state root that the replay does not reproduce.
        let mut skewed = honest.clone();
        skewed.blocks[1].state_root = Hash::ZERO;
        assert!(matches!(
            shared.replace(skewed, &pow()),
            Err(BlockchainError::StateDivergence { .. })
        ));

        assert_eq!(shared.last_index(), 0);
        shared.replace(honest, &pow()).unwrap();
        assert_eq!(shared.last_index(), 2);
    }

    #[test]
    fn test_stats_track_tip_and_supply() {
        let mut alice = MerkleSigTree::generate(2).unwrap();
        let bob = Address::from_bytes([2u8; 32]);
        let mut chain = Blockchain::with_genesis(alice.public_key(), BLOCK_REWARD);

        let tx = Transaction::transfer(&mut alice, bob, 3).unwrap();
        let block = next_block(&chain, vec![tx], alice.public_key());
        chain.import_block(block, &pow()).unwrap();

        let stats = chain.stats();
        assert_eq!(stats.height, 1);
        assert_eq!(stats.latest_block_hash, chain.last_block().hash);
        assert_eq!(stats.state_root, chain.ledger().state_commitment());
        assert_eq!(stats.accounts, 2);
        assert_eq!(stats.total_supply, 2 * BLOCK_REWARD as u128);
    }

    #[test]
    fn test_commit_mined_sets_state_root_before_hand_off() {
        let miner = Address::from_bytes([1u8; 32]);
        let shared = SharedChain::new(Blockchain::with_genesis(miner, BLOCK_REWARD));

        let tip = shared.last_block();
        let mut block = Block::new(1, tip.hash, vec![], BLOCK_REWARD, miner);
        pow().search(&mut block, || false).unwrap();

        let mut seen = None;
        let committed = shared
            .commit_mined(block, |sealed| seen = Some(sealed.clone()))
            .unwrap();

        assert_eq!(seen.as_ref(), Some(&committed));
        assert_eq!(committed.state_root, shared.read().ledger().state_commitment());
        assert_eq!(shared.balance(&miner), 2 * BLOCK_REWARD);
    }

    #[test]
    fn test_commit_mined_rejects_stale_tip() {
        let miner = Address::from_bytes([1u8; 32]);
        let shared = SharedChain::new(Blockchain::with_genesis(miner, BLOCK_REWARD));

        let mut block = Block::new(1, Hash::ZERO, vec![], BLOCK_REWARD, miner);
        pow().search(&mut block, || false).unwrap();
        assert!(matches!(
            shared.commit_mined(block, |_| panic!("must not hand off a stale block")),
            Err(BlockchainError::TipChanged)
        ));
        assert_eq!(shared.last_index(), 0);
    }

    #[test]
    fn test_json_roundtrip_and_empty_chain_rejected() {
        let miner = Address::from_bytes([1u8; 32]);
        let mut chain = Blockchain::with_genesis(miner, BLOCK_REWARD);
        extend(&mut chain, 1, miner);

        let json = serde_json::to_string(&chain).unwrap();
        let decoded: Blockchain = serde_json::from_str(&json).unwrap();
        assert_eq!(decoded, chain);

        let empty = r#"{"blocks":[],"ledger":{"accounts":{}}}"#;
        assert!(serde_json::from_str::<Blockchain>(empty).is_err());
    }
}
