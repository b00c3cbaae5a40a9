//! Background miner.
//!
//! One cycle: snapshot the mempool, drop transfers that no longer apply,
//! assemble a candidate on the tip, search for a nonce, then execute and
//! append under the chain's write lock while handing the sealed block to the
//! peers. The mempool lock is always released before the chain lock is
//! taken.

use crate::config::MinerConfig;
use crate::message::Message;
use crate::peer::PeerSink;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use thiserror::Error;
use tracing::{debug, info, warn};
use wotschain_chain::{BlockchainError, Executor, Mempool, SharedChain};
use wotschain_consensus::{ConsensusError, ProofOfWork, SearchOutcome};
use wotschain_core::{Address, Block, Hash};

/// Errors that end a mining cycle.
#[derive(Debug, Error)]
pub enum MinerError {
    #[error("chain error: {0}")]
    Chain(#[from] BlockchainError),

    #[error("consensus error: {0}")]
    Consensus(#[from] ConsensusError),
}

pub type Result<T> = std::result::Result<T, MinerError>;

/// What a single mining cycle did.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MineOutcome {
    /// Nothing to mine.
    Idle,
    /// The mempool or the tip changed; the candidate was abandoned.
    Restarted,
    /// A block was appended and broadcast.
    Mined(Block),
}

/// Proof-of-work miner bound to a node's chain, mempool and peers.
#[derive(Clone)]
pub struct Miner {
    chain: SharedChain,
    mempool: Arc<Mutex<Mempool>>,
    peers: Arc<dyn PeerSink>,
    pow: ProofOfWork,
    config: MinerConfig,
    address: Address,
}

impl Miner {
    pub fn new(
        chain: SharedChain,
        mempool: Arc<Mutex<Mempool>>,
        peers: Arc<dyn PeerSink>,
        pow: ProofOfWork,
        config: MinerConfig,
        address: Address,
    ) -> Self {
        Self {
            chain,
            mempool,
            peers,
            pow,
            config,
            address,
        }
    }

    /// Address credited with block rewards.
    pub fn address(&self) -> Address {
        self.address
    }

    /// Run one mining cycle.
    ///
    /// `shutdown` is polled alongside the restart check so a long search can
    /// be interrupted.
    pub fn mine_once(&self, shutdown: &AtomicBool) -> Result<MineOutcome> {
        let (pool_size, pending) = {
            let mempool = self.mempool.lock();
            (
                mempool.len(),
                mempool.get_pending(self.config.max_block_transactions),
            )
        };
        if pool_size == 0 {
            return Ok(MineOutcome::Idle);
        }

        let (tip, included, dropped) = {
            let chain = self.chain.read();
            let (fresh, replayed): (Vec<_>, Vec<_>) = pending
                .into_iter()
                .partition(|tx| !chain.contains_transaction(&tx.hash));
            let (included, mut dropped) = Executor::new(chain.ledger()).select_executable(fresh);
            dropped.extend(replayed);
            (chain.last_block().clone(), included, dropped)
        };

        if !dropped.is_empty() {
            let hashes: Vec<Hash> = dropped.iter().map(|tx| tx.hash).collect();
            let removed = self.mempool.lock().remove_batch(&hashes);
            debug!(removed, "dropped transactions that no longer apply");
        }
        if included.is_empty() {
            return Ok(MineOutcome::Idle);
        }
        let pool_size = pool_size - dropped.len();

        let mut block = Block::new(
            tip.index + 1,
            tip.hash,
            included,
            self.pow.config().reward,
            self.address,
        );
        debug!(index = block.index, txs = block.tx_count(), "searching for nonce");

        let outcome = self.pow.search(&mut block, || {
            if shutdown.load(Ordering::Relaxed) {
                return true;
            }
            let pool_changed = self.mempool.lock().len() != pool_size;
            pool_changed || self.chain.read().last_block().hash != tip.hash
        })?;

        if let SearchOutcome::Restart { attempts } = outcome {
            debug!(attempts, "restarting candidate");
            return Ok(MineOutcome::Restarted);
        }

        let peers = &self.peers;
        let block = match self.chain.commit_mined(block, |sealed| {
            peers.broadcast(&Message::block_reception(sealed).encode());
        }) {
            Ok(block) => block,
            Err(BlockchainError::TipChanged) => return Ok(MineOutcome::Restarted),
            Err(e) => return Err(e.into()),
        };

        self.mempool.lock().remove_batch(&block.tx_hashes());
        Ok(MineOutcome::Mined(block))
    }

    /// Mine until `shutdown` is raised.
    pub fn run(&self, shutdown: &AtomicBool) {
        info!(address = %self.address.to_hex(), "miner started");
        while !shutdown.load(Ordering::Relaxed) {
            match self.mine_once(shutdown) {
                Ok(MineOutcome::Idle) => thread::sleep(self.config.idle_interval),
                Ok(MineOutcome::Restarted) | Ok(MineOutcome::Mined(_)) => {}
                Err(e) => {
                    warn!(error = %e, "mining cycle failed");
                    thread::sleep(self.config.idle_interval);
                }
            }
        }
        info!("miner stopped");
    }

    /// Run the miner on its own thread.
    pub fn spawn(self, shutdown: Arc<AtomicBool>) -> std::io::Result<JoinHandle<()>> {
        thread::Builder::new()
            .name("miner".into())
            .spawn(move || self.run(&shutdown))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::Rpc;
    use crate::peer::ChannelSink;
    use wotschain_chain::Blockchain;
    use wotschain_consensus::PowConfig;
    use wotschain_core::{MerkleSigTree, Transaction, BLOCK_REWARD};

    struct Fixture {
        miner: Miner,
        chain: SharedChain,
        mempool: Arc<Mutex<Mempool>>,
        outbound: crossbeam_channel::Receiver<crate::peer::Outbound>,
        keys: MerkleSigTree,
    }

    fn fixture(difficulty: usize) -> Fixture {
        let keys = MerkleSigTree::generate(2).unwrap();
        let chain = SharedChain::new(Blockchain::with_genesis(keys.public_key(), BLOCK_REWARD));
        let mempool = Arc::new(Mutex::new(Mempool::new()));
        let (sink, outbound) = ChannelSink::new();
        sink.add_peer("peer");
        let miner = Miner::new(
            chain.clone(),
            mempool.clone(),
            Arc::new(sink),
            ProofOfWork::new(PowConfig::new(difficulty)),
            MinerConfig::default(),
            keys.public_key(),
        );
        Fixture {
            miner,
            chain,
            mempool,
            outbound,
            keys,
        }
    }

    #[test]
    fn test_idle_on_empty_mempool() {
        let f = fixture(1);
        assert_eq!(
            f.miner.mine_once(&AtomicBool::new(false)).unwrap(),
            MineOutcome::Idle
        );
        assert_eq!(f.chain.last_index(), 0);
    }

    #[test]
    fn test_mines_pending_transfer() {
        let mut f = fixture(1);
        let bob = Address::from_bytes([2u8; 32]);
        let tx = Transaction::transfer(&mut f.keys, bob, 1).unwrap();
        f.mempool.lock().add(tx.clone()).unwrap();

        let outcome = f.miner.mine_once(&AtomicBool::new(false)).unwrap();
        let block = match outcome {
            MineOutcome::Mined(block) => block,
            other => panic!("expected a block, got {:?}", other),
        };

        assert_eq!(block.index, 1);
        assert_eq!(block.transactions, vec![tx]);
        assert!(block.hash.to_hex().starts_with('0'));
        assert_eq!(f.chain.last_block(), block);
        assert_eq!(f.chain.balance(&bob), 1);
        assert!(f.mempool.lock().is_empty());

        let sent = f.outbound.try_recv().unwrap();
        let message = Message::decode(&sent.bytes).unwrap();
        assert_eq!(message.rpc, Rpc::BlockReception);
        assert_eq!(message.decode_payload::<Block>().unwrap(), block);
    }

    #[test]
    fn test_drops_unfundable_transfers() {
        let f = fixture(1);
        let mut stranger = MerkleSigTree::generate(1).unwrap();
        let tx = Transaction::transfer(&mut stranger, Address::ZERO, 5).unwrap();
        f.mempool.lock().add(tx).unwrap();

        assert_eq!(
            f.miner.mine_once(&AtomicBool::new(false)).unwrap(),
            MineOutcome::Idle
        );
        assert!(f.mempool.lock().is_empty());
        assert_eq!(f.chain.last_index(), 0);
    }

    #[test]
    fn test_shutdown_restarts_search() {
        // Unreachable difficulty: only the restart check ends the search.
        let mut f = fixture(64);
        let tx = Transaction::transfer(&mut f.keys, Address::ZERO, 1).unwrap();
        f.mempool.lock().add(tx).unwrap();

        assert_eq!(
            f.miner.mine_once(&AtomicBool::new(true)).unwrap(),
            MineOutcome::Restarted
        );
        assert_eq!(f.chain.last_index(), 0);
        assert_eq!(f.mempool.lock().len(), 1);
        assert!(f.outbound.try_recv().is_err());
    }

    /// Mine at an unreachable difficulty while `interfere` runs on another
    /// thread. A watchdog raises shutdown so the search always ends.
    fn mine_while(f: &Fixture, interfere: impl FnOnce() + Send + 'static) -> MineOutcome {
        let shutdown = Arc::new(AtomicBool::new(false));
        let watchdog = {
            let shutdown = shutdown.clone();
            thread::spawn(move || {
                thread::sleep(std::time::Duration::from_millis(100));
                interfere();
                thread::sleep(std::time::Duration::from_secs(30));
                shutdown.store(true, Ordering::Relaxed);
            })
        };
        let outcome = f.miner.mine_once(&shutdown).unwrap();
        shutdown.store(true, Ordering::Relaxed);
        drop(watchdog);
        outcome
    }

    #[test]
    fn test_restarts_when_tip_moves() {
        let mut f = fixture(64);
        let tx = Transaction::transfer(&mut f.keys, Address::ZERO, 1).unwrap();
        f.mempool.lock().add(tx).unwrap();

        let chain = f.chain.clone();
        let other = Address::from_bytes([7u8; 32]);
        let outcome = mine_while(&f, move || {
            let tip = chain.last_block();
            let block = Block::new(tip.index + 1, tip.hash, vec![], BLOCK_REWARD, other);
            chain.commit_mined(block, |_| {}).unwrap();
        });

        assert_eq!(outcome, MineOutcome::Restarted);
        let tip = f.chain.last_block();
        assert_eq!(tip.index, 1);
        assert_eq!(tip.miner_address, other);
        assert_eq!(f.mempool.lock().len(), 1);
        assert!(f.outbound.try_recv().is_err());
    }

    #[test]
    fn test_restarts_when_mempool_changes() {
        let mut f = fixture(64);
        let first = Transaction::transfer(&mut f.keys, Address::ZERO, 1).unwrap();
        let second = Transaction::transfer(&mut f.keys, Address::ZERO, 2).unwrap();
        f.mempool.lock().add(first).unwrap();

        let mempool = f.mempool.clone();
        let outcome = mine_while(&f, move || {
            mempool.lock().add(second).unwrap();
        });

        assert_eq!(outcome, MineOutcome::Restarted);
        assert_eq!(f.chain.last_index(), 0);
        assert_eq!(f.mempool.lock().len(), 2);
        assert!(f.outbound.try_recv().is_err());
    }

    #[test]
    fn test_spawned_miner_stops_on_shutdown() {
        let f = fixture(1);
        let shutdown = Arc::new(AtomicBool::new(false));
        let handle = f.miner.clone().spawn(shutdown.clone()).unwrap();

        shutdown.store(true, Ordering::Relaxed);
        handle.join().unwrap();
    }
}
