//! Node facade.
//!
//! Turns decoded peer messages into chain and mempool operations and owns the
//! node's signing key. Every entry point that takes bytes returns a
//! [`Verdict`]; malformed input is logged and rejected, never propagated.

use crate::config::NodeConfig;
use crate::message::{CodecError, Message, Rpc};
use crate::miner::Miner;
use crate::peer::{PeerId, PeerSink};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use thiserror::Error;
use tracing::{debug, info, warn};
use wotschain_chain::{Blockchain, BlockchainError, Mempool, SharedChain};
use wotschain_consensus::{ProofOfWork, ValidationError};
use wotschain_core::{
    Address, Block, CryptoError, Hash, MerkleSigTree, Transaction, TransactionError,
};

/// Errors surfaced to the local operator.
#[derive(Debug, Error)]
pub enum NodeError {
    #[error(transparent)]
    Decode(#[from] CodecError),

    #[error("signing key exhausted after {0} signatures")]
    KeyExhausted(usize),

    #[error("key error: {0}")]
    Key(#[from] CryptoError),

    #[error("transaction rejected: {0}")]
    Rejected(String),

    #[error("miner thread could not be started: {0}")]
    Spawn(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, NodeError>;

/// Outcome of handing a value to the node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Accepted,
    Rejected(String),
}

impl Verdict {
    pub fn is_accepted(&self) -> bool {
        matches!(self, Verdict::Accepted)
    }

    fn rejected(reason: impl ToString) -> Self {
        Verdict::Rejected(reason.to_string())
    }
}

/// A ledger node: chain, mempool, signing key and outbound peers.
///
/// Lock order: the mempool lock is never held while the chain lock is
/// acquired.
pub struct Node {
    config: NodeConfig,
    chain: SharedChain,
    mempool: Arc<Mutex<Mempool>>,
    peers: Arc<dyn PeerSink>,
    pow: ProofOfWork,
    signer: Mutex<MerkleSigTree>,
    address: Address,
    shutdown: Arc<AtomicBool>,
    miner_thread: Mutex<Option<JoinHandle<()>>>,
}

impl Node {
    /// Generate a fresh signing tree and start a chain whose genesis pays it.
    pub fn bootstrap(config: NodeConfig, peers: Arc<dyn PeerSink>) -> Result<Self> {
        let signer = MerkleSigTree::generate(config.key_height)?;
        Ok(Self::with_signer(config, signer, peers))
    }

    /// Build a node around an existing signing tree.
    ///
    /// The node starts on its own genesis block; a longer chain received from
    /// a peer replaces it.
    pub fn with_signer(
        config: NodeConfig,
        signer: MerkleSigTree,
        peers: Arc<dyn PeerSink>,
    ) -> Self {
        let address = signer.public_key();
        let pow = ProofOfWork::new(config.pow.clone());
        let chain = SharedChain::new(Blockchain::with_genesis(address, config.pow.reward));
        let mempool = Arc::new(Mutex::new(Mempool::with_config(config.mempool.clone())));

        info!(address = %address.to_hex(), "node initialised");
        Self {
            config,
            chain,
            mempool,
            peers,
            pow,
            signer: Mutex::new(signer),
            address,
            shutdown: Arc::new(AtomicBool::new(false)),
            miner_thread: Mutex::new(None),
        }
    }

    /// The node's address (its MSS root).
    pub fn address(&self) -> Address {
        self.address
    }

    pub fn chain(&self) -> &SharedChain {
        &self.chain
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    /// Balance of `address` at the local tip.
    pub fn balance(&self, address: &Address) -> u64 {
        self.chain.balance(address)
    }

    /// Number of pooled transactions.
    pub fn mempool_len(&self) -> usize {
        self.mempool.lock().len()
    }

    pub fn mempool_contains(&self, tx_hash: &Hash) -> bool {
        self.mempool.lock().contains(tx_hash)
    }

    /// Signatures left before the key is exhausted.
    pub fn remaining_signatures(&self) -> usize {
        self.signer.lock().remaining()
    }

    /// A miner sharing this node's chain, mempool and peers.
    pub fn miner(&self) -> Miner {
        Miner::new(
            self.chain.clone(),
            self.mempool.clone(),
            self.peers.clone(),
            self.pow.clone(),
            self.config.miner.clone(),
            self.address,
        )
    }

    /// Start the background miner. Does nothing if it is already running.
    pub fn start_mining(&self) -> Result<()> {
        let mut slot = self.miner_thread.lock();
        if slot.is_some() {
            return Ok(());
        }
        self.shutdown.store(false, Ordering::Relaxed);
        *slot = Some(self.miner().spawn(self.shutdown.clone())?);
        Ok(())
    }

    /// Raise the shutdown flag and wait for the miner thread.
    pub fn stop(&self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(handle) = self.miner_thread.lock().take() {
            if handle.join().is_err() {
                warn!("miner thread panicked");
            }
        }
    }

    /// Queue a message for every peer.
    pub fn broadcast(&self, message: &Message) {
        self.peers.broadcast(&message.encode());
    }

    /// Ask every peer for its chain.
    pub fn request_chain(&self) {
        debug!("requesting chain from peers");
        self.broadcast(&Message::blockchain_request());
    }

    /// Dispatch one envelope from `peer`. Returns the reply, if any.
    pub fn handle_message(&self, peer: &PeerId, bytes: &[u8]) -> Option<Vec<u8>> {
        let message = match Message::decode(bytes) {
            Ok(message) => message,
            Err(e) => {
                warn!(peer = %peer, error = %e, "dropping malformed message");
                return None;
            }
        };
        debug!(peer = %peer, rpc = ?message.rpc, "received message");

        let verdict = match message.rpc {
            Rpc::BlockchainRequest => {
                let snapshot = self.chain.snapshot();
                return Some(Message::blockchain_reception(&snapshot).encode());
            }
            Rpc::BlockchainReception => self.on_chain(message.payload.as_bytes()),
            Rpc::BlockReception => self.on_block(message.payload.as_bytes()),
            Rpc::TransactionRequest => self.on_transaction(message.payload.as_bytes()),
        };

        if let Verdict::Rejected(reason) = &verdict {
            debug!(peer = %peer, rpc = ?message.rpc, reason = %reason, "rejected");
        }
        None
    }

    /// Decode and admit a transaction.
    pub fn on_transaction(&self, bytes: &[u8]) -> Verdict {
        match decode::<Transaction>(bytes) {
            Ok(tx) => self.accept_transaction(tx),
            Err(e) => Verdict::rejected(e),
        }
    }

    /// Decode and import a block.
    pub fn on_block(&self, bytes: &[u8]) -> Verdict {
        match decode::<Block>(bytes) {
            Ok(block) => self.accept_block(block),
            Err(e) => Verdict::rejected(e),
        }
    }

    /// Decode a chain and adopt it if it is longer and valid.
    pub fn on_chain(&self, bytes: &[u8]) -> Verdict {
        match decode::<Blockchain>(bytes) {
            Ok(candidate) => self.accept_chain(candidate),
            Err(e) => Verdict::rejected(e),
        }
    }

    /// Validate a transaction against the tip and pool it.
    pub fn accept_transaction(&self, tx: Transaction) -> Verdict {
        if let Err(e) = self.chain.read().check_transaction(&tx) {
            return Verdict::rejected(e);
        }
        match self.mempool.lock().add(tx) {
            Ok(()) => Verdict::Accepted,
            Err(e) => Verdict::rejected(e),
        }
    }

    /// Import a block that extends the tip.
    ///
    /// A block from further ahead, a block at the next index built on a
    /// different parent, or one whose replayed state disagrees with its state
    /// root means this node is behind or forked: the block is dropped and the
    /// peers are asked for their chain.
    pub fn accept_block(&self, block: Block) -> Verdict {
        let tx_hashes = block.tx_hashes();
        let index = block.index;

        match self.chain.import_block(block, &self.pow) {
            Ok(result) => {
                let removed = self.mempool.lock().remove_batch(&tx_hashes);
                info!(index, hash = %result.block_hash, removed, "accepted block");
                Verdict::Accepted
            }
            Err(e @ BlockchainError::StateDivergence { .. }) => {
                warn!(index, error = %e, "state diverged from peer block");
                self.request_chain();
                Verdict::rejected(e)
            }
            Err(e @ BlockchainError::BlockAhead { .. }) => {
                debug!(index, error = %e, "peer is ahead");
                self.request_chain();
                Verdict::rejected(e)
            }
            Err(e @ BlockchainError::Validation(ValidationError::InvalidPrevHash)) => {
                debug!(index, error = %e, "peer is on another fork");
                self.request_chain();
                Verdict::rejected(e)
            }
            Err(e) => Verdict::rejected(e),
        }
    }

    /// Replace the local chain with a longer valid one.
    pub fn accept_chain(&self, candidate: Blockchain) -> Verdict {
        match self.chain.replace(candidate, &self.pow) {
            Ok(()) => {
                self.prune_mempool();
                Verdict::Accepted
            }
            Err(e) => Verdict::rejected(e),
        }
    }

    /// Drop pooled transactions that no longer pass admission at the tip.
    pub fn prune_mempool(&self) -> usize {
        let pending = {
            let mempool = self.mempool.lock();
            mempool.get_pending(mempool.len())
        };

        let stale: Vec<Hash> = {
            let chain = self.chain.read();
            pending
                .iter()
                .filter(|tx| chain.check_transaction(tx).is_err())
                .map(|tx| tx.hash)
                .collect()
        };

        let removed = self.mempool.lock().remove_batch(&stale);
        if removed > 0 {
            debug!(removed, "pruned mempool");
        }
        removed
    }

    /// Sign a transfer with the node's key, pool it and send it to peers.
    ///
    /// The balance is checked before signing so a rejected transfer does not
    /// burn a one-time key. Once the key is exhausted every call fails.
    pub fn submit_transfer(&self, receiver: Address, amount: u64) -> Result<Transaction> {
        let available = self.balance(&self.address);
        if amount > available {
            return Err(NodeError::Rejected(format!(
                "insufficient balance (required {amount}, available {available})"
            )));
        }

        let tx = {
            let mut signer = self.signer.lock();
            match Transaction::transfer(&mut signer, receiver, amount) {
                Ok(tx) => tx,
                Err(TransactionError::Crypto(CryptoError::KeyExhausted(used))) => {
                    return Err(NodeError::KeyExhausted(used))
                }
                Err(TransactionError::Crypto(e)) => return Err(e.into()),
                Err(e) => return Err(NodeError::Rejected(e.to_string())),
            }
        };

        if let Verdict::Rejected(reason) = self.accept_transaction(tx.clone()) {
            return Err(NodeError::Rejected(reason));
        }

        info!(hash = %tx.hash, to = %receiver.to_hex(), amount, "submitted transfer");
        self.broadcast(&Message::transaction_request(&tx));
        Ok(tx)
    }
}

impl Drop for Node {
    fn drop(&mut self) {
        self.stop();
    }
}

fn decode<T: serde::de::DeserializeOwned>(bytes: &[u8]) -> Result<T> {
    serde_json::from_slice(bytes).map_err(|e| NodeError::Decode(CodecError::from(e)))
}
