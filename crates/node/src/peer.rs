//! Outbound side of the peer set.
//!
//! The node never performs network I/O itself. It hands serialized messages
//! to a [`PeerSink`]; the transport owns sockets and drains the sink.

use crossbeam_channel::{unbounded, Receiver, Sender};
use parking_lot::RwLock;
use std::collections::BTreeSet;
use tracing::debug;

/// Peer identifier, typically a `host:port` string.
pub type PeerId = String;

/// Destination for messages leaving the node.
pub trait PeerSink: Send + Sync {
    /// Queue `bytes` for one peer. Must not block on the network.
    fn send(&self, peer: &PeerId, bytes: Vec<u8>);

    /// Visit every known peer.
    fn for_each_peer(&self, f: &mut dyn FnMut(&PeerId));

    /// Queue `bytes` for every known peer.
    fn broadcast(&self, bytes: &[u8]) {
        let mut peers = Vec::new();
        self.for_each_peer(&mut |peer| peers.push(peer.clone()));
        for peer in &peers {
            self.send(peer, bytes.to_vec());
        }
    }
}

/// A message queued for a peer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Outbound {
    pub peer: PeerId,
    pub bytes: Vec<u8>,
}

/// [`PeerSink`] that pushes onto an unbounded channel.
pub struct ChannelSink {
    peers: RwLock<BTreeSet<PeerId>>,
    queue: Sender<Outbound>,
}

impl ChannelSink {
    /// Create a sink and the receiver a transport drains.
    pub fn new() -> (Self, Receiver<Outbound>) {
        let (queue, outbound) = unbounded();
        let sink = Self {
            peers: RwLock::new(BTreeSet::new()),
            queue,
        };
        (sink, outbound)
    }

    /// Register a peer. Returns false if it was already known.
    pub fn add_peer(&self, peer: impl Into<PeerId>) -> bool {
        self.peers.write().insert(peer.into())
    }

    pub fn remove_peer(&self, peer: &PeerId) -> bool {
        self.peers.write().remove(peer)
    }

    pub fn peer_count(&self) -> usize {
        self.peers.read().len()
    }
}

impl PeerSink for ChannelSink {
    fn send(&self, peer: &PeerId, bytes: Vec<u8>) {
        let message = Outbound {
            peer: peer.clone(),
            bytes,
        };
        if self.queue.send(message).is_err() {
            debug!(peer = %peer, "outbound queue closed, dropping message");
        }
    }

    fn for_each_peer(&self, f: &mut dyn FnMut(&PeerId)) {
        for peer in self.peers.read().iter() {
            f(peer);
        }
    }
}
