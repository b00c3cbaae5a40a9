//! Node layer for wotschain.
//!
//! This crate wires the chain, the mempool and the signing key together:
//! - **Node**: entry points for peer messages and local transfers
//! - **Miner**: background proof-of-work loop
//! - **Message**: the JSON envelope exchanged with peers
//! - **Peer**: the outbound sink a transport drains
//!
//! The transport itself (sockets, framing, peer discovery) lives outside this
//! crate. It feeds received bytes to [`Node::handle_message`] and drains the
//! [`ChannelSink`] receiver.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use wotschain_core::Address;
//! use wotschain_node::{ChannelSink, Node, NodeConfig};
//!
//! let (sink, outbound) = ChannelSink::new();
//! sink.add_peer("127.0.0.1:3001");
//!
//! let node = Node::bootstrap(NodeConfig::default(), Arc::new(sink)).unwrap();
//! node.start_mining().unwrap();
//! node.submit_transfer(Address::ZERO, 1).unwrap();
//!
//! for message in outbound.iter() {
//!     // write message.bytes to message.peer
//! }
//! ```

pub mod config;
pub mod message;
pub mod miner;
pub mod node;
pub mod peer;

// Re-export commonly used types
pub use config::{MinerConfig, NodeConfig};
pub use message::{CodecError, Message, Rpc};
pub use miner::{MineOutcome, Miner, MinerError};
pub use node::{Node, NodeError, Verdict};
pub use peer::{ChannelSink, Outbound, PeerId, PeerSink};
