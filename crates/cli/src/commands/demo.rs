//! Two-node demo.
//!
//! Node A pays node B, mines the transfer on its background miner, and B
//! then catches up by requesting A's chain. Messages travel through the
//! nodes' outbound queues, routed in-process.

use anyhow::{bail, Context, Result};
use clap::Args;
use colored::Colorize;
use crossbeam_channel::Receiver;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use tracing::debug;
use wotschain_node::{ChannelSink, Node, NodeConfig, Outbound};

#[derive(Args)]
pub struct DemoArgs {
    /// Leading zero hex characters required in block hashes
    #[arg(short, long, default_value_t = 3)]
    difficulty: usize,

    /// Signing tree height for both nodes
    #[arg(long, default_value_t = 4)]
    height: u32,

    /// Amount A sends to B
    #[arg(short, long, default_value_t = 1)]
    amount: u64,

    /// Seconds to wait for the block before giving up
    #[arg(long, default_value_t = 60)]
    timeout: u64,
}

/// A node with its name and outbound queue.
struct Peer {
    name: &'static str,
    node: Node,
    outbound: Receiver<Outbound>,
}

impl Peer {
    fn start(name: &'static str, other: &'static str, config: NodeConfig) -> Result<Self> {
        let (sink, outbound) = ChannelSink::new();
        sink.add_peer(other);
        let node = Node::bootstrap(config, Arc::new(sink))
            .with_context(|| format!("failed to start node {name}"))?;
        Ok(Self {
            name,
            node,
            outbound,
        })
    }
}

/// Deliver everything `from` has queued to `to`, routing replies back.
fn route(from: &Peer, to: &Peer) -> usize {
    let mut delivered = 0;
    for message in from.outbound.try_iter() {
        debug!(from = from.name, to = %message.peer, "delivering");
        if let Some(reply) = to.node.handle_message(&from.name.to_string(), &message.bytes) {
            from.node.handle_message(&to.name.to_string(), &reply);
        }
        delivered += 1;
    }
    delivered
}

pub fn run(args: DemoArgs) -> Result<()> {
    println!("{}", "Starting two nodes...".bold().cyan());
    let config = NodeConfig::default()
        .with_difficulty(args.difficulty)
        .with_key_height(args.height)
        .with_idle_interval(Duration::from_millis(50));

    let a = Peer::start("a", "b", config.clone())?;
    let b = Peer::start("b", "a", config)?;
    println!("  A: {}", a.node.address().to_hex().bright_yellow());
    println!("  B: {}", b.node.address().to_hex().bright_yellow());

    println!();
    println!("{}", "A pays B and mines...".bold());
    let tx = a.node.submit_transfer(b.node.address(), args.amount)?;
    println!("  Transaction {} (leaf {})", tx.hash, tx.signature.index);

    a.node.start_mining()?;
    let deadline = Instant::now() + Duration::from_secs(args.timeout);
    while a.node.chain().last_index() == 0 {
        if Instant::now() > deadline {
            a.node.stop();
            bail!("no block found within {} seconds", args.timeout);
        }
        thread::sleep(Duration::from_millis(20));
    }
    a.node.stop();

    let tip = a.node.chain().last_block();
    println!("  Block {} {}", tip.index, tip.hash.to_string().green());
    println!("  State root {}", tip.state_root);

    println!();
    println!("{}", "B syncs from A...".bold());
    let gossiped = route(&a, &b);
    b.node.request_chain();
    route(&b, &a);
    println!("  Delivered {} broadcast messages and one chain", gossiped);

    let synced = b.node.chain().snapshot() == a.node.chain().snapshot();
    println!();
    println!("{}", "Balances".bold());
    for (label, address) in [("A", a.node.address()), ("B", b.node.address())] {
        println!(
            "  {}: {} on A, {} on B",
            label,
            a.node.balance(&address),
            b.node.balance(&address)
        );
    }

    println!();
    println!("{}", "Chains".bold());
    for peer in [&a, &b] {
        let stats = peer.node.chain().read().stats();
        println!(
            "  {}: height {}, {} accounts, supply {}, tip {}",
            peer.name.to_uppercase(),
            stats.height,
            stats.accounts,
            stats.total_supply,
            stats.latest_block_hash
        );
    }

    println!();
    if synced {
        println!("{}  Both nodes agree on the chain", "✓".green().bold());
    } else {
        println!("{}  Nodes disagree on the chain", "✗".red().bold());
        bail!("chain sync failed");
    }

    Ok(())
}
