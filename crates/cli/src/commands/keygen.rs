//! Key generation command.

use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use std::time::Instant;
use wotschain_core::mss::{DEFAULT_HEIGHT, MAX_HEIGHT};
use wotschain_core::MerkleSigTree;

#[derive(Args)]
pub struct KeygenArgs {
    /// Tree height; the key signs 2^height transactions
    #[arg(long, default_value_t = DEFAULT_HEIGHT)]
    height: u32,

    /// Print the full secret key record as JSON
    #[arg(long)]
    json: bool,
}

pub fn run(args: KeygenArgs) -> Result<()> {
    println!(
        "{}",
        format!("Generating Merkle signature key (height {})...", args.height)
            .bold()
            .cyan()
    );

    let started = Instant::now();
    let tree = MerkleSigTree::generate(args.height)
        .with_context(|| format!("height must be between 1 and {MAX_HEIGHT}"))?;
    let elapsed = started.elapsed();

    println!();
    println!("  Address:    {}", tree.public_key().to_hex().bright_yellow());
    println!("  Signatures: {}", tree.capacity());
    println!("  Took:       {:.2?}", elapsed);

    if args.json {
        println!();
        println!("{}", serde_json::to_string_pretty(&tree)?);
    } else {
        println!();
        println!(
            "{}",
            "The secret key is not stored; pass --json to print it.".dimmed()
        );
    }

    Ok(())
}
