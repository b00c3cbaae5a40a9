//! CLI commands module.

use anyhow::Result;
use clap::Subcommand;

mod demo;
mod keygen;

#[derive(Subcommand)]
pub enum Commands {
    /// Generate a Merkle signature key
    Keygen(keygen::KeygenArgs),
    /// Run two in-process nodes through a transfer and a chain sync
    Demo(demo::DemoArgs),
}

pub fn run(cmd: Commands) -> Result<()> {
    match cmd {
        Commands::Keygen(args) => keygen::run(args),
        Commands::Demo(args) => demo::run(args),
    }
}
