//! wotschain CLI entry point.

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod commands;

#[derive(Parser)]
#[command(name = "wotschain")]
#[command(about = "A minimal proof-of-work ledger with hash-based signatures", long_about = None)]
struct Cli {
    /// Log filter, e.g. `debug` or `wotschain_node=trace`
    #[arg(long, global = true, default_value = "info")]
    log: String,

    #[command(subcommand)]
    command: Option<commands::Commands>,
}

fn main() {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    match cli.command {
        Some(cmd) => {
            if let Err(e) = commands::run(cmd) {
                eprintln!("Error: {:#}", e);
                std::process::exit(1);
            }
        }
        None => {
            println!("wotschain - A minimal proof-of-work ledger with hash-based signatures");
            println!("Run 'wotschain --help' for usage information.");
        }
    }
}
