//! Binary crate for the `avalanche` command-line tool.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Interactive configuration
//! - Human-friendly output formatting

use anyhow::anyhow;
use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;

fn init_tracing(verbose: bool) -> anyhow::Result<()> {
    let default = if verbose {
        "avalanche_core=debug,avalanche=debug"
    } else {
        "avalanche_core=info,avalanche=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(true)
        .try_init()
        .map_err(|err| anyhow!("failed to install tracing subscriber: {err}"))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::Cli::parse();
    init_tracing(cmd.verbose)?;
    cmd.run().await
}
