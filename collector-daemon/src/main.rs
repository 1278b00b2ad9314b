//! Binary crate for the weather collection daemon.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Tracing initialization
//! - Signal handling and graceful shutdown

use clap::Parser;

mod cli;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cmd = cli::Cli::parse();
    cmd.run().await
}
