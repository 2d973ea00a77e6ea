//! dartsearch CLI — deep search over Korean corporate disclosures.
//!
//! Interprets a natural-language question, drives the retrieval pipeline,
//! and prints the response envelope as JSON.

mod commands;

use clap::Parser;
use color_eyre::eyre::Result;

use commands::Cli;

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;
    let cli = Cli::parse();
    commands::init_tracing(&cli);
    commands::run(cli).await
}
