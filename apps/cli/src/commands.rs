//! CLI command definitions, routing, and tracing setup.

use clap::{Parser, Subcommand};
use color_eyre::eyre::Result;
use dartsearch_core::DeepSearch;
use dartsearch_shared::{AppConfig, RunOptions};
use tokio_util::sync::CancellationToken;
use tracing::info;

// ---------------------------------------------------------------------------
// CLI structure
// ---------------------------------------------------------------------------

/// dartsearch — natural-language deep search over DART corporate disclosures.
#[derive(Parser)]
#[command(
    name = "dartsearch",
    version,
    about = "Answer natural-language questions about Korean corporate disclosures.",
    long_about = None,
)]
pub(crate) struct Cli {
    /// Verbosity level (-v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

/// Top-level CLI subcommands.
#[derive(Subcommand)]
pub(crate) enum Command {
    /// Run one deep search and print the JSON response envelope.
    Ask {
        /// The natural-language question.
        query: String,

        /// Maximum search attempts for the sufficiency loop.
        #[arg(long)]
        max_attempts: Option<u32>,

        /// Per-search result cap (up to 100).
        #[arg(long)]
        max_results_per_search: Option<usize>,

        /// Answer language: ko or en.
        #[arg(long, default_value = "ko")]
        language: String,
    },
}

/// Initialize tracing from the verbosity flags (RUST_LOG overrides).
pub(crate) fn init_tracing(cli: &Cli) {
    let default_level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Route and execute the parsed command.
pub(crate) async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Ask {
            query,
            max_attempts,
            max_results_per_search,
            language,
        } => {
            let config = AppConfig::from_env()?;
            let options = RunOptions {
                max_attempts: max_attempts.unwrap_or(config.pipeline.max_attempts),
                max_results_per_search: max_results_per_search
                    .unwrap_or(config.pipeline.max_results_per_search),
                language,
            };

            let pipeline = DeepSearch::new(config)?;
            let cancel = CancellationToken::new();

            // Ctrl-C cancels the run; the pipeline returns a Cancelled
            // envelope instead of tearing the process down.
            let ctrl_c_cancel = cancel.clone();
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    info!("interrupt received; cancelling run");
                    ctrl_c_cancel.cancel();
                }
            });

            let envelope = pipeline.run(&query, options, cancel).await;
            println!("{}", serde_json::to_string_pretty(&envelope)?);
            Ok(())
        }
    }
}
