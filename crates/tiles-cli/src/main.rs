//! `tiles` -- CLI binary for the tiles classification engine.
//!
//! Provides the following subcommands:
//!
//! - `tiles serve` -- Answer JSON messages on stdin/stdout, one per line.
//! - `tiles classify` -- Classify one batch from a file or stdin.
//! - `tiles cache` -- Inspect and maintain the durable label cache.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

/// tiles classification engine CLI.
#[derive(Parser)]
#[command(name = "tiles", about = "tiles classification engine CLI", version)]
struct Cli {
    /// Enable verbose (debug-level) logging.
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Config file path (overrides auto-discovery).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Top-level subcommands.
#[derive(Subcommand)]
enum Commands {
    /// Serve newline-delimited JSON messages on stdin/stdout.
    Serve(commands::serve::ServeArgs),

    /// Classify a JSON batch of descriptors.
    Classify(commands::classify::ClassifyArgs),

    /// Inspect and maintain the label cache.
    Cache {
        #[command(subcommand)]
        action: commands::cache_cmd::CacheAction,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // stdout carries protocol replies; logs go to stderr.
    let default_filter = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| default_filter.into()),
        )
        .init();

    let config = cli.config.as_deref();
    match cli.command {
        Commands::Serve(args) => commands::serve::run(args, config).await?,
        Commands::Classify(args) => commands::classify::run(args, config).await?,
        Commands::Cache { action } => commands::cache_cmd::run(action, config).await?,
    }

    Ok(())
}
