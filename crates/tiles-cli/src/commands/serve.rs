//! `tiles serve` -- message server on stdio.
//!
//! Reads one JSON request per line from stdin and writes one JSON reply per
//! line to stdout. Runs the cache maintenance task while serving and flushes
//! pending cache writes on EOF.

use std::path::Path;

use clap::Args;
use tiles_core::StoreKind;
use tokio::io::BufReader;
use tokio_util::sync::CancellationToken;
use tracing::info;

use super::load_engine;

/// Arguments for `tiles serve`.
#[derive(Args)]
pub struct ServeArgs {
    /// Keep the cache in memory instead of the cache file.
    #[arg(long)]
    pub no_cache: bool,
}

pub async fn run(args: ServeArgs, config: Option<&Path>) -> anyhow::Result<()> {
    let store = if args.no_cache { StoreKind::Memory } else { StoreKind::File };
    let engine = load_engine(config, store).await?;

    let cancel = CancellationToken::new();
    let maintenance = engine.spawn_maintenance(cancel.clone());
    info!(version = env!("CARGO_PKG_VERSION"), "serving on stdio");

    let served = tiles_core::server::serve(
        engine.router().clone(),
        BufReader::new(tokio::io::stdin()),
        tokio::io::stdout(),
    )
    .await;

    cancel.cancel();
    let _ = maintenance.await;
    engine.shutdown().await;
    served?;
    Ok(())
}
