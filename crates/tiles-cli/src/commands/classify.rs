//! `tiles classify` -- one-shot batch classification.
//!
//! The input is a JSON array of descriptors, or a full `CLASSIFY_BATCH`
//! message. The reply object is printed to stdout.

use std::path::{Path, PathBuf};

use anyhow::Context;
use clap::Args;
use serde_json::{Value, json};
use tiles_core::StoreKind;
use tokio::io::AsyncReadExt;

use super::load_engine;

/// Arguments for `tiles classify`.
#[derive(Args)]
pub struct ClassifyArgs {
    /// Input file, or `-` for stdin.
    #[arg(default_value = "-")]
    pub input: PathBuf,

    /// Keep the cache in memory instead of the cache file.
    #[arg(long)]
    pub no_cache: bool,

    /// Print the reply on a single line.
    #[arg(long)]
    pub compact: bool,
}

pub async fn run(args: ClassifyArgs, config: Option<&Path>) -> anyhow::Result<()> {
    let text = if args.input.as_os_str() == "-" {
        let mut buf = String::new();
        tokio::io::stdin()
            .read_to_string(&mut buf)
            .await
            .context("failed to read stdin")?;
        buf
    } else {
        tokio::fs::read_to_string(&args.input)
            .await
            .with_context(|| format!("failed to read {}", args.input.display()))?
    };
    let input: Value = serde_json::from_str(&text).context("input is not valid JSON")?;

    let store = if args.no_cache { StoreKind::Memory } else { StoreKind::File };
    let engine = load_engine(config, store).await?;
    let reply = engine.router().handle(to_message(input)).await;
    engine.shutdown().await;

    let out = if args.compact {
        serde_json::to_string(&reply)?
    } else {
        serde_json::to_string_pretty(&reply)?
    };
    println!("{out}");

    if reply["ok"] != Value::Bool(true) {
        anyhow::bail!(
            "classification failed: {}",
            reply["error"].as_str().unwrap_or("stale")
        );
    }
    Ok(())
}

/// Wrap a bare descriptor array in a `CLASSIFY_BATCH` message.
fn to_message(input: Value) -> Value {
    if input.get("type").is_some() {
        input
    } else {
        json!({ "type": "CLASSIFY_BATCH", "payload": input })
    }
}
