//! `tiles cache` -- inspect and maintain the label cache.
//!
//! # Examples
//!
//! ```text
//! tiles cache stats
//! tiles cache dump --limit 50
//! tiles cache purge
//! tiles cache clear
//! ```

use std::path::Path;

use clap::Subcommand;
use comfy_table::{Table, presets::UTF8_FULL};
use tiles_core::{CacheEntry, CacheStats, StoreKind};

use super::load_engine;

/// Subcommands for `tiles cache`.
#[derive(Subcommand)]
pub enum CacheAction {
    /// Show entry counts, age range and label distribution.
    Stats {
        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// List the newest entries.
    Dump {
        /// Maximum number of entries.
        #[arg(long, default_value = "20")]
        limit: usize,

        /// Print JSON instead of a table.
        #[arg(long)]
        json: bool,
    },

    /// Remove expired entries and enforce capacity.
    Purge,

    /// Remove every entry.
    Clear,
}

pub async fn run(action: CacheAction, config: Option<&Path>) -> anyhow::Result<()> {
    let engine = load_engine(config, StoreKind::File).await?;
    let cache = engine.cache();

    match action {
        CacheAction::Stats { json } => {
            let stats = cache.stats().await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&stats)?);
            } else {
                println!("{}", stats_table(&stats));
            }
        }
        CacheAction::Dump { limit, json } => {
            let entries = cache.dump(limit).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&entries)?);
            } else if entries.is_empty() {
                println!("Cache is empty.");
            } else {
                println!("{}", entries_table(&entries));
            }
        }
        CacheAction::Purge => {
            let report = cache.purge().await?;
            println!(
                "Purged {} expired and {} evicted entries; {} remain.",
                report.expired, report.evicted, report.remaining
            );
        }
        CacheAction::Clear => {
            cache.clear().await?;
            println!("Cache cleared.");
        }
    }
    Ok(())
}

/// Format a `chrono::DateTime<Utc>` as a human-readable string.
fn format_datetime(dt: &chrono::DateTime<chrono::Utc>) -> String {
    dt.format("%Y-%m-%d %H:%M:%S").to_string()
}

fn stats_table(stats: &CacheStats) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["entries".to_string(), stats.entries.to_string()]);
    table.add_row(vec!["stale".to_string(), stats.stale.to_string()]);
    let oldest = stats.oldest.as_ref().map_or_else(|| "-".into(), format_datetime);
    let newest = stats.newest.as_ref().map_or_else(|| "-".into(), format_datetime);
    table.add_row(vec!["oldest".to_string(), oldest]);
    table.add_row(vec!["newest".to_string(), newest]);
    for (label, count) in &stats.by_label {
        table.add_row(vec![label.clone(), count.to_string()]);
    }
    table
}

fn entries_table(entries: &[CacheEntry]) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_FULL);
    table.set_header(vec!["Key", "Label", "Confidence", "Created", "Last access"]);
    for e in entries {
        table.add_row(vec![
            e.key.as_str().chars().take(12).collect::<String>(),
            e.label.to_string(),
            format!("{:.2}", e.confidence),
            format_datetime(&e.created_at),
            format_datetime(&e.last_access),
        ]);
    }
    table
}
