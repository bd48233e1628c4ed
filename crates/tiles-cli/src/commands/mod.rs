//! Subcommand implementations and shared setup.

pub mod cache_cmd;
pub mod classify;
pub mod serve;

use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tiles_core::{ConfigLoader, Engine, FileSettingsSource, StoreKind};
use tracing::debug;

/// Load the config and wire an [`Engine`].
pub async fn load_engine(config: Option<&Path>, store: StoreKind) -> anyhow::Result<Engine> {
    let loader = ConfigLoader::new(config.map(Path::to_path_buf));
    let cfg = loader.load().await.context("failed to load config")?;
    debug!(path = ?loader.discover(), "config resolved");
    let settings = Arc::new(FileSettingsSource::new(loader));
    Ok(Engine::with_store(cfg, settings, store))
}
