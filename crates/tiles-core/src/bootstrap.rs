//! Application bootstrap and dependency wiring.
//!
//! Provides [`Engine`], which initializes every component from a
//! [`TilesConfig`] and a [`SettingsSource`] and exposes the resulting
//! [`DispatchCoordinator`] and [`MessageRouter`].
//!
//! # Usage
//!
//! ```rust,ignore
//! use tiles_core::bootstrap::Engine;
//! use tiles_core::config_loader::{ConfigLoader, FileSettingsSource};
//!
//! let loader = ConfigLoader::new(None);
//! let config = loader.load().await?;
//! let engine = Engine::new(config, Arc::new(FileSettingsSource::new(loader)));
//! let reply = engine.router().handle(request).await;
//! ```

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use tiles_llm::{
    AdapterContext, GeminiDialect, OpenAiDialect, Provider, ProviderAdapter, RateLimiter,
    RetryConfig, RetryingTransport, SettingsResolver, SettingsSource, select_validator,
};
use tiles_types::config::TilesConfig;

use crate::cache::{CacheStore, DurableCache, JsonFileStore, MemoryStore};
use crate::coordinator::{DispatchCoordinator, ProviderSet};
use crate::messages::MessageRouter;

/// Where cached labels live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreKind {
    /// The JSON file at [`TilesConfig::cache_path`].
    #[default]
    File,
    /// Process memory only.
    Memory,
}

/// Fully initialized engine.
pub struct Engine {
    config: TilesConfig,
    coordinator: Arc<DispatchCoordinator>,
    router: MessageRouter,
}

impl Engine {
    /// Wire the engine with the file-backed cache.
    pub fn new(config: TilesConfig, settings: Arc<dyn SettingsSource>) -> Self {
        Self::with_store(config, settings, StoreKind::File)
    }

    pub fn with_store(config: TilesConfig, settings: Arc<dyn SettingsSource>, store: StoreKind) -> Self {
        let store: Arc<dyn CacheStore> = match store {
            StoreKind::File => {
                let path = config.cache_path();
                debug!(path = %path.display(), "using file cache store");
                Arc::new(JsonFileStore::new(path))
            }
            StoreKind::Memory => Arc::new(MemoryStore::new()),
        };
        let cache = DurableCache::from_config(store, &config.cache);

        let settings = Arc::new(SettingsResolver::new(settings));
        let ctx = AdapterContext {
            transport: Arc::new(RetryingTransport::new(RetryConfig::from(&config.retry))),
            limiter: Arc::new(RateLimiter::from_config(&config.rate_limit)),
            validator: select_validator(config.strict_schema),
        };
        let primary: Arc<dyn Provider> = Arc::new(ProviderAdapter::new(
            OpenAiDialect,
            config.endpoints.openai.clone(),
            ctx.clone(),
        ));
        let secondary: Arc<dyn Provider> = Arc::new(ProviderAdapter::new(
            GeminiDialect,
            config.endpoints.gemini.clone(),
            ctx.clone(),
        ));

        let coordinator = Arc::new(
            DispatchCoordinator::new(cache, settings, ProviderSet::new(primary, secondary))
                .with_max_batch(config.max_batch),
        );
        let router = MessageRouter::new(coordinator.clone());

        info!(
            max_batch = coordinator.max_batch(),
            ttl_days = config.cache.ttl_days,
            max_entries = config.cache.max_entries,
            strict_schema = config.strict_schema,
            "engine initialized"
        );

        Self {
            config,
            coordinator,
            router,
        }
    }

    pub fn config(&self) -> &TilesConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &Arc<DispatchCoordinator> {
        &self.coordinator
    }

    pub fn router(&self) -> &MessageRouter {
        &self.router
    }

    pub fn cache(&self) -> &DurableCache {
        self.coordinator.cache()
    }

    /// Start the periodic purge task. It purges once immediately.
    pub fn spawn_maintenance(&self, cancel: CancellationToken) -> JoinHandle<()> {
        let interval = Duration::from_secs(self.config.cache.purge_interval_secs);
        self.cache().spawn_maintenance(interval, cancel)
    }

    /// Wait for background cache writes. Call before exiting.
    pub async fn shutdown(&self) {
        self.cache().flush().await;
        debug!("engine shut down");
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("coordinator", &self.coordinator)
            .finish_non_exhaustive()
    }
}
