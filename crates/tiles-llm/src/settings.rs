//! Cached provider settings.
//!
//! [`SettingsResolver`] resolves provider, model and credential through a
//! [`SettingsSource`] once, then serves the cached copy until
//! [`invalidate`](SettingsResolver::invalidate) is called on a config change.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::{Mutex, RwLock};
use tiles_types::config::{ProviderKind, ProviderSettings};
use tiles_types::{ConfigError, SecretString};
use tracing::{debug, warn};

/// Where provider settings come from (a config file, a fixed value, ...).
#[async_trait]
pub trait SettingsSource: Send + Sync {
    async fn load(&self) -> Result<ProviderSettings, ConfigError>;
}

/// A source holding one in-memory value. Tests and the CLI use it to swap
/// settings without touching the filesystem.
#[derive(Debug)]
pub struct StaticSettings {
    settings: RwLock<ProviderSettings>,
}

impl StaticSettings {
    pub fn new(settings: ProviderSettings) -> Self {
        Self {
            settings: RwLock::new(settings),
        }
    }

    pub fn set(&self, settings: ProviderSettings) {
        *self.settings.write() = settings;
    }
}

#[async_trait]
impl SettingsSource for StaticSettings {
    async fn load(&self) -> Result<ProviderSettings, ConfigError> {
        Ok(self.settings.read().clone())
    }
}

/// Settings used when the source cannot be read: no key, so every batch is
/// classified locally.
pub fn unconfigured() -> ProviderSettings {
    let kind = ProviderKind::default();
    ProviderSettings {
        kind,
        model: kind.default_model().to_string(),
        api_key: SecretString::default(),
        force_local: false,
    }
}

/// Caches the resolved [`ProviderSettings`].
pub struct SettingsResolver {
    source: Arc<dyn SettingsSource>,
    cached: Mutex<Option<ProviderSettings>>,
    /// Bumped by `invalidate`; a load that raced an invalidation is not cached.
    generation: AtomicU64,
    loads: AtomicU64,
}

impl SettingsResolver {
    pub fn new(source: Arc<dyn SettingsSource>) -> Self {
        Self {
            source,
            cached: Mutex::new(None),
            generation: AtomicU64::new(0),
            loads: AtomicU64::new(0),
        }
    }

    /// Current settings, loading them on first use or after invalidation.
    /// A failing source degrades to [`unconfigured`] and is retried next time.
    pub async fn resolve(&self) -> ProviderSettings {
        if let Some(settings) = self.cached.lock().clone() {
            return settings;
        }

        let generation = self.generation.load(Ordering::Acquire);
        self.loads.fetch_add(1, Ordering::Relaxed);
        match self.source.load().await {
            Ok(settings) => {
                debug!(
                    provider = %settings.kind,
                    model = %settings.model,
                    has_key = settings.has_key(),
                    force_local = settings.force_local,
                    "provider settings resolved"
                );
                let mut cached = self.cached.lock();
                if self.generation.load(Ordering::Acquire) == generation {
                    *cached = Some(settings.clone());
                }
                settings
            }
            Err(e) => {
                warn!(error = %e, "failed to load provider settings; classifying locally");
                unconfigured()
            }
        }
    }

    /// Drop the cached settings so the next `resolve` re-reads the source.
    pub fn invalidate(&self) {
        let mut cached = self.cached.lock();
        self.generation.fetch_add(1, Ordering::AcqRel);
        *cached = None;
        debug!("provider settings invalidated");
    }

    /// Number of times the source has been consulted.
    pub fn load_count(&self) -> u64 {
        self.loads.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for SettingsResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SettingsResolver")
            .field("cached", &self.cached.lock().is_some())
            .field("loads", &self.load_count())
            .finish()
    }
}
