//! Configuration schema types.
//!
//! The options page historically wrote both the current and the legacy key
//! names (`api_provider` and `provider`, `api_key` and `apiKey`) into the
//! same object, so those are separate fields here rather than serde aliases,
//! which would reject the duplicate. Unknown fields are ignored.

pub mod provider;

pub use provider::{ProviderKind, ProviderSettings};

use std::collections::HashMap;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};
use crate::secret::SecretString;

/// Hard upper bound on descriptors per dispatch.
pub const MAX_BATCH: usize = 12;

// ── Root config ──────────────────────────────────────────────────────────

/// Root configuration for the tiles engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TilesConfig {
    /// Preferred provider key.
    #[serde(default)]
    pub api_provider: Option<String>,

    /// Legacy provider key.
    #[serde(default)]
    pub provider: Option<String>,

    /// Model identifier. Empty means the provider default.
    #[serde(default)]
    pub model: Option<String>,

    /// Preferred single key.
    #[serde(default)]
    pub api_key: SecretString,

    /// Legacy single key.
    #[serde(default, rename = "apiKey")]
    pub api_key_legacy: SecretString,

    /// Per-provider keys, keyed by provider name.
    #[serde(default)]
    pub api_keys: HashMap<String, SecretString>,

    /// Always classify locally.
    #[serde(default, alias = "force_dummy", alias = "forceLocal")]
    pub force_local: bool,

    /// Use the strict (unknown-field rejecting) response validator.
    #[serde(default = "default_true", alias = "strictSchema")]
    pub strict_schema: bool,

    /// Descriptors accepted per dispatch; excess items are dropped.
    #[serde(default = "default_max_batch", alias = "maxBatch")]
    pub max_batch: usize,

    #[serde(default)]
    pub endpoints: EndpointsConfig,

    #[serde(default)]
    pub cache: CacheConfig,

    #[serde(default, alias = "rateLimit")]
    pub rate_limit: RateLimitConfig,

    #[serde(default)]
    pub retry: RetrySettings,
}

fn default_true() -> bool {
    true
}
fn default_max_batch() -> usize {
    MAX_BATCH
}

impl Default for TilesConfig {
    fn default() -> Self {
        Self {
            api_provider: None,
            provider: None,
            model: None,
            api_key: SecretString::default(),
            api_key_legacy: SecretString::default(),
            api_keys: HashMap::new(),
            force_local: false,
            strict_schema: true,
            max_batch: MAX_BATCH,
            endpoints: EndpointsConfig::default(),
            cache: CacheConfig::default(),
            rate_limit: RateLimitConfig::default(),
            retry: RetrySettings::default(),
        }
    }
}

impl TilesConfig {
    /// Parse a config from JSON text.
    pub fn from_json(text: &str, path: impl Into<PathBuf>) -> Result<Self> {
        let config: TilesConfig = serde_json::from_str(text).map_err(|source| ConfigError::Parse {
            path: path.into(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that would make the engine misbehave.
    pub fn validate(&self) -> Result<()> {
        if self.max_batch == 0 || self.max_batch > MAX_BATCH {
            return Err(ConfigError::Invalid(format!(
                "max_batch must be in 1..={MAX_BATCH}, got {}",
                self.max_batch
            )));
        }
        if self.rate_limit.max_calls == 0 {
            return Err(ConfigError::Invalid("rate_limit.max_calls must be > 0".into()));
        }
        if self.rate_limit.window_secs == 0 {
            return Err(ConfigError::Invalid("rate_limit.window_secs must be > 0".into()));
        }
        if self.cache.max_entries == 0 {
            return Err(ConfigError::Invalid("cache.max_entries must be > 0".into()));
        }
        if self.retry.attempt_timeout_ms == 0 {
            return Err(ConfigError::Invalid("retry.attempt_timeout_ms must be > 0".into()));
        }
        Ok(())
    }

    /// The selected provider (preferred key, then legacy key, then default).
    pub fn provider_kind(&self) -> ProviderKind {
        self.api_provider
            .as_deref()
            .or(self.provider.as_deref())
            .filter(|s| !s.trim().is_empty())
            .map(ProviderKind::from_name)
            .unwrap_or_default()
    }

    /// Resolve provider, model and credential.
    ///
    /// Key precedence: `api_key`, `apiKey`, `api_keys[provider]`, then the
    /// provider's environment variable looked up through `env`.
    pub fn provider_settings(&self, env: impl Fn(&str) -> Option<String>) -> ProviderSettings {
        let kind = self.provider_kind();
        let model = self
            .model
            .as_deref()
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .unwrap_or(kind.default_model())
            .to_string();

        let api_key = [&self.api_key, &self.api_key_legacy]
            .into_iter()
            .chain(self.api_keys.get(kind.as_str()))
            .find(|k| !k.is_empty())
            .cloned()
            .or_else(|| env(kind.api_key_env()).map(SecretString::new))
            .unwrap_or_default();

        ProviderSettings {
            kind,
            model,
            api_key,
            force_local: self.force_local,
        }
    }

    /// Cache file location: configured path, else `~/.tiles/cache.json`.
    pub fn cache_path(&self) -> PathBuf {
        if let Some(path) = &self.cache.path {
            return path.clone();
        }
        dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".tiles")
            .join("cache.json")
    }
}

// ── Endpoints ────────────────────────────────────────────────────────────

/// Base URLs for the two provider integrations.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointsConfig {
    #[serde(default = "default_openai_base")]
    pub openai: String,
    #[serde(default = "default_gemini_base")]
    pub gemini: String,
}

fn default_openai_base() -> String {
    "https://api.openai.com/v1".into()
}
fn default_gemini_base() -> String {
    "https://generativelanguage.googleapis.com/v1beta".into()
}

impl Default for EndpointsConfig {
    fn default() -> Self {
        Self {
            openai: default_openai_base(),
            gemini: default_gemini_base(),
        }
    }
}

// ── Cache ────────────────────────────────────────────────────────────────

/// Durable cache settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Store file. `None` means `~/.tiles/cache.json`.
    #[serde(default)]
    pub path: Option<PathBuf>,

    #[serde(default = "default_ttl_days", alias = "ttlDays")]
    pub ttl_days: u64,

    /// Soft capacity enforced by the LRU sweep.
    #[serde(default = "default_max_entries", alias = "maxEntries")]
    pub max_entries: usize,

    #[serde(default = "default_purge_interval", alias = "purgeIntervalSecs")]
    pub purge_interval_secs: u64,
}

fn default_ttl_days() -> u64 {
    14
}
fn default_max_entries() -> usize {
    5000
}
fn default_purge_interval() -> u64 {
    900
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: None,
            ttl_days: default_ttl_days(),
            max_entries: default_max_entries(),
            purge_interval_secs: default_purge_interval(),
        }
    }
}

// ── Rate limit ───────────────────────────────────────────────────────────

/// Outbound call budget.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    #[serde(default = "default_max_calls", alias = "maxCalls", alias = "rpm")]
    pub max_calls: u32,

    #[serde(default = "default_window_secs", alias = "windowSecs")]
    pub window_secs: u64,

    /// Extra wait added once the window's oldest call has expired.
    #[serde(default = "default_margin_ms", alias = "marginMs")]
    pub margin_ms: u64,
}

fn default_max_calls() -> u32 {
    20
}
fn default_window_secs() -> u64 {
    60
}
fn default_margin_ms() -> u64 {
    50
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            max_calls: default_max_calls(),
            window_secs: default_window_secs(),
            margin_ms: default_margin_ms(),
        }
    }
}

// ── Retry ────────────────────────────────────────────────────────────────

/// Transport retry settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries", alias = "maxRetries")]
    pub max_retries: u32,

    #[serde(default = "default_attempt_timeout_ms", alias = "attemptTimeoutMs")]
    pub attempt_timeout_ms: u64,

    #[serde(default = "default_base_backoff_ms", alias = "baseBackoffMs")]
    pub base_backoff_ms: u64,
}

fn default_max_retries() -> u32 {
    4
}
fn default_attempt_timeout_ms() -> u64 {
    6500
}
fn default_base_backoff_ms() -> u64 {
    700
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            attempt_timeout_ms: default_attempt_timeout_ms(),
            base_backoff_ms: default_base_backoff_ms(),
        }
    }
}
