//! Configuration file discovery and loading.
//!
//! The discovery order is:
//! 1. An explicit path (the CLI `--config` flag).
//! 2. `TILES_CONFIG` environment variable.
//! 3. `~/.tiles/config.json`
//! 4. If none is found, [`TilesConfig::default`].

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tiles_llm::SettingsSource;
use tiles_types::config::{ProviderSettings, TilesConfig};
use tiles_types::{ConfigError, Result};
use tracing::{debug, info, warn};

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "TILES_CONFIG";

/// Pick the config file to read, if any.
///
/// An explicit path or `TILES_CONFIG` is returned without an existence
/// check; the home-directory default only when the file exists.
pub fn discover_config_path(
    explicit: Option<&Path>,
    env: impl Fn(&str) -> Option<String>,
    home_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    if let Some(path) = explicit {
        return Some(path.to_path_buf());
    }
    if let Some(env_path) = env(CONFIG_ENV).filter(|p| !p.trim().is_empty()) {
        return Some(PathBuf::from(env_path));
    }
    let default = home_dir?.join(".tiles").join("config.json");
    default.exists().then_some(default)
}

/// Read and validate one config file.
pub async fn load_config_file(path: &Path) -> Result<TilesConfig> {
    debug!(path = %path.display(), "loading config file");
    let text = tokio::fs::read_to_string(path)
        .await
        .map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
    TilesConfig::from_json(&text, path)
}

/// Resolves and loads the config, remembering the explicit path.
#[derive(Debug, Clone, Default)]
pub struct ConfigLoader {
    explicit: Option<PathBuf>,
}

impl ConfigLoader {
    pub fn new(explicit: Option<PathBuf>) -> Self {
        Self { explicit }
    }

    /// The file that [`load`](Self::load) would read.
    pub fn discover(&self) -> Option<PathBuf> {
        discover_config_path(
            self.explicit.as_deref(),
            |name| std::env::var(name).ok(),
            dirs::home_dir(),
        )
    }

    /// Load the config.
    ///
    /// An explicit path must exist. A `TILES_CONFIG` path that does not
    /// exist falls back to defaults with a warning.
    pub async fn load(&self) -> Result<TilesConfig> {
        let Some(path) = self.discover() else {
            info!("no config file found, using defaults");
            return Ok(TilesConfig::default());
        };
        if self.explicit.is_none() && !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            warn!(path = %path.display(), "config path does not exist, using defaults");
            return Ok(TilesConfig::default());
        }
        load_config_file(&path).await
    }
}

/// A [`SettingsSource`] that re-reads the config file on every load, so
/// edits take effect after the next `CONFIG_CHANGED`.
#[derive(Debug, Clone, Default)]
pub struct FileSettingsSource {
    loader: ConfigLoader,
}

impl FileSettingsSource {
    pub fn new(loader: ConfigLoader) -> Self {
        Self { loader }
    }
}

#[async_trait]
impl SettingsSource for FileSettingsSource {
    async fn load(&self) -> Result<ProviderSettings> {
        let config = self.loader.load().await?;
        Ok(config.provider_settings(|name| std::env::var(name).ok()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tiles_types::config::ProviderKind;

    fn no_env(_: &str) -> Option<String> {
        None
    }

    #[test]
    fn explicit_path_wins() {
        let path = discover_config_path(
            Some(Path::new("/etc/tiles.json")),
            |_| Some("/env/tiles.json".into()),
            None,
        );
        assert_eq!(path, Some(PathBuf::from("/etc/tiles.json")));
    }

    #[test]
    fn env_var_beats_home() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(".tiles")).unwrap();
        std::fs::write(dir.path().join(".tiles/config.json"), "{}").unwrap();
        let path = discover_config_path(
            None,
            |name| (name == CONFIG_ENV).then(|| "/env/tiles.json".into()),
            Some(dir.path().to_path_buf()),
        );
        assert_eq!(path, Some(PathBuf::from("/env/tiles.json")));
    }

    #[test]
    fn home_default_only_when_present() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(discover_config_path(None, no_env, Some(dir.path().to_path_buf())), None);

        std::fs::create_dir_all(dir.path().join(".tiles")).unwrap();
        std::fs::write(dir.path().join(".tiles/config.json"), "{}").unwrap();
        assert_eq!(
            discover_config_path(None, no_env, Some(dir.path().to_path_buf())),
            Some(dir.path().join(".tiles/config.json"))
        );
    }

    #[test]
    fn loader_honors_env_var() {
        temp_env::with_var(CONFIG_ENV, Some("/env/tiles.json"), || {
            assert_eq!(
                ConfigLoader::new(None).discover(),
                Some(PathBuf::from("/env/tiles.json"))
            );
        });
    }

    #[tokio::test]
    async fn explicit_missing_file_is_an_error() {
        let loader = ConfigLoader::new(Some(PathBuf::from("/nonexistent/tiles/config.json")));
        let err = loader.load().await.unwrap_err();
        assert!(matches!(err, ConfigError::Read { .. }));
    }

    #[tokio::test]
    async fn invalid_json_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        let err = ConfigLoader::new(Some(path)).load().await.unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[tokio::test]
    async fn file_source_rereads_on_each_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, r#"{"provider": "openai", "api_key": "k1"}"#).unwrap();
        let source = FileSettingsSource::new(ConfigLoader::new(Some(path.clone())));

        let first = source.load().await.unwrap();
        assert_eq!(first.kind, ProviderKind::OpenAi);
        assert_eq!(first.api_key.expose(), "k1");

        std::fs::write(&path, r#"{"provider": "gemini", "api_keys": {"gemini": "g"}}"#).unwrap();
        let second = source.load().await.unwrap();
        assert_eq!(second.kind, ProviderKind::Gemini);
        assert_eq!(second.api_key.expose(), "g");
    }
}
