//! Configuration error types.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or interpreting configuration.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ConfigError {
    /// The config file exists but could not be read.
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The config file is not valid JSON for the schema.
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// A value parsed but makes no sense (zero window, unknown provider, ...).
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Convenience alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;
