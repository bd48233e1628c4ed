//! Provider selection and resolved credentials.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::secret::SecretString;

/// Which external classification provider to call for cache misses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProviderKind {
    /// Chat-completion style endpoint (primary).
    #[default]
    OpenAi,
    /// Generate-content style endpoint (secondary).
    Gemini,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "openai",
            ProviderKind::Gemini => "gemini",
        }
    }

    /// Model used when the config does not name one.
    pub fn default_model(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "gpt-4o-mini",
            ProviderKind::Gemini => "gemini-1.5-flash",
        }
    }

    /// Environment variable consulted when no key is configured.
    pub fn api_key_env(self) -> &'static str {
        match self {
            ProviderKind::OpenAi => "OPENAI_API_KEY",
            ProviderKind::Gemini => "GEMINI_API_KEY",
        }
    }

    /// Parse a provider name. Anything that is not `gemini` selects the
    /// primary provider, matching how the options page stores it.
    pub fn from_name(name: &str) -> Self {
        if name.trim().eq_ignore_ascii_case("gemini") {
            ProviderKind::Gemini
        } else {
            ProviderKind::OpenAi
        }
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl Serialize for ProviderKind {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for ProviderKind {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        Ok(ProviderKind::from_name(&s))
    }
}

/// Fully resolved provider settings for one dispatch.
///
/// Produced from [`TilesConfig`](super::TilesConfig) plus the environment,
/// then cached by the settings resolver until the next config change.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderSettings {
    pub kind: ProviderKind,
    pub model: String,
    pub api_key: SecretString,
    /// Always use the local rule-based classifier, even with a key.
    pub force_local: bool,
}

impl ProviderSettings {
    /// `true` when a network provider can actually be called.
    pub fn has_key(&self) -> bool {
        !self.api_key.is_empty()
    }

    /// `true` when classification must stay local.
    pub fn use_local(&self) -> bool {
        self.force_local || !self.has_key()
    }
}
