//! API key wrapper that stays out of logs.
//!
//! [`SecretString`] holds provider credentials. `Debug` and `Display` print
//! `[REDACTED]`, and serialization emits an empty string, so a key read from
//! the config file can never leak through a tracing field or a
//! `GET_API_CONFIG` reply.

use std::fmt;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

/// A credential that is only readable through [`expose`](SecretString::expose).
#[derive(Clone, Default, PartialEq, Eq)]
pub struct SecretString(String);

impl SecretString {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    /// The raw value. Only call this where the key goes on the wire.
    pub fn expose(&self) -> &str {
        &self.0
    }

    /// Empty or whitespace-only keys count as absent.
    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            write!(f, "\"\"")
        } else {
            write!(f, "\"[REDACTED]\"")
        }
    }
}

impl fmt::Display for SecretString {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            Ok(())
        } else {
            write!(f, "[REDACTED]")
        }
    }
}

impl Serialize for SecretString {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str("")
    }
}

impl<'de> Deserialize<'de> for SecretString {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        // The options page writes `null` when the key field is cleared.
        let s = Option::<String>::deserialize(deserializer)?;
        Ok(SecretString(s.unwrap_or_default()))
    }
}

impl From<String> for SecretString {
    fn from(s: String) -> Self {
        SecretString(s)
    }
}

impl From<&str> for SecretString {
    fn from(s: &str) -> Self {
        SecretString(s.to_string())
    }
}
