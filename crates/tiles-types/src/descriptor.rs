//! Content descriptors produced by the page scraper.

use serde::{Deserialize, Deserializer, Serialize};

/// Where on the host site a tile was scraped from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PageContext {
    #[default]
    Home,
    Search,
    Watch,
    Channel,
    Subscriptions,
    Shorts,
    #[serde(other)]
    Other,
}

/// A short description of one piece of content to classify.
///
/// Immutable once submitted. Only `title`, `channel` and `duration_sec`
/// contribute to the cache key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Descriptor {
    pub title: String,

    #[serde(default)]
    pub channel: String,

    /// Duration in whole seconds. Scrapers send numbers, numeric strings or
    /// nothing at all; everything unparseable reads as 0.
    #[serde(default, deserialize_with = "lenient_duration")]
    pub duration_sec: u64,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub snippet: Option<String>,

    #[serde(default)]
    pub page_context: PageContext,
}

impl Descriptor {
    /// Convenience constructor used by tests and the CLI.
    pub fn new(title: impl Into<String>, channel: impl Into<String>, duration_sec: u64) -> Self {
        Self {
            title: title.into(),
            channel: channel.into(),
            duration_sec,
            snippet: None,
            page_context: PageContext::Home,
        }
    }

    /// Builder: attach a description snippet.
    pub fn with_snippet(mut self, snippet: impl Into<String>) -> Self {
        self.snippet = Some(snippet.into());
        self
    }

    /// Builder: set the page context.
    pub fn with_context(mut self, ctx: PageContext) -> Self {
        self.page_context = ctx;
        self
    }
}

fn lenient_duration<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = serde_json::Value::deserialize(deserializer)?;
    let secs = match value {
        serde_json::Value::Number(n) => n
            .as_u64()
            .or_else(|| n.as_f64().filter(|f| f.is_finite() && *f > 0.0).map(|f| f as u64))
            .unwrap_or(0),
        serde_json::Value::String(s) => s.trim().parse::<f64>().ok().filter(|f| *f > 0.0).map_or(0, |f| f as u64),
        _ => 0,
    };
    Ok(secs)
}
