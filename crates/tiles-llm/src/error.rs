//! Provider error types for tiles-llm.
//!
//! All provider operations return [`Result<T>`] which uses [`ProviderError`]
//! as the error type.

use thiserror::Error;

use crate::retry::RateLimitHeaders;
use crate::validator::ValidationError;

/// Errors that can occur while calling a classification provider.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// A non-retryable or exhausted HTTP failure.
    #[error("HTTP {status}: {body}")]
    Http {
        status: u16,
        /// Leading slice of the response body.
        body: String,
        rate_limit: RateLimitHeaders,
    },

    /// The provider kept answering 429 until retries ran out.
    #[error("rate limited after retries (retry after {retry_after_ms:?}ms): {body}")]
    RateLimited {
        retry_after_ms: Option<u64>,
        body: String,
        rate_limit: RateLimitHeaders,
    },

    /// Authentication was rejected (HTTP 401/403).
    #[error("authentication failed: {0}")]
    AuthFailed(String),

    /// A single attempt exceeded its time budget.
    #[error("attempt timed out after {0}ms")]
    Timeout(u64),

    /// The caller's cancellation token fired.
    #[error("aborted")]
    Aborted,

    /// Connection-level failure from reqwest.
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// The response body did not contain the expected JSON.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// The decoded JSON did not satisfy the result contract.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// No credential or endpoint is available for the provider.
    #[error("provider not configured: {0}")]
    NotConfigured(String),

    /// A JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

impl ProviderError {
    /// `true` for the cancellation outcome, which callers must not treat
    /// as a classification failure.
    pub fn is_aborted(&self) -> bool {
        matches!(self, ProviderError::Aborted)
    }
}

/// A convenience type alias for provider operations.
pub type Result<T> = std::result::Result<T, ProviderError>;
