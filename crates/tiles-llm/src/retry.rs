//! Backoff arithmetic and retry hints for provider calls.
//!
//! [`RetryConfig`] carries the knobs. [`status_delay`] and [`error_delay`]
//! compute the wait before the next attempt for HTTP 429/5xx responses and
//! for connection-level failures respectively. The transport loop itself
//! lives in [`crate::transport`].

use std::time::Duration;

use chrono::{DateTime, Utc};
use rand::Rng;
use reqwest::header::HeaderMap;
use tiles_types::config::RetrySettings;

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Additional attempts after the first one (default: 4).
    pub max_retries: u32,
    /// Budget for one attempt, covering send and body read (default: 6.5s).
    pub attempt_timeout: Duration,
    /// Backoff base; attempt `n` waits `base * 2^n` (default: 700ms).
    pub base_delay: Duration,
    /// Upper bound on any single wait, including server hints (default: 30s).
    pub max_delay: Duration,
    /// Jitter ceiling added to waits after a 429/5xx (default: 250ms).
    pub status_jitter: Duration,
    /// Jitter ceiling added to waits after a transport error (default: 150ms).
    pub error_jitter: Duration,
    /// Floor for waits after a 429/5xx (default: 300ms).
    pub min_status_delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 4,
            attempt_timeout: Duration::from_millis(6500),
            base_delay: Duration::from_millis(700),
            max_delay: Duration::from_secs(30),
            status_jitter: Duration::from_millis(250),
            error_jitter: Duration::from_millis(150),
            min_status_delay: Duration::from_millis(300),
        }
    }
}

impl From<&RetrySettings> for RetryConfig {
    fn from(s: &RetrySettings) -> Self {
        Self {
            max_retries: s.max_retries,
            attempt_timeout: Duration::from_millis(s.attempt_timeout_ms),
            base_delay: Duration::from_millis(s.base_backoff_ms),
            ..Self::default()
        }
    }
}

/// HTTP statuses that are retried: 429 and every 5xx.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || (500..=599).contains(&status)
}

/// `base * 2^attempt`, saturating.
pub fn backoff_base(config: &RetryConfig, attempt: u32) -> Duration {
    let exp = 2u64.saturating_pow(attempt);
    let base_ms = u64::try_from(config.base_delay.as_millis()).unwrap_or(u64::MAX);
    Duration::from_millis(base_ms.saturating_mul(exp))
}

fn jitter(ceiling: Duration) -> Duration {
    let max_ms = u64::try_from(ceiling.as_millis()).unwrap_or(0);
    if max_ms == 0 {
        return Duration::ZERO;
    }
    Duration::from_millis(rand::thread_rng().gen_range(0..=max_ms))
}

/// Wait before retrying after a 429/5xx.
///
/// Uses the server hint when present, else exponential backoff. Jitter is
/// added, the result is floored at `min_status_delay` and capped at
/// `max_delay`.
pub fn status_delay(config: &RetryConfig, attempt: u32, hint: Option<Duration>) -> Duration {
    let wait = hint.unwrap_or_else(|| backoff_base(config, attempt));
    (wait + jitter(config.status_jitter))
        .max(config.min_status_delay)
        .min(config.max_delay)
}

/// Wait before retrying after a connection failure or attempt timeout.
pub fn error_delay(config: &RetryConfig, attempt: u32) -> Duration {
    (backoff_base(config, attempt) + jitter(config.error_jitter)).min(config.max_delay)
}

/// Parse a `Retry-After` value: delta seconds (integer or fractional) or an
/// HTTP-date. Dates in the past yield zero.
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<Duration> {
    let value = value.trim();
    if value.is_empty() {
        return None;
    }
    if let Ok(secs) = value.parse::<f64>() {
        if !secs.is_finite() {
            return None;
        }
        return Some(Duration::from_millis((secs * 1000.0).max(0.0) as u64));
    }
    let when = DateTime::parse_from_rfc2822(value).ok()?.with_timezone(&Utc);
    Some((when - now).to_std().unwrap_or(Duration::ZERO))
}

/// Retry hint from response headers (`retry-after`, then
/// `x-ratelimit-reset-after`).
pub fn retry_after_from_headers(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get("retry-after")
        .or_else(|| headers.get("x-ratelimit-reset-after"))
        .and_then(|v| v.to_str().ok())
        .and_then(|v| parse_retry_after(v, Utc::now()))
}

/// Try to extract a retry-after value from a JSON error response body.
pub fn parse_retry_after_ms(body: &str) -> Option<u64> {
    let value: serde_json::Value = serde_json::from_str(body).ok()?;
    value
        .get("retry_after_ms")
        .and_then(|v| v.as_u64())
        .or_else(|| {
            value
                .get("retry_after")
                .and_then(|v| v.as_f64())
                .map(|secs| (secs * 1000.0) as u64)
        })
}

/// Whether a 429 body reports exhausted credits rather than a transient
/// limit. Such responses are still retried; this only changes the log line.
pub fn is_quota_exhausted(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("exhausted")
        || lower.contains("spending limit")
        || lower.contains("billing")
        || lower.contains("quota exceeded")
        || lower.contains("insufficient_quota")
        || lower.contains("resource_exhausted")
}

/// The leading `max_chars` characters of a body, for logs and errors.
pub fn snippet(body: &str, max_chars: usize) -> String {
    body.chars().take(max_chars).collect()
}

/// Provider rate-limit headers captured from the final failed response.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RateLimitHeaders {
    pub limit_requests: Option<String>,
    pub remaining_requests: Option<String>,
    pub reset_requests: Option<String>,
    pub limit_tokens: Option<String>,
    pub remaining_tokens: Option<String>,
    pub reset_tokens: Option<String>,
}

impl RateLimitHeaders {
    pub fn from_headers(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };
        Self {
            limit_requests: get("x-ratelimit-limit-requests"),
            remaining_requests: get("x-ratelimit-remaining-requests"),
            reset_requests: get("x-ratelimit-reset-requests"),
            limit_tokens: get("x-ratelimit-limit-tokens"),
            remaining_tokens: get("x-ratelimit-remaining-tokens"),
            reset_tokens: get("x-ratelimit-reset-tokens"),
        }
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}
