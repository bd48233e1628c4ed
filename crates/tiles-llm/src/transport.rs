//! Retrying HTTP transport.
//!
//! [`RetryingTransport::call`] wraps one logical POST with a per-attempt
//! timeout, an optional cancellation token and the 429/5xx retry policy from
//! [`crate::retry`]. Any other status comes back as a [`TransportResponse`]
//! for the caller to interpret.

use std::time::Duration;

use reqwest::header::HeaderMap;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ProviderError, Result};
use crate::retry::{
    self, RateLimitHeaders, RetryConfig, is_quota_exhausted, is_retryable_status,
};

/// Characters of a failing body kept in logs and errors.
const BODY_SNIPPET: usize = 300;

/// A JSON POST to send.
#[derive(Debug, Clone)]
pub struct TransportRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
    pub body: Value,
}

impl TransportRequest {
    pub fn post_json(url: impl Into<String>, body: Value) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
            body,
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// A fully read response.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Per-call options.
#[derive(Debug, Clone, Default)]
pub struct CallOptions {
    /// Overrides the configured per-attempt timeout.
    pub attempt_timeout: Option<Duration>,
    /// Cancels the current attempt or backoff sleep when fired.
    pub cancel: Option<CancellationToken>,
}

impl CallOptions {
    pub fn with_cancel(cancel: CancellationToken) -> Self {
        Self {
            attempt_timeout: None,
            cancel: Some(cancel),
        }
    }
}

/// HTTP client with timeout, cancellation and 429/5xx retries.
#[derive(Debug, Clone)]
pub struct RetryingTransport {
    http: reqwest::Client,
    config: RetryConfig,
}

impl RetryingTransport {
    pub fn new(config: RetryConfig) -> Self {
        Self::with_client(reqwest::Client::new(), config)
    }

    pub fn with_client(http: reqwest::Client, config: RetryConfig) -> Self {
        Self { http, config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    /// Send `request`, retrying transient failures.
    ///
    /// Returns [`ProviderError::Aborted`] as soon as the token fires, even
    /// mid-attempt or mid-backoff. After the last attempt a 429 becomes
    /// [`ProviderError::RateLimited`], a 5xx becomes [`ProviderError::Http`],
    /// and a transport failure is returned as-is.
    pub async fn call(
        &self,
        request: &TransportRequest,
        options: &CallOptions,
    ) -> Result<TransportResponse> {
        let timeout = options
            .attempt_timeout
            .unwrap_or(self.config.attempt_timeout);
        let cancel = options.cancel.as_ref();
        let mut attempt: u32 = 0;

        loop {
            if cancel.is_some_and(CancellationToken::is_cancelled) {
                return Err(ProviderError::Aborted);
            }

            let last = attempt >= self.config.max_retries;
            match self.attempt(request, timeout, cancel).await {
                Ok(response) if is_retryable_status(response.status) => {
                    if last {
                        return Err(self.exhausted(response));
                    }
                    let hint = retry::retry_after_from_headers(&response.headers).or_else(|| {
                        retry::parse_retry_after_ms(&response.body).map(Duration::from_millis)
                    });
                    let delay = retry::status_delay(&self.config, attempt, hint);
                    if response.status == 429 && is_quota_exhausted(&response.body) {
                        warn!(
                            url = %request.url,
                            attempt,
                            "provider reports quota exhausted; retrying anyway"
                        );
                    }
                    warn!(
                        url = %request.url,
                        status = response.status,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        hinted = hint.is_some(),
                        "retrying after HTTP error"
                    );
                    self.pause(delay, cancel).await?;
                }
                Ok(response) => {
                    if attempt > 0 {
                        debug!(url = %request.url, attempt, "request succeeded after retry");
                    }
                    return Ok(response);
                }
                Err(ProviderError::Aborted) => return Err(ProviderError::Aborted),
                Err(err) => {
                    if last {
                        return Err(err);
                    }
                    let delay = retry::error_delay(&self.config, attempt);
                    warn!(
                        url = %request.url,
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transport error"
                    );
                    self.pause(delay, cancel).await?;
                }
            }
            attempt += 1;
        }
    }

    /// One attempt: send and read the whole body within `timeout`, racing
    /// the cancellation token.
    async fn attempt(
        &self,
        request: &TransportRequest,
        timeout: Duration,
        cancel: Option<&CancellationToken>,
    ) -> Result<TransportResponse> {
        let send = tokio::time::timeout(timeout, self.send_once(request));
        let outcome = match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => return Err(ProviderError::Aborted),
                outcome = send => outcome,
            },
            None => send.await,
        };
        match outcome {
            Ok(result) => result,
            Err(_elapsed) => Err(ProviderError::Timeout(timeout.as_millis() as u64)),
        }
    }

    async fn send_once(&self, request: &TransportRequest) -> Result<TransportResponse> {
        let mut req = self
            .http
            .post(&request.url)
            .header("Content-Type", "application/json");
        for (k, v) in &request.headers {
            req = req.header(k.as_str(), v.as_str());
        }

        let response = req.json(&request.body).send().await?;
        let status = response.status().as_u16();
        let headers = response.headers().clone();
        let body = response.text().await?;
        Ok(TransportResponse {
            status,
            headers,
            body,
        })
    }

    async fn pause(&self, delay: Duration, cancel: Option<&CancellationToken>) -> Result<()> {
        match cancel {
            Some(token) => tokio::select! {
                biased;
                _ = token.cancelled() => Err(ProviderError::Aborted),
                _ = tokio::time::sleep(delay) => Ok(()),
            },
            None => {
                tokio::time::sleep(delay).await;
                Ok(())
            }
        }
    }

    fn exhausted(&self, response: TransportResponse) -> ProviderError {
        let rate_limit = RateLimitHeaders::from_headers(&response.headers);
        let body = retry::snippet(&response.body, BODY_SNIPPET);
        warn!(
            status = response.status,
            body = %body,
            rate_limit = ?rate_limit,
            "final HTTP failure after retries"
        );
        if response.status == 429 {
            let retry_after_ms = retry::retry_after_from_headers(&response.headers)
                .map(|d| d.as_millis() as u64)
                .or_else(|| retry::parse_retry_after_ms(&response.body));
            ProviderError::RateLimited {
                retry_after_ms,
                body,
                rate_limit,
            }
        } else {
            ProviderError::Http {
                status: response.status,
                body,
                rate_limit,
            }
        }
    }
}
