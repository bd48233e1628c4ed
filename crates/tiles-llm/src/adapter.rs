//! Generic network provider.
//!
//! [`ProviderAdapter`] runs the same sequence for every provider: classify
//! locally when the caller's settings are forced or keyless, otherwise build the
//! request, wait for rate-limit admission, call the retrying transport,
//! decode, validate and align. A [`Dialect`] supplies the provider-specific
//! URL, auth headers, body and response envelope.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use tiles_types::config::{ProviderKind, ProviderSettings};
use tiles_types::{ClassificationResult, Descriptor, SecretString};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{ProviderError, Result};
use crate::local::LocalClassifier;
use crate::prompt::{self, ClassifyPayload};
use crate::provider::{Provider, align_results, fallback_results};
use crate::rate_limiter::RateLimiter;
use crate::retry::{self, RateLimitHeaders};
use crate::transport::{CallOptions, RetryingTransport, TransportRequest};
use crate::validator::ResponseValidator;

/// Characters of a bad body or model output kept in errors.
const ERROR_SNIPPET: usize = 200;

/// Provider-specific wire details.
pub trait Dialect: Send + Sync + fmt::Debug {
    fn kind(&self) -> ProviderKind;

    /// Full endpoint URL for `model` under `base_url`.
    fn endpoint(&self, base_url: &str, model: &str) -> String;

    /// Authentication headers carrying `api_key`.
    fn auth_headers(&self, api_key: &SecretString) -> Vec<(String, String)>;

    /// JSON request body.
    fn build_body(&self, model: &str, payload: &ClassifyPayload<'_>) -> Result<Value>;

    /// Pull the model's text output out of the response envelope.
    fn extract_text(&self, envelope: &Value) -> Result<String>;
}

/// Collaborators shared by every adapter: one HTTP client, one rate-limit
/// budget and the validator chosen at startup.
#[derive(Clone)]
pub struct AdapterContext {
    pub transport: Arc<RetryingTransport>,
    pub limiter: Arc<RateLimiter>,
    pub validator: Arc<dyn ResponseValidator>,
}

/// A network [`Provider`] parameterized by its [`Dialect`].
pub struct ProviderAdapter<D> {
    dialect: D,
    base_url: String,
    ctx: AdapterContext,
    local: LocalClassifier,
}

impl<D: Dialect> ProviderAdapter<D> {
    pub fn new(dialect: D, base_url: impl Into<String>, ctx: AdapterContext) -> Self {
        Self {
            dialect,
            base_url: base_url.into(),
            ctx,
            local: LocalClassifier::new(),
        }
    }

    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    async fn call_provider(
        &self,
        settings: &ProviderSettings,
        batch: &[Descriptor],
        cancel: &CancellationToken,
    ) -> Result<Vec<ClassificationResult>> {
        let payload = prompt::build_payload(batch);
        let body = self.dialect.build_body(&settings.model, &payload)?;
        let mut request =
            TransportRequest::post_json(self.dialect.endpoint(&self.base_url, &settings.model), body);
        request.headers = self.dialect.auth_headers(&settings.api_key);

        let waited = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(ProviderError::Aborted),
            waited = self.ctx.limiter.acquire() => waited,
        };
        if !waited.is_zero() {
            debug!(
                provider = %self.dialect.kind(),
                waited_ms = waited.as_millis() as u64,
                "admitted after rate-limit wait"
            );
        }

        debug!(
            provider = %self.dialect.kind(),
            model = %settings.model,
            items = batch.len(),
            "sending classification request"
        );
        let response = self
            .ctx
            .transport
            .call(&request, &CallOptions::with_cancel(cancel.clone()))
            .await?;

        if !response.is_success() {
            let body = retry::snippet(&response.body, ERROR_SNIPPET);
            return Err(match response.status {
                401 | 403 => ProviderError::AuthFailed(body),
                status => ProviderError::Http {
                    status,
                    body,
                    rate_limit: RateLimitHeaders::from_headers(&response.headers),
                },
            });
        }

        let envelope: Value = serde_json::from_str(&response.body).map_err(|e| {
            ProviderError::InvalidResponse(format!("response body is not JSON: {e}"))
        })?;
        let text = self.dialect.extract_text(&envelope)?;
        let raw: Value = serde_json::from_str(text.trim()).map_err(|_| {
            ProviderError::InvalidResponse(format!(
                "model returned non-JSON: {}",
                retry::snippet(&text, ERROR_SNIPPET)
            ))
        })?;

        let results = self.ctx.validator.validate(&raw)?;
        debug!(
            provider = %self.dialect.kind(),
            validator = self.ctx.validator.name(),
            returned = results.len(),
            "classification response validated"
        );
        Ok(results)
    }
}

#[async_trait]
impl<D: Dialect> Provider for ProviderAdapter<D> {
    fn name(&self) -> &str {
        self.dialect.kind().as_str()
    }

    async fn classify(
        &self,
        settings: &ProviderSettings,
        batch: &[Descriptor],
        cancel: &CancellationToken,
    ) -> Result<Vec<ClassificationResult>> {
        if batch.is_empty() {
            return Ok(Vec::new());
        }

        if settings.use_local() {
            debug!(
                provider = %self.dialect.kind(),
                forced = settings.force_local,
                items = batch.len(),
                "classifying locally"
            );
            return Ok(self.local.classify_batch(batch));
        }

        match self.call_provider(settings, batch, cancel).await {
            Ok(results) => Ok(align_results(results, batch.len())),
            Err(ProviderError::Aborted) => Err(ProviderError::Aborted),
            Err(e) => {
                warn!(
                    provider = %self.dialect.kind(),
                    items = batch.len(),
                    error = %e,
                    "provider call failed; using fallback results"
                );
                Ok(fallback_results(batch.len()))
            }
        }
    }
}

impl<D: Dialect> fmt::Debug for ProviderAdapter<D> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderAdapter")
            .field("dialect", &self.dialect)
            .field("base_url", &self.base_url)
            .field("validator", &self.ctx.validator.name())
            .finish()
    }
}

/// Join a base URL and a path without doubling the slash.
pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    format!("{}/{}", base_url.trim_end_matches('/'), path.trim_start_matches('/'))
}
