//! Provider plumbing for the tiles classification engine.
//!
//! # Architecture
//!
//! - [`Provider`] is the batch classification contract
//! - [`ProviderAdapter`] implements it for network providers, with
//!   [`OpenAiDialect`] and [`GeminiDialect`] supplying the wire details
//! - [`LocalClassifier`] is the offline keyword fallback
//! - [`RetryingTransport`] sends requests with timeout, cancellation and
//!   429/5xx retries
//! - [`RateLimiter`] bounds outbound calls per sliding window
//! - [`ResponseValidator`] checks provider output before it is trusted
//! - [`SettingsResolver`] caches provider, model and credential

pub mod adapter;
pub mod error;
pub mod gemini;
pub mod local;
pub mod openai;
pub mod prompt;
pub mod provider;
pub mod rate_limiter;
pub mod retry;
pub mod settings;
pub mod transport;
pub mod validator;

pub use adapter::{AdapterContext, Dialect, ProviderAdapter};
pub use error::{ProviderError, Result};
pub use gemini::GeminiDialect;
pub use local::LocalClassifier;
pub use openai::OpenAiDialect;
pub use provider::{Provider, align_results, fallback_results};
pub use rate_limiter::RateLimiter;
pub use retry::{RateLimitHeaders, RetryConfig};
pub use settings::{SettingsResolver, SettingsSource, StaticSettings};
pub use transport::{CallOptions, RetryingTransport, TransportRequest, TransportResponse};
pub use validator::{LightValidator, ResponseValidator, SchemaValidator, ValidationError, select_validator};
