//! Chat-completion dialect (primary provider).

use serde_json::{Value, json};
use tiles_types::SecretString;
use tiles_types::config::ProviderKind;

use crate::adapter::{Dialect, join_url};
use crate::error::{ProviderError, Result};
use crate::prompt::{self, ClassifyPayload, SYSTEM_PROMPT};

/// Output token budget: a fixed allowance plus room for each item.
const BASE_MAX_TOKENS: usize = 64;
const MAX_TOKENS_PER_ITEM: usize = 40;

/// POST `{base}/chat/completions` with bearer auth and a strict
/// `json_schema` response format.
///
/// Strict structured outputs require an object at the root, so the schema
/// wraps the result array as `{items: [...]}`, one of the shapes the
/// validator accepts.
#[derive(Debug, Default, Clone, Copy)]
pub struct OpenAiDialect;

impl OpenAiDialect {
    fn response_format() -> Value {
        json!({
            "type": "json_schema",
            "json_schema": {
                "name": "TileBatch",
                "strict": true,
                "schema": {
                    "type": "object",
                    "additionalProperties": false,
                    "required": ["items"],
                    "properties": {
                        "items": {"type": "array", "items": prompt::item_schema()},
                    },
                },
            },
        })
    }
}

impl Dialect for OpenAiDialect {
    fn kind(&self) -> ProviderKind {
        ProviderKind::OpenAi
    }

    fn endpoint(&self, base_url: &str, _model: &str) -> String {
        join_url(base_url, "chat/completions")
    }

    fn auth_headers(&self, api_key: &SecretString) -> Vec<(String, String)> {
        vec![(
            "Authorization".into(),
            format!("Bearer {}", api_key.expose()),
        )]
    }

    fn build_body(&self, model: &str, payload: &ClassifyPayload<'_>) -> Result<Value> {
        let user = serde_json::to_string(payload)?;
        Ok(json!({
            "model": model,
            "temperature": 0,
            "max_tokens": BASE_MAX_TOKENS + MAX_TOKENS_PER_ITEM * payload.items.len(),
            "response_format": Self::response_format(),
            "messages": [
                {"role": "system", "content": SYSTEM_PROMPT},
                {"role": "user", "content": user},
            ],
            "user": "tiles",
        }))
    }

    fn extract_text(&self, envelope: &Value) -> Result<String> {
        envelope
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProviderError::InvalidResponse("no message content in choices".into()))
    }
}
