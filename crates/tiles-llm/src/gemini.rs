//! Generate-content dialect (secondary provider).

use percent_encoding::{AsciiSet, NON_ALPHANUMERIC, utf8_percent_encode};
use serde_json::{Value, json};
use tiles_types::config::ProviderKind;
use tiles_types::{Label, SecretString};

use crate::adapter::{Dialect, join_url};
use crate::error::{ProviderError, Result};
use crate::prompt::{ClassifyPayload, SYSTEM_PROMPT};

/// Characters escaped in the model path segment; `-`, `.` and `_` stay.
const MODEL_SEGMENT: &AsciiSet = &NON_ALPHANUMERIC.remove(b'-').remove(b'.').remove(b'_');

/// POST `{base}/models/{model}:generateContent` with `x-goog-api-key` and a
/// JSON response schema.
#[derive(Debug, Default, Clone, Copy)]
pub struct GeminiDialect;

impl GeminiDialect {
    fn response_schema() -> Value {
        json!({
            "type": "ARRAY",
            "items": {
                "type": "OBJECT",
                "properties": {
                    "index": {"type": "INTEGER"},
                    "label": {"type": "STRING", "enum": Label::wire_names()},
                    "confidence": {"type": "NUMBER"},
                },
                "required": ["index", "label", "confidence"],
            },
        })
    }
}

impl Dialect for GeminiDialect {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Gemini
    }

    fn endpoint(&self, base_url: &str, model: &str) -> String {
        let model = utf8_percent_encode(model, MODEL_SEGMENT);
        join_url(base_url, &format!("models/{model}:generateContent"))
    }

    fn auth_headers(&self, api_key: &SecretString) -> Vec<(String, String)> {
        vec![("x-goog-api-key".into(), api_key.expose().to_string())]
    }

    fn build_body(&self, _model: &str, payload: &ClassifyPayload<'_>) -> Result<Value> {
        let user = serde_json::to_string(payload)?;
        Ok(json!({
            "contents": [{"role": "user", "parts": [{"text": user}]}],
            "generationConfig": {
                "temperature": 0,
                "response_mime_type": "application/json",
                "response_schema": Self::response_schema(),
            },
            "systemInstruction": {"role": "system", "parts": [{"text": SYSTEM_PROMPT}]},
        }))
    }

    fn extract_text(&self, envelope: &Value) -> Result<String> {
        envelope
            .pointer("/candidates/0/content/parts/0/text")
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| ProviderError::InvalidResponse("no text part in candidates".into()))
    }
}
