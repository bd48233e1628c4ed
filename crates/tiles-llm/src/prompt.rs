//! Provider-neutral request payload.
//!
//! Both dialects embed the same JSON document as the user turn: the intent
//! text with the label enum, the batch items, a response contract and a
//! one-line output example.

use serde::Serialize;
use serde_json::{Value, json};
use tiles_types::{Descriptor, Label, PageContext};

/// System turn shared by every provider.
pub const SYSTEM_PROMPT: &str = "You are a strict JSON classifier. Output ONLY valid JSON that \
     matches the schema (an array). No prose.";

const INSTRUCTIONS: &str = r#"Return JSON ONLY: [{"index":0,"label":"Learning - Skill Learning","confidence":0.92}, ...]"#;

/// Intent text naming the label enum.
pub fn intent() -> String {
    format!(
        "Pick exactly one label for each YouTube tile (see enum). \
         Return JSON array of {{index,label,confidence in [0,1]}}. \
         Labels enum: {}.",
        Label::wire_names().join(" | ")
    )
}

/// One batch item as the provider sees it.
#[derive(Debug, Serialize)]
pub struct PromptItem<'a> {
    pub index: usize,
    pub title: &'a str,
    pub channel: &'a str,
    pub duration_sec: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub snippet: Option<&'a str>,
    pub page_context: PageContext,
}

/// The user-turn document.
#[derive(Debug, Serialize)]
pub struct ClassifyPayload<'a> {
    pub intent: String,
    pub items: Vec<PromptItem<'a>>,
    pub response_contract: Value,
    pub instructions: &'static str,
}

/// Build the payload for `batch`; item indices are batch positions.
pub fn build_payload(batch: &[Descriptor]) -> ClassifyPayload<'_> {
    let items = batch
        .iter()
        .enumerate()
        .map(|(index, d)| PromptItem {
            index,
            title: &d.title,
            channel: &d.channel,
            duration_sec: d.duration_sec,
            snippet: d.snippet.as_deref().filter(|s| !s.is_empty()),
            page_context: d.page_context,
        })
        .collect();

    ClassifyPayload {
        intent: intent(),
        items,
        response_contract: json!({
            "description": "Array of per-item classifications matching input order",
            "item_schema": item_schema(),
        }),
        instructions: INSTRUCTIONS,
    }
}

/// JSON Schema for one result element.
pub fn item_schema() -> Value {
    json!({
        "type": "object",
        "additionalProperties": false,
        "required": ["index", "label", "confidence"],
        "properties": {
            "index": {"type": "integer", "minimum": 0},
            "label": {"type": "string", "enum": Label::wire_names()},
            "confidence": {"type": "number", "minimum": 0, "maximum": 1},
        },
    })
}
