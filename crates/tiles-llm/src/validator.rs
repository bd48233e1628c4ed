//! Response validation for provider output.
//!
//! Providers may answer with a bare array, `{items:[...]}` or
//! `{result:[...]}`. Every element must carry an integer `index >= 0`, a
//! `label` from the closed set and a `confidence` in `[0, 1]`. Validation
//! stops at the first violation and never accepts part of a batch.
//!
//! [`SchemaValidator`] additionally rejects unknown fields. [`LightValidator`]
//! applies the same four rules and ignores extras. [`select_validator`]
//! picks one at startup.

use std::fmt;
use std::sync::Arc;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;
use tiles_types::{ClassificationResult, Label};

/// The first contract violation found in a provider response.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ValidationError {
    #[error("bad shape: expected array or {{items:[...]}} or {{result:[...]}}")]
    BadShape,

    #[error("item {position}: {reason}")]
    Item { position: usize, reason: String },
}

impl ValidationError {
    fn item(position: usize, reason: impl Into<String>) -> Self {
        ValidationError::Item {
            position,
            reason: reason.into(),
        }
    }
}

/// Turns decoded provider JSON into classification results.
pub trait ResponseValidator: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn validate(&self, raw: &Value) -> Result<Vec<ClassificationResult>, ValidationError>;
}

/// Locate the result array inside one of the three tolerated shapes.
pub fn extract_items(raw: &Value) -> Result<&[Value], ValidationError> {
    if let Some(arr) = raw.as_array() {
        return Ok(arr);
    }
    ["items", "result"]
        .iter()
        .find_map(|k| raw.get(k).and_then(Value::as_array))
        .map(Vec::as_slice)
        .ok_or(ValidationError::BadShape)
}

fn check_confidence(position: usize, confidence: f64) -> Result<f64, ValidationError> {
    if confidence.is_finite() && (0.0..=1.0).contains(&confidence) {
        Ok(confidence)
    } else {
        Err(ValidationError::item(
            position,
            format!("confidence {confidence} outside [0, 1]"),
        ))
    }
}

fn to_index(position: usize, index: u64) -> Result<usize, ValidationError> {
    usize::try_from(index).map_err(|_| ValidationError::item(position, "index out of range"))
}

// ── Strict ───────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct StrictItem {
    index: u64,
    label: Label,
    confidence: f64,
}

/// Typed validator that rejects unknown fields.
#[derive(Debug, Default, Clone, Copy)]
pub struct SchemaValidator;

impl ResponseValidator for SchemaValidator {
    fn name(&self) -> &'static str {
        "schema"
    }

    fn validate(&self, raw: &Value) -> Result<Vec<ClassificationResult>, ValidationError> {
        extract_items(raw)?
            .iter()
            .enumerate()
            .map(|(position, item)| {
                let parsed = StrictItem::deserialize(item)
                    .map_err(|e| ValidationError::item(position, e.to_string()))?;
                Ok(ClassificationResult {
                    index: to_index(position, parsed.index)?,
                    label: parsed.label,
                    confidence: check_confidence(position, parsed.confidence)?,
                })
            })
            .collect()
    }
}

// ── Light ────────────────────────────────────────────────────────────────

/// Rule-based validator: shape, index, label, confidence.
#[derive(Debug, Default, Clone, Copy)]
pub struct LightValidator;

impl ResponseValidator for LightValidator {
    fn name(&self) -> &'static str {
        "light"
    }

    fn validate(&self, raw: &Value) -> Result<Vec<ClassificationResult>, ValidationError> {
        let mut out = Vec::new();
        for (position, item) in extract_items(raw)?.iter().enumerate() {
            let obj = item
                .as_object()
                .ok_or_else(|| ValidationError::item(position, "not an object"))?;

            let index = obj
                .get("index")
                .and_then(Value::as_u64)
                .ok_or_else(|| ValidationError::item(position, "bad index"))?;

            let label = obj
                .get("label")
                .and_then(Value::as_str)
                .ok_or_else(|| ValidationError::item(position, "missing label"))?;
            let label = Label::parse(label)
                .ok_or_else(|| ValidationError::item(position, format!("bad label: {label}")))?;

            let confidence = obj
                .get("confidence")
                .and_then(Value::as_f64)
                .ok_or_else(|| ValidationError::item(position, "bad confidence"))?;

            out.push(ClassificationResult {
                index: to_index(position, index)?,
                label,
                confidence: check_confidence(position, confidence)?,
            });
        }
        Ok(out)
    }
}

/// Choose the validator once, at startup.
pub fn select_validator(strict: bool) -> Arc<dyn ResponseValidator> {
    if strict {
        Arc::new(SchemaValidator)
    } else {
        Arc::new(LightValidator)
    }
}
