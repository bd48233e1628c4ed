//! Per-item classification results.

use serde::{Deserialize, Serialize};

use crate::label::Label;

/// Clamp a confidence into `[0, 1]`. Non-finite values read as 0.
pub fn clamp_confidence(value: f64) -> f64 {
    if value.is_finite() {
        value.clamp(0.0, 1.0)
    } else {
        0.0
    }
}

/// The label and confidence for one descriptor, addressed by its position in
/// the submitted batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ClassificationResult {
    pub index: usize,
    pub label: Label,
    pub confidence: f64,
}

impl ClassificationResult {
    /// Build a result, clamping `confidence` into range.
    pub fn new(index: usize, label: Label, confidence: f64) -> Self {
        Self {
            index,
            label,
            confidence: clamp_confidence(confidence),
        }
    }

    /// The uniform low-confidence result used when classification failed.
    pub fn fallback(index: usize) -> Self {
        Self::new(index, Label::Custom, 0.0)
    }

    /// Re-clamp the confidence. Returns `true` if anything changed.
    pub fn sanitize(&mut self) -> bool {
        let clamped = clamp_confidence(self.confidence);
        // NaN != NaN, so compare bit patterns to catch it too.
        let changed = clamped.to_bits() != self.confidence.to_bits();
        self.confidence = clamped;
        changed
    }
}
