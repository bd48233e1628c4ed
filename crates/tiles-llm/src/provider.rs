//! The [`Provider`] trait for batch classification.

use async_trait::async_trait;
use tiles_types::config::ProviderSettings;
use tiles_types::{ClassificationResult, Descriptor};
use tokio_util::sync::CancellationToken;

use crate::error::Result;

/// Something that can label a batch of descriptors.
///
/// Implementations return exactly one result per input descriptor, indexed
/// by batch position. The network adapters never fail except with
/// [`ProviderError::Aborted`](crate::error::ProviderError::Aborted); every
/// other failure is folded into a uniform fallback result set.
#[async_trait]
pub trait Provider: Send + Sync {
    /// Returns the provider name (e.g. "openai", "gemini", "local").
    fn name(&self) -> &str;

    /// Classify `batch` under one resolved `settings` snapshot, observing
    /// `cancel` at every suspension point.
    async fn classify(
        &self,
        settings: &ProviderSettings,
        batch: &[Descriptor],
        cancel: &CancellationToken,
    ) -> Result<Vec<ClassificationResult>>;
}

/// `len` fallback results (`Custom`, confidence 0).
pub fn fallback_results(len: usize) -> Vec<ClassificationResult> {
    (0..len).map(ClassificationResult::fallback).collect()
}

/// Place provider results into a vector of exactly `len` entries.
///
/// Each result goes to its own `index` when that slot is in range and free,
/// else to its position in the response. Leftovers are dropped and empty
/// slots become fallbacks. Confidences are re-clamped.
pub fn align_results(results: Vec<ClassificationResult>, len: usize) -> Vec<ClassificationResult> {
    let mut slots: Vec<Option<ClassificationResult>> = vec![None; len];

    for (position, mut result) in results.into_iter().enumerate() {
        let slot = if result.index < len && slots[result.index].is_none() {
            result.index
        } else if position < len && slots[position].is_none() {
            position
        } else {
            continue;
        };
        result.index = slot;
        result.sanitize();
        slots[slot] = Some(result);
    }

    slots
        .into_iter()
        .enumerate()
        .map(|(i, r)| r.unwrap_or_else(|| ClassificationResult::fallback(i)))
        .collect()
}
