//! Dispatch coordinator.
//!
//! [`DispatchCoordinator`] owns the active epoch, the in-flight dispatch's
//! cancellation token, the single-flight gate, the durable cache, the
//! settings cache and the provider set. Every batch goes through
//! [`submit`](DispatchCoordinator::submit):
//!
//! 1. Reject immediately if the epoch is not the active one.
//! 2. Queue on the FIFO gate; once admitted, re-check the epoch, adopt it
//!    and create a fresh cancellation token.
//! 3. Derive keys, read the cache, split hits from misses. Hits are touched
//!    in the background.
//! 4. Send misses to the provider for the configured kind.
//! 5. Re-check the epoch. A change means the answers are discarded.
//! 6. Write new answers to the cache in the background, sanitize, return.
//!
//! [`navigation_changed`](DispatchCoordinator::navigation_changed) moves the
//! epoch and cancels whatever is in flight without waiting for it.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use parking_lot::Mutex;
use tiles_llm::{Provider, SettingsResolver, align_results, fallback_results};
use tiles_types::config::{MAX_BATCH, ProviderKind};
use tiles_types::{ClassificationResult, Descriptor, Epoch, Label};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{CacheEntry, DurableCache};
use crate::key::{CacheKey, derive_key};

/// The primary and secondary network providers.
#[derive(Clone)]
pub struct ProviderSet {
    primary: Arc<dyn Provider>,
    secondary: Arc<dyn Provider>,
}

impl ProviderSet {
    pub fn new(primary: Arc<dyn Provider>, secondary: Arc<dyn Provider>) -> Self {
        Self { primary, secondary }
    }

    /// The provider serving `kind`.
    pub fn for_kind(&self, kind: ProviderKind) -> &Arc<dyn Provider> {
        match kind {
            ProviderKind::OpenAi => &self.primary,
            ProviderKind::Gemini => &self.secondary,
        }
    }
}

/// How a submitted batch settled.
#[derive(Debug, Clone, PartialEq)]
pub enum DispatchOutcome {
    /// The epoch moved on; nothing was returned or cached.
    Stale,
    /// The dispatch was cancelled mid-call; nothing was cached.
    Aborted,
    /// One result per submitted descriptor, in submission order.
    Classified(Vec<ClassificationResult>),
}

struct Inflight {
    id: u64,
    token: CancellationToken,
}

#[derive(Default)]
struct DispatchState {
    /// `None` until the first batch or navigation sets it.
    epoch: Option<Epoch>,
    inflight: Option<Inflight>,
}

/// Clears the in-flight slot on every exit path of a dispatch.
struct InflightGuard<'a> {
    state: &'a Mutex<DispatchState>,
    id: u64,
}

impl Drop for InflightGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.state.lock();
        if state.inflight.as_ref().is_some_and(|f| f.id == self.id) {
            state.inflight = None;
        }
    }
}

/// Serializes provider work and scopes it to the active epoch.
pub struct DispatchCoordinator {
    state: Mutex<DispatchState>,
    /// FIFO single-flight gate; tokio's mutex queues waiters fairly.
    gate: tokio::sync::Mutex<()>,
    cache: DurableCache,
    settings: Arc<SettingsResolver>,
    providers: ProviderSet,
    max_batch: usize,
    next_id: AtomicU64,
}

impl DispatchCoordinator {
    pub fn new(cache: DurableCache, settings: Arc<SettingsResolver>, providers: ProviderSet) -> Self {
        Self {
            state: Mutex::new(DispatchState::default()),
            gate: tokio::sync::Mutex::new(()),
            cache,
            settings,
            providers,
            max_batch: MAX_BATCH,
            next_id: AtomicU64::new(1),
        }
    }

    /// Cap descriptors per dispatch (never above the hard limit of 12).
    pub fn with_max_batch(mut self, max_batch: usize) -> Self {
        self.max_batch = max_batch.clamp(1, MAX_BATCH);
        self
    }

    pub fn cache(&self) -> &DurableCache {
        &self.cache
    }

    pub fn settings(&self) -> &Arc<SettingsResolver> {
        &self.settings
    }

    pub fn max_batch(&self) -> usize {
        self.max_batch
    }

    /// The epoch batches must currently carry.
    pub fn active_epoch(&self) -> Option<Epoch> {
        self.state.lock().epoch
    }

    /// `true` while a dispatch holds a cancellation token.
    pub fn is_dispatching(&self) -> bool {
        self.state.lock().inflight.is_some()
    }

    fn accepts(&self, epoch: Epoch) -> bool {
        self.state.lock().epoch.is_none_or(|active| active == epoch)
    }

    /// Make `epoch` active and cancel the in-flight dispatch, if any.
    /// Returns immediately.
    pub fn navigation_changed(&self, epoch: Epoch) {
        let cancelled = {
            let mut state = self.state.lock();
            state.epoch = Some(epoch);
            state.inflight.as_ref().map(|f| {
                f.token.cancel();
                f.id
            })
        };
        match cancelled {
            Some(dispatch) => info!(%epoch, dispatch, "navigation changed; cancelled in-flight dispatch"),
            None => debug!(%epoch, "navigation changed"),
        }
    }

    /// Drop cached provider settings so the next dispatch re-reads them.
    /// With `clear_cache`, stored labels are discarded as well.
    pub async fn config_changed(&self, clear_cache: bool) {
        self.settings.invalidate();
        if clear_cache {
            if let Err(e) = self.cache.clear().await {
                warn!(error = %e, "failed to clear cache after config change");
            }
        }
        info!(clear_cache, "configuration changed");
    }

    /// Classify `batch` under `epoch`. Always settles.
    pub async fn submit(&self, mut batch: Vec<Descriptor>, epoch: Epoch) -> DispatchOutcome {
        if !self.accepts(epoch) {
            debug!(%epoch, "batch epoch is not active; stale on arrival");
            return DispatchOutcome::Stale;
        }

        let _gate = self.gate.lock().await;

        let (id, token) = {
            let mut state = self.state.lock();
            if state.epoch.is_some_and(|active| active != epoch) {
                drop(state);
                debug!(%epoch, "epoch changed while queued; stale");
                return DispatchOutcome::Stale;
            }
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            let token = CancellationToken::new();
            state.epoch = Some(epoch);
            state.inflight = Some(Inflight {
                id,
                token: token.clone(),
            });
            (id, token)
        };
        let _inflight = InflightGuard {
            state: &self.state,
            id,
        };

        if batch.len() > self.max_batch {
            debug!(submitted = batch.len(), max = self.max_batch, "truncating batch");
            batch.truncate(self.max_batch);
        }
        self.dispatch(id, &batch, epoch, &token).await
    }

    async fn dispatch(
        &self,
        id: u64,
        batch: &[Descriptor],
        epoch: Epoch,
        token: &CancellationToken,
    ) -> DispatchOutcome {
        let keys: Vec<CacheKey> = batch.iter().map(derive_key).collect();
        let found = self.cache.lookup(&keys).await;

        let now = Utc::now();
        let mut results: Vec<Option<ClassificationResult>> = vec![None; batch.len()];
        let mut hit_keys = Vec::new();
        let mut miss_idx = Vec::new();
        for (i, key) in keys.iter().enumerate() {
            match found.get(key).filter(|e| self.cache.is_fresh(e, now)) {
                Some(entry) => {
                    results[i] = Some(entry.to_result(i));
                    hit_keys.push(key.clone());
                }
                None => miss_idx.push(i),
            }
        }
        debug!(
            dispatch = id,
            %epoch,
            hits = hit_keys.len(),
            misses = miss_idx.len(),
            "cache lookup complete"
        );
        self.cache.touch_detached(hit_keys);

        if !miss_idx.is_empty() {
            let misses: Vec<Descriptor> = miss_idx.iter().map(|&i| batch[i].clone()).collect();
            // One snapshot both picks the provider and configures its call.
            let settings = self.settings.resolve().await;
            let provider = self.providers.for_kind(settings.kind);
            debug!(
                dispatch = id,
                provider = provider.name(),
                misses = misses.len(),
                "classifying misses"
            );

            let answers = match provider.classify(&settings, &misses, token).await {
                Ok(answers) => align_results(answers, misses.len()),
                Err(e) if e.is_aborted() => {
                    info!(dispatch = id, %epoch, "dispatch aborted");
                    return DispatchOutcome::Aborted;
                }
                Err(e) => {
                    warn!(dispatch = id, error = %e, "provider failed; using fallback results");
                    fallback_results(misses.len())
                }
            };
            for (j, answer) in answers.into_iter().enumerate() {
                let at = miss_idx[j];
                results[at] = Some(ClassificationResult::new(at, answer.label, answer.confidence));
            }
        }

        if self.active_epoch() != Some(epoch) {
            debug!(dispatch = id, %epoch, "epoch changed during dispatch; discarding results");
            return DispatchOutcome::Stale;
        }

        // Zero-confidence answers are failure fallbacks; caching them would
        // pin `Custom` on the key for the whole TTL.
        let written = Utc::now();
        let writes: Vec<CacheEntry> = miss_idx
            .iter()
            .filter_map(|&i| results[i])
            .filter(|r| r.confidence > 0.0)
            .map(|r| CacheEntry::new(keys[r.index].clone(), r.label, r.confidence, written))
            .collect();
        self.cache.put_detached(writes);

        let mut out: Vec<ClassificationResult> = results
            .into_iter()
            .enumerate()
            .map(|(i, r)| r.unwrap_or_else(|| ClassificationResult::fallback(i)))
            .collect();
        for r in &mut out {
            if r.sanitize() {
                warn!(dispatch = id, index = r.index, "confidence out of range; clamped");
            }
        }

        let mut by_label: BTreeMap<Label, usize> = BTreeMap::new();
        for r in &out {
            *by_label.entry(r.label).or_default() += 1;
        }
        debug!(dispatch = id, %epoch, summary = ?by_label, "classify summary by label");

        DispatchOutcome::Classified(out)
    }
}

impl std::fmt::Debug for DispatchCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("DispatchCoordinator")
            .field("epoch", &state.epoch)
            .field("dispatching", &state.inflight.is_some())
            .field("max_batch", &self.max_batch)
            .finish()
    }
}
