//! Durable label cache.
//!
//! Records map a [`CacheKey`] to the label and confidence last produced for
//! it, stamped with a creation time (`ts`) and a last-access time
//! (`lastAccess`). A [`CacheStore`] persists them. [`DurableCache`] adds the
//! policy on top: freshness against the TTL, capacity-bounded purges,
//! detached writes, and the rule that a failing store degrades to misses
//! instead of failing a dispatch.

pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use std::collections::{BTreeMap, HashMap};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tiles_types::config::CacheConfig;
use tiles_types::{ClassificationResult, Label, clamp_confidence};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::key::CacheKey;

// ── Records ──────────────────────────────────────────────────────────────

/// One cached classification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: CacheKey,
    pub label: Label,
    pub confidence: f64,
    /// Creation time, milliseconds since the epoch on disk.
    #[serde(rename = "ts", with = "chrono::serde::ts_milliseconds")]
    pub created_at: DateTime<Utc>,
    #[serde(rename = "lastAccess", with = "chrono::serde::ts_milliseconds")]
    pub last_access: DateTime<Utc>,
}

impl CacheEntry {
    /// A fresh entry; `confidence` is clamped into `[0, 1]`.
    pub fn new(key: CacheKey, label: Label, confidence: f64, now: DateTime<Utc>) -> Self {
        Self {
            key,
            label,
            confidence: clamp_confidence(confidence),
            created_at: now,
            last_access: now,
        }
    }

    /// The entry as a result at batch position `index`.
    pub fn to_result(&self, index: usize) -> ClassificationResult {
        ClassificationResult::new(index, self.label, self.confidence)
    }
}

/// Outcome of one maintenance sweep.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct PurgeReport {
    /// Entries removed for exceeding the TTL.
    pub expired: usize,
    /// Least-recently-accessed entries removed to honor capacity.
    pub evicted: usize,
    pub remaining: usize,
}

/// Summary of the store contents.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    /// Entries older than the TTL that a purge would remove.
    pub stale: usize,
    pub oldest: Option<DateTime<Utc>>,
    pub newest: Option<DateTime<Utc>>,
    pub by_label: BTreeMap<String, usize>,
}

// ── Errors ───────────────────────────────────────────────────────────────

/// Errors raised by a [`CacheStore`].
#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache io error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("cache json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("cache store corrupt: {0}")]
    Corrupt(String),
}

/// A convenience type alias for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;

// ── Store trait ──────────────────────────────────────────────────────────

/// Persistence for cache entries.
///
/// `get_many` does not look at the TTL; freshness is the caller's decision.
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Entries for the keys that exist.
    async fn get_many(&self, keys: &[CacheKey]) -> Result<HashMap<CacheKey, CacheEntry>>;

    /// Insert or replace entries.
    async fn put_many(&self, entries: Vec<CacheEntry>) -> Result<()>;

    /// Set `lastAccess` on existing keys; unknown keys are ignored.
    async fn touch_many(&self, keys: &[CacheKey], at: DateTime<Utc>) -> Result<()>;

    /// Remove entries older than `ttl` (by `ts`), then evict by oldest
    /// `lastAccess` until at most `max_entries` remain.
    async fn purge_expired_and_overflow(
        &self,
        ttl: TimeDelta,
        max_entries: usize,
        now: DateTime<Utc>,
    ) -> Result<PurgeReport>;

    async fn len(&self) -> Result<usize>;

    async fn clear(&self) -> Result<()>;

    /// Up to `limit` entries, newest `ts` first.
    async fn dump(&self, limit: usize) -> Result<Vec<CacheEntry>>;

    /// Write out anything held only in memory. Stores that persist every
    /// call have nothing to do.
    async fn persist(&self) -> Result<()> {
        Ok(())
    }
}

// ── Shared map operations ────────────────────────────────────────────────

pub(crate) fn select(
    map: &HashMap<CacheKey, CacheEntry>,
    keys: &[CacheKey],
) -> HashMap<CacheKey, CacheEntry> {
    keys.iter()
        .filter_map(|k| map.get(k).map(|e| (k.clone(), e.clone())))
        .collect()
}

pub(crate) fn touch(
    map: &mut HashMap<CacheKey, CacheEntry>,
    keys: &[CacheKey],
    at: DateTime<Utc>,
) -> usize {
    let mut touched = 0;
    for key in keys {
        if let Some(entry) = map.get_mut(key) {
            entry.last_access = at;
            touched += 1;
        }
    }
    touched
}

pub(crate) fn purge_map(
    map: &mut HashMap<CacheKey, CacheEntry>,
    ttl: TimeDelta,
    max_entries: usize,
    now: DateTime<Utc>,
) -> PurgeReport {
    let before = map.len();
    map.retain(|_, e| now - e.created_at <= ttl);
    let expired = before - map.len();

    let mut evicted = 0;
    if map.len() > max_entries {
        let mut by_access: Vec<(DateTime<Utc>, CacheKey)> = map
            .values()
            .map(|e| (e.last_access, e.key.clone()))
            .collect();
        by_access.sort();
        let excess = map.len() - max_entries;
        for (_, key) in by_access.into_iter().take(excess) {
            map.remove(&key);
            evicted += 1;
        }
    }

    PurgeReport {
        expired,
        evicted,
        remaining: map.len(),
    }
}

pub(crate) fn newest_first(map: &HashMap<CacheKey, CacheEntry>, limit: usize) -> Vec<CacheEntry> {
    let mut entries: Vec<CacheEntry> = map.values().cloned().collect();
    entries.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.key.cmp(&b.key)));
    entries.truncate(limit);
    entries
}

// ── Policy wrapper ───────────────────────────────────────────────────────

/// A [`CacheStore`] plus TTL and capacity policy.
///
/// Cloning is cheap and shares the store.
#[derive(Clone)]
pub struct DurableCache {
    store: Arc<dyn CacheStore>,
    ttl: TimeDelta,
    max_entries: usize,
    pending: Arc<Mutex<Vec<JoinHandle<()>>>>,
}

impl DurableCache {
    pub fn new(store: Arc<dyn CacheStore>, ttl: Duration, max_entries: usize) -> Self {
        Self {
            store,
            ttl: TimeDelta::from_std(ttl).unwrap_or_else(|_| TimeDelta::days(36_500)),
            max_entries: max_entries.max(1),
            pending: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn from_config(store: Arc<dyn CacheStore>, config: &CacheConfig) -> Self {
        Self::new(
            store,
            Duration::from_secs(config.ttl_days.saturating_mul(24 * 60 * 60)),
            config.max_entries,
        )
    }

    pub fn ttl(&self) -> TimeDelta {
        self.ttl
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }

    /// `true` while `now - ts <= ttl`.
    pub fn is_fresh(&self, entry: &CacheEntry, now: DateTime<Utc>) -> bool {
        now - entry.created_at <= self.ttl
    }

    /// Stored entries for `keys`, stale ones included. A store error is
    /// logged and reads as an empty map.
    pub async fn lookup(&self, keys: &[CacheKey]) -> HashMap<CacheKey, CacheEntry> {
        match self.store.get_many(keys).await {
            Ok(found) => found,
            Err(e) => {
                warn!(error = %e, keys = keys.len(), "cache read failed; treating as misses");
                HashMap::new()
            }
        }
    }

    /// Update `lastAccess` in the background.
    pub fn touch_detached(&self, keys: Vec<CacheKey>) {
        if keys.is_empty() {
            return;
        }
        let store = Arc::clone(&self.store);
        self.track(tokio::spawn(async move {
            if let Err(e) = store.touch_many(&keys, Utc::now()).await {
                warn!(error = %e, keys = keys.len(), "cache lastAccess update failed");
            }
        }));
    }

    /// Write entries in the background.
    pub fn put_detached(&self, entries: Vec<CacheEntry>) {
        if entries.is_empty() {
            return;
        }
        let store = Arc::clone(&self.store);
        self.track(tokio::spawn(async move {
            let count = entries.len();
            match store.put_many(entries).await {
                Ok(()) => debug!(entries = count, "cache write complete"),
                Err(e) => warn!(error = %e, entries = count, "cache write failed"),
            }
        }));
    }

    fn track(&self, handle: JoinHandle<()>) {
        let mut pending = self.pending.lock();
        pending.retain(|h| !h.is_finished());
        pending.push(handle);
    }

    /// Wait for every detached write issued so far, then persist any
    /// touches the store is holding in memory.
    pub async fn flush(&self) {
        let handles: Vec<JoinHandle<()>> = std::mem::take(&mut *self.pending.lock());
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "detached cache task failed");
            }
        }
        if let Err(e) = self.store.persist().await {
            warn!(error = %e, "cache persist failed");
        }
    }

    /// Run one TTL + capacity sweep.
    pub async fn purge(&self) -> Result<PurgeReport> {
        let report = self
            .store
            .purge_expired_and_overflow(self.ttl, self.max_entries, Utc::now())
            .await?;
        info!(
            expired = report.expired,
            evicted = report.evicted,
            remaining = report.remaining,
            "cache purge complete"
        );
        Ok(report)
    }

    /// Purge now, then every `interval`, until `cancel` fires.
    pub fn spawn_maintenance(&self, interval: Duration, cancel: CancellationToken) -> JoinHandle<()> {
        let cache = self.clone();
        let interval = interval.max(Duration::from_secs(1));
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        if let Err(e) = cache.purge().await {
                            warn!(error = %e, "cache purge failed");
                        }
                    }
                }
            }
            debug!("cache maintenance stopped");
        })
    }

    pub async fn len(&self) -> Result<usize> {
        self.store.len().await
    }

    pub async fn clear(&self) -> Result<()> {
        self.store.clear().await?;
        info!("cache cleared");
        Ok(())
    }

    pub async fn dump(&self, limit: usize) -> Result<Vec<CacheEntry>> {
        self.store.dump(limit).await
    }

    pub async fn stats(&self) -> Result<CacheStats> {
        let entries = self.store.dump(usize::MAX).await?;
        let now = Utc::now();
        let mut stats = CacheStats {
            entries: entries.len(),
            ..CacheStats::default()
        };
        for entry in &entries {
            if !self.is_fresh(entry, now) {
                stats.stale += 1;
            }
            *stats.by_label.entry(entry.label.to_string()).or_default() += 1;
            stats.oldest = Some(stats.oldest.map_or(entry.created_at, |t| t.min(entry.created_at)));
            stats.newest = Some(stats.newest.map_or(entry.created_at, |t| t.max(entry.created_at)));
        }
        Ok(stats)
    }
}

impl std::fmt::Debug for DurableCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DurableCache")
            .field("ttl_secs", &self.ttl.num_seconds())
            .field("max_entries", &self.max_entries)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::derive_key;
    use tiles_types::Descriptor;

    fn key(n: u64) -> CacheKey {
        derive_key(&Descriptor::new(format!("title {n}"), "chan", n))
    }

    fn entry_at(n: u64, created: DateTime<Utc>, accessed: DateTime<Utc>) -> CacheEntry {
        CacheEntry {
            key: key(n),
            label: Label::Entertainment,
            confidence: 0.5,
            created_at: created,
            last_access: accessed,
        }
    }

    #[test]
    fn entry_clamps_confidence() {
        let e = CacheEntry::new(key(1), Label::Custom, 3.0, Utc::now());
        assert_eq!(e.confidence, 1.0);
        let e = CacheEntry::new(key(1), Label::Custom, f64::NAN, Utc::now());
        assert_eq!(e.confidence, 0.0);
    }

    #[test]
    fn entry_wire_names() {
        let now = DateTime::from_timestamp_millis(1_700_000_000_000).unwrap();
        let e = CacheEntry::new(key(1), Label::CareerPrep, 0.8, now);
        let v = serde_json::to_value(&e).unwrap();
        assert_eq!(v["ts"], 1_700_000_000_000i64);
        assert_eq!(v["lastAccess"], 1_700_000_000_000i64);
        assert_eq!(v["label"], "Learning - Career Prep");
        let back: CacheEntry = serde_json::from_value(v).unwrap();
        assert_eq!(back, e);
    }

    #[test]
    fn purge_removes_expired_then_lru() {
        let now = Utc::now();
        let ttl = TimeDelta::days(14);
        let mut map = HashMap::new();
        // Two expired.
        for n in 0..2 {
            let e = entry_at(n, now - TimeDelta::days(15), now);
            map.insert(e.key.clone(), e);
        }
        // Five fresh, accessed at increasing times.
        for n in 2..7 {
            let e = entry_at(n, now, now - TimeDelta::minutes(100 - n as i64));
            map.insert(e.key.clone(), e);
        }

        let report = purge_map(&mut map, ttl, 3, now);
        assert_eq!(report.expired, 2);
        assert_eq!(report.evicted, 2);
        assert_eq!(report.remaining, 3);
        // Least recently accessed (n = 2, 3) went first.
        assert!(!map.contains_key(&key(2)));
        assert!(!map.contains_key(&key(3)));
        assert!(map.contains_key(&key(6)));
        assert!(map.values().all(|e| now - e.created_at <= ttl));
    }

    #[test]
    fn purge_within_capacity_keeps_everything_fresh() {
        let now = Utc::now();
        let mut map = HashMap::new();
        let e = entry_at(1, now, now);
        map.insert(e.key.clone(), e);
        let report = purge_map(&mut map, TimeDelta::days(1), 10, now);
        assert_eq!(report, PurgeReport { expired: 0, evicted: 0, remaining: 1 });
    }

    #[test]
    fn newest_first_orders_and_limits() {
        let now = Utc::now();
        let mut map = HashMap::new();
        for n in 0..5 {
            let e = entry_at(n, now - TimeDelta::seconds(n as i64), now);
            map.insert(e.key.clone(), e);
        }
        let out = newest_first(&map, 2);
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].key, key(0));
        assert_eq!(out[1].key, key(1));
    }

    #[test]
    fn freshness_boundary() {
        let cache = DurableCache::new(
            Arc::new(MemoryStore::new()),
            Duration::from_secs(60),
            10,
        );
        let now = Utc::now();
        assert!(cache.is_fresh(&entry_at(1, now - TimeDelta::seconds(60), now), now));
        assert!(!cache.is_fresh(&entry_at(1, now - TimeDelta::seconds(61), now), now));
    }

    #[test]
    fn from_config_uses_days() {
        let cache = DurableCache::from_config(Arc::new(MemoryStore::new()), &CacheConfig::default());
        assert_eq!(cache.ttl(), TimeDelta::days(14));
        assert_eq!(cache.max_entries(), 5000);
    }

    struct BrokenStore;

    #[async_trait]
    impl CacheStore for BrokenStore {
        async fn get_many(&self, _: &[CacheKey]) -> Result<HashMap<CacheKey, CacheEntry>> {
            Err(CacheError::Corrupt("broken".into()))
        }
        async fn put_many(&self, _: Vec<CacheEntry>) -> Result<()> {
            Err(CacheError::Corrupt("broken".into()))
        }
        async fn touch_many(&self, _: &[CacheKey], _: DateTime<Utc>) -> Result<()> {
            Err(CacheError::Corrupt("broken".into()))
        }
        async fn purge_expired_and_overflow(
            &self,
            _: TimeDelta,
            _: usize,
            _: DateTime<Utc>,
        ) -> Result<PurgeReport> {
            Err(CacheError::Corrupt("broken".into()))
        }
        async fn len(&self) -> Result<usize> {
            Err(CacheError::Corrupt("broken".into()))
        }
        async fn clear(&self) -> Result<()> {
            Err(CacheError::Corrupt("broken".into()))
        }
        async fn dump(&self, _: usize) -> Result<Vec<CacheEntry>> {
            Err(CacheError::Corrupt("broken".into()))
        }
    }

    #[tokio::test]
    async fn broken_store_degrades_to_misses() {
        let cache = DurableCache::new(Arc::new(BrokenStore), Duration::from_secs(60), 10);
        assert!(cache.lookup(&[key(1)]).await.is_empty());
        cache.put_detached(vec![CacheEntry::new(key(1), Label::Custom, 0.5, Utc::now())]);
        cache.touch_detached(vec![key(1)]);
        cache.flush().await;
        assert!(cache.purge().await.is_err());
    }

    #[tokio::test]
    async fn detached_writes_land_after_flush() {
        let cache = DurableCache::new(Arc::new(MemoryStore::new()), Duration::from_secs(60), 10);
        cache.put_detached(vec![CacheEntry::new(key(1), Label::Custom, 0.5, Utc::now())]);
        cache.flush().await;
        assert_eq!(cache.len().await.unwrap(), 1);

        let stats = cache.stats().await.unwrap();
        assert_eq!(stats.entries, 1);
        assert_eq!(stats.stale, 0);
        assert_eq!(stats.by_label.get("Custom"), Some(&1));
    }

    #[tokio::test]
    async fn maintenance_purges_at_boot_and_stops_on_cancel() {
        let store = Arc::new(MemoryStore::new());
        let old = Utc::now() - TimeDelta::days(30);
        store.put_many(vec![entry_at(1, old, old)]).await.unwrap();

        let cache = DurableCache::new(store.clone(), Duration::from_secs(60), 10);
        let cancel = CancellationToken::new();
        let handle = cache.spawn_maintenance(Duration::from_secs(3600), cancel.clone());

        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(store.len().await.unwrap(), 0);

        cancel.cancel();
        handle.await.unwrap();
    }
}
