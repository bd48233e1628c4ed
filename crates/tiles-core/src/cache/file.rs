//! Single-file JSON cache store.
//!
//! All records live in one JSON document at `~/.tiles/cache.json` (or a
//! configured path). The file is read on first use and rewritten after
//! every insert, purge or clear: write to `<path>.tmp`, then rename over the
//! original, so a crash mid-write leaves the previous file intact.
//!
//! Access-time touches only update the in-memory map. They reach disk with
//! the next rewrite or an explicit [`persist`](CacheStore::persist), so a
//! burst of cache hits does not rewrite the whole file per batch.
//!
//! Records that fail to parse (unknown label, missing field) are skipped
//! with a warning. A file that is not JSON at all is moved aside to
//! `<path>.corrupt` and the store starts empty.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{CacheEntry, CacheError, CacheStore, PurgeReport, Result};
use crate::key::CacheKey;

const FORMAT_VERSION: u32 = 1;

#[derive(Deserialize)]
struct StoreFileIn {
    #[serde(default)]
    entries: Vec<Value>,
}

#[derive(Serialize)]
struct StoreFileOut<'a> {
    version: u32,
    entries: Vec<&'a CacheEntry>,
}

/// A [`CacheStore`] persisted as one JSON file.
#[derive(Debug)]
pub struct JsonFileStore {
    path: PathBuf,
    /// `None` until the file has been read.
    state: Mutex<Option<Loaded>>,
}

/// What a map operation needs written afterwards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Persist {
    No,
    /// Hold the change in memory until the next write.
    Later,
    Now,
}

#[derive(Debug)]
struct Loaded {
    map: HashMap<CacheKey, CacheEntry>,
    /// Touches applied in memory but not yet written.
    unsaved_touches: bool,
}

impl JsonFileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            state: Mutex::new(None),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn io_err(&self, source: std::io::Error) -> CacheError {
        CacheError::Io {
            path: self.path.clone(),
            source,
        }
    }

    async fn read_file(&self) -> Result<HashMap<CacheKey, CacheEntry>> {
        let text = match tokio::fs::read_to_string(&self.path).await {
            Ok(text) => text,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no cache file yet");
                return Ok(HashMap::new());
            }
            Err(e) => return Err(self.io_err(e)),
        };

        let file: StoreFileIn = match serde_json::from_str(&text) {
            Ok(file) => file,
            Err(e) => {
                let aside = self.path.with_extension("json.corrupt");
                warn!(
                    path = %self.path.display(),
                    moved_to = %aside.display(),
                    error = %e,
                    "cache file unreadable; starting empty"
                );
                tokio::fs::rename(&self.path, &aside).await.map_err(|source| {
                    CacheError::Corrupt(format!(
                        "{} is not valid JSON and could not be moved aside: {source}",
                        self.path.display()
                    ))
                })?;
                return Ok(HashMap::new());
            }
        };

        let mut map = HashMap::with_capacity(file.entries.len());
        let mut skipped = 0usize;
        for raw in file.entries {
            match serde_json::from_value::<CacheEntry>(raw) {
                Ok(mut entry) => {
                    entry.confidence = tiles_types::clamp_confidence(entry.confidence);
                    map.insert(entry.key.clone(), entry);
                }
                Err(_) => skipped += 1,
            }
        }
        if skipped > 0 {
            warn!(path = %self.path.display(), skipped, "skipped invalid cache records");
        }
        debug!(path = %self.path.display(), entries = map.len(), "cache file loaded");
        Ok(map)
    }

    async fn write_file(&self, map: &HashMap<CacheKey, CacheEntry>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.io_err(e))?;
            }
        }

        let doc = StoreFileOut {
            version: FORMAT_VERSION,
            entries: map.values().collect(),
        };
        let json = serde_json::to_vec(&doc)?;

        let tmp_path = self.path.with_extension("json.tmp");
        tokio::fs::write(&tmp_path, &json)
            .await
            .map_err(|e| self.io_err(e))?;
        tokio::fs::rename(&tmp_path, &self.path)
            .await
            .map_err(|e| self.io_err(e))?;
        Ok(())
    }

    /// Run `f` against the loaded map, then write or defer as it asks.
    async fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut HashMap<CacheKey, CacheEntry>) -> (T, Persist) + Send,
    ) -> Result<T>
    where
        T: Send,
    {
        let mut guard = self.state.lock().await;
        if guard.is_none() {
            *guard = Some(Loaded {
                map: self.read_file().await?,
                unsaved_touches: false,
            });
        }
        let Some(loaded) = guard.as_mut() else {
            return Err(CacheError::Corrupt("cache map not loaded".into()));
        };
        let (out, persist) = f(&mut loaded.map);
        match persist {
            Persist::No => {}
            Persist::Later => loaded.unsaved_touches = true,
            Persist::Now => {
                self.write_file(&loaded.map).await?;
                loaded.unsaved_touches = false;
            }
        }
        Ok(out)
    }

    /// `true` when touches are waiting for the next write.
    pub async fn has_unsaved_touches(&self) -> bool {
        self.state
            .lock()
            .await
            .as_ref()
            .is_some_and(|loaded| loaded.unsaved_touches)
    }
}

#[async_trait]
impl CacheStore for JsonFileStore {
    async fn get_many(&self, keys: &[CacheKey]) -> Result<HashMap<CacheKey, CacheEntry>> {
        self.with_entries(|map| (super::select(map, keys), Persist::No))
            .await
    }

    async fn put_many(&self, entries: Vec<CacheEntry>) -> Result<()> {
        self.with_entries(|map| {
            let persist = if entries.is_empty() {
                Persist::No
            } else {
                Persist::Now
            };
            for entry in entries {
                map.insert(entry.key.clone(), entry);
            }
            ((), persist)
        })
        .await
    }

    async fn touch_many(&self, keys: &[CacheKey], at: DateTime<Utc>) -> Result<()> {
        self.with_entries(|map| {
            let persist = if super::touch(map, keys, at) > 0 {
                Persist::Later
            } else {
                Persist::No
            };
            ((), persist)
        })
        .await
    }

    async fn purge_expired_and_overflow(
        &self,
        ttl: TimeDelta,
        max_entries: usize,
        now: DateTime<Utc>,
    ) -> Result<PurgeReport> {
        let report = self.with_entries(|map| {
            let report = super::purge_map(map, ttl, max_entries, now);
            let persist = if report.expired + report.evicted > 0 {
                Persist::Now
            } else {
                Persist::No
            };
            (report, persist)
        })
        .await?;
        self.persist().await?;
        Ok(report)
    }

    async fn len(&self) -> Result<usize> {
        self.with_entries(|map| (map.len(), Persist::No)).await
    }

    async fn clear(&self) -> Result<()> {
        self.with_entries(|map| {
            map.clear();
            ((), Persist::Now)
        })
        .await
    }

    async fn dump(&self, limit: usize) -> Result<Vec<CacheEntry>> {
        self.with_entries(|map| (super::newest_first(map, limit), Persist::No))
            .await
    }

    async fn persist(&self) -> Result<()> {
        let mut guard = self.state.lock().await;
        let Some(loaded) = guard.as_mut() else {
            return Ok(());
        };
        if loaded.unsaved_touches {
            self.write_file(&loaded.map).await?;
            loaded.unsaved_touches = false;
            debug!(path = %self.path.display(), "cache touches persisted");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration;

    use crate::cache::DurableCache;
    use crate::key::derive_key;
    use tiles_types::{Descriptor, Label};

    fn entry(title: &str) -> CacheEntry {
        CacheEntry::new(
            derive_key(&Descriptor::new(title, "c", 10)),
            Label::SkillLearning,
            0.8,
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn missing_file_is_empty() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("cache.json"));
        assert_eq!(store.len().await.unwrap(), 0);
        assert!(!store.path().exists());
    }

    #[tokio::test]
    async fn writes_survive_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("cache.json");
        let a = entry("a");

        let store = JsonFileStore::new(&path);
        store.put_many(vec![a.clone()]).await.unwrap();
        assert!(path.exists());
        assert!(!path.with_extension("json.tmp").exists());

        let reopened = JsonFileStore::new(&path);
        let found = reopened.get_many(&[a.key.clone()]).await.unwrap();
        assert_eq!(found.get(&a.key), Some(&a));
    }

    #[tokio::test]
    async fn file_uses_wire_field_names() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let store = JsonFileStore::new(&path);
        store.put_many(vec![entry("a")]).await.unwrap();

        let doc: Value = serde_json::from_str(&std::fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc["version"], 1);
        let rec = &doc["entries"][0];
        assert!(rec.get("ts").is_some());
        assert!(rec.get("lastAccess").is_some());
        assert_eq!(rec["label"], "Learning - Skill Learning");
    }

    #[tokio::test]
    async fn invalid_records_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let good = entry("good");
        let doc = serde_json::json!({
            "version": 1,
            "entries": [
                serde_json::to_value(&good).unwrap(),
                {"key": "abc", "label": "Cooking", "confidence": 0.5, "ts": 1, "lastAccess": 1},
                {"key": "def"}
            ]
        });
        std::fs::write(&path, doc.to_string()).unwrap();

        let store = JsonFileStore::new(&path);
        assert_eq!(store.len().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn corrupt_file_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        std::fs::write(&path, "{not json").unwrap();

        let store = JsonFileStore::new(&path);
        assert_eq!(store.len().await.unwrap(), 0);
        assert!(path.with_extension("json.corrupt").exists());

        store.put_many(vec![entry("a")]).await.unwrap();
        assert_eq!(JsonFileStore::new(&path).len().await.unwrap(), 1);
    }

    fn on_disk_last_access(path: &Path, key: &CacheKey) -> i64 {
        let doc: Value = serde_json::from_str(&std::fs::read_to_string(path).unwrap()).unwrap();
        doc["entries"]
            .as_array()
            .unwrap()
            .iter()
            .find(|rec| rec["key"] == key.as_str())
            .and_then(|rec| rec["lastAccess"].as_i64())
            .unwrap()
    }

    #[tokio::test]
    async fn touches_stay_in_memory_until_persist() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let store = JsonFileStore::new(&path);
        let a = entry("a");
        store.put_many(vec![a.clone()]).await.unwrap();
        let written = on_disk_last_access(&path, &a.key);

        let later = a.last_access + TimeDelta::seconds(30);
        store.touch_many(&[a.key.clone()], later).await.unwrap();
        assert!(store.has_unsaved_touches().await);
        assert_eq!(on_disk_last_access(&path, &a.key), written);

        let found = store.get_many(&[a.key.clone()]).await.unwrap();
        assert_eq!(found[&a.key].last_access, later);

        store.persist().await.unwrap();
        assert!(!store.has_unsaved_touches().await);
        assert_eq!(on_disk_last_access(&path, &a.key), later.timestamp_millis());
    }

    #[tokio::test]
    async fn next_put_carries_pending_touches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let store = JsonFileStore::new(&path);
        let a = entry("a");
        store.put_many(vec![a.clone()]).await.unwrap();

        let later = a.last_access + TimeDelta::seconds(30);
        store.touch_many(&[a.key.clone()], later).await.unwrap();
        store.put_many(vec![entry("b")]).await.unwrap();

        assert!(!store.has_unsaved_touches().await);
        assert_eq!(on_disk_last_access(&path, &a.key), later.timestamp_millis());
    }

    #[tokio::test]
    async fn durable_flush_writes_pending_touches() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let store = Arc::new(JsonFileStore::new(&path));
        let a = entry("a");
        store.put_many(vec![a.clone()]).await.unwrap();
        let written = on_disk_last_access(&path, &a.key);

        let cache = DurableCache::new(store.clone(), Duration::from_secs(3600), 100);
        tokio::time::sleep(Duration::from_millis(5)).await;
        cache.touch_detached(vec![a.key.clone()]);
        cache.flush().await;

        assert!(!store.has_unsaved_touches().await);
        assert!(on_disk_last_access(&path, &a.key) > written);
    }

    #[tokio::test]
    async fn touching_unknown_keys_leaves_nothing_pending() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonFileStore::new(dir.path().join("cache.json"));
        store.put_many(vec![entry("a")]).await.unwrap();
        store
            .touch_many(&[entry("zzz").key], Utc::now())
            .await
            .unwrap();
        assert!(!store.has_unsaved_touches().await);
    }

    #[tokio::test]
    async fn purge_persists() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cache.json");
        let store = JsonFileStore::new(&path);

        let mut old = entry("old");
        old.created_at = Utc::now() - TimeDelta::days(20);
        store.put_many(vec![old, entry("new")]).await.unwrap();

        let report = store
            .purge_expired_and_overflow(TimeDelta::days(14), 100, Utc::now())
            .await
            .unwrap();
        assert_eq!(report.expired, 1);
        assert_eq!(JsonFileStore::new(&path).len().await.unwrap(), 1);
    }
}
