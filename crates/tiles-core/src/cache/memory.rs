//! In-process cache store.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use parking_lot::Mutex;

use super::{CacheEntry, CacheStore, PurgeReport, Result};
use crate::key::CacheKey;

/// A [`CacheStore`] backed by a `HashMap`. Nothing survives the process;
/// used by tests and ephemeral runs.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<CacheKey, CacheEntry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn get_many(&self, keys: &[CacheKey]) -> Result<HashMap<CacheKey, CacheEntry>> {
        Ok(super::select(&self.entries.lock(), keys))
    }

    async fn put_many(&self, entries: Vec<CacheEntry>) -> Result<()> {
        let mut map = self.entries.lock();
        for entry in entries {
            map.insert(entry.key.clone(), entry);
        }
        Ok(())
    }

    async fn touch_many(&self, keys: &[CacheKey], at: DateTime<Utc>) -> Result<()> {
        super::touch(&mut self.entries.lock(), keys, at);
        Ok(())
    }

    async fn purge_expired_and_overflow(
        &self,
        ttl: TimeDelta,
        max_entries: usize,
        now: DateTime<Utc>,
    ) -> Result<PurgeReport> {
        Ok(super::purge_map(&mut self.entries.lock(), ttl, max_entries, now))
    }

    async fn len(&self) -> Result<usize> {
        Ok(self.entries.lock().len())
    }

    async fn clear(&self) -> Result<()> {
        self.entries.lock().clear();
        Ok(())
    }

    async fn dump(&self, limit: usize) -> Result<Vec<CacheEntry>> {
        Ok(super::newest_first(&self.entries.lock(), limit))
    }
}
