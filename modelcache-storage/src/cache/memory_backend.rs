//! Process-local cache backend.
//!
//! Entries live in a `HashMap` behind an `RwLock`, keyed by `(version, key)`.
//! Expired entries are dropped lazily when they are read and counted as
//! evictions.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use modelcache_core::CacheError;

use super::traits::{expires_at, CacheBackend, CacheStats};

#[derive(Debug, Clone)]
struct Entry {
    value: Vec<u8>,
    expires_at: DateTime<Utc>,
}

impl Entry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }
}

type EntryMap = HashMap<(String, String), Entry>;

/// In-memory [`CacheBackend`] for tests and single-process deployments.
#[derive(Debug, Default)]
pub struct InMemoryCacheBackend {
    entries: RwLock<EntryMap>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

fn poisoned() -> CacheError {
    CacheError::Backend {
        reason: "cache lock poisoned".to_string(),
    }
}

impl InMemoryCacheBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries, expired ones included.
    pub fn len(&self) -> usize {
        self.entries.read().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a live entry exists, without touching hit statistics.
    pub fn contains(&self, key: &str, version: &str) -> bool {
        let now = Utc::now();
        self.entries
            .read()
            .map(|entries| {
                entries
                    .get(&(version.to_string(), key.to_string()))
                    .map_or(false, |entry| !entry.is_expired(now))
            })
            .unwrap_or(false)
    }

    pub fn clear(&self) {
        if let Ok(mut entries) = self.entries.write() {
            entries.clear();
        }
    }

    /// Drop every entry stored under `version`. Returns how many were removed.
    pub fn invalidate_version(&self, version: &str) -> Result<u64, CacheError> {
        let mut entries = self.entries.write().map_err(|_| poisoned())?;
        let before = entries.len();
        entries.retain(|(v, _), _| v != version);
        Ok((before - entries.len()) as u64)
    }
}

impl CacheBackend for InMemoryCacheBackend {
    fn get(&self, key: &str, version: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let map_key = (version.to_string(), key.to_string());
        let now = Utc::now();

        let expired = {
            let entries = self.entries.read().map_err(|_| poisoned())?;
            match entries.get(&map_key) {
                Some(entry) if !entry.is_expired(now) => {
                    self.hits.fetch_add(1, Ordering::Relaxed);
                    return Ok(Some(entry.value.clone()));
                }
                Some(_) => true,
                None => false,
            }
        };

        if expired {
            let mut entries = self.entries.write().map_err(|_| poisoned())?;
            if entries
                .get(&map_key)
                .map_or(false, |entry| entry.is_expired(now))
            {
                entries.remove(&map_key);
                self.evictions.fetch_add(1, Ordering::Relaxed);
            }
        }

        self.misses.fetch_add(1, Ordering::Relaxed);
        Ok(None)
    }

    fn set(
        &self,
        key: &str,
        value: &[u8],
        timeout: Duration,
        version: &str,
    ) -> Result<(), CacheError> {
        let entry = Entry {
            value: value.to_vec(),
            expires_at: expires_at(timeout),
        };
        self.entries
            .write()
            .map_err(|_| poisoned())?
            .insert((version.to_string(), key.to_string()), entry);
        Ok(())
    }

    fn delete(&self, key: &str, version: &str) -> Result<(), CacheError> {
        self.entries
            .write()
            .map_err(|_| poisoned())?
            .remove(&(version.to_string(), key.to_string()));
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        let (entry_count, memory_bytes) = self
            .entries
            .read()
            .map(|entries| {
                let bytes = entries
                    .iter()
                    .map(|((v, k), e)| (v.len() + k.len() + e.value.len()) as u64)
                    .sum();
                (entries.len() as u64, bytes)
            })
            .unwrap_or_default();

        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entry_count,
            memory_bytes,
            evictions: self.evictions.load(Ordering::Relaxed),
            ..Default::default()
        }
    }
}
