//! Cache backend trait and statistics.
//!
//! This module defines the contract a distributed key/value cache must meet
//! to sit behind the cache coordinator.

use std::time::Duration;

use chrono::{DateTime, Utc};
use modelcache_core::CacheError;

/// Cache backend trait for pluggable cache implementations.
///
/// This trait abstracts over different cache backends (e.g., LMDB, Redis,
/// in-memory). Implementations must be thread-safe and support concurrent
/// access. Calls may block on I/O; there are no built-in timeouts or retries.
///
/// # Keys and Versions
///
/// Keys and versions are opaque strings. The version partitions the key
/// space: the same key under two versions names two distinct entries, which
/// allows bulk invalidation by rotating the version string.
pub trait CacheBackend: Send + Sync {
    /// Get a value. `Ok(None)` is a miss, including an expired entry.
    fn get(&self, key: &str, version: &str) -> Result<Option<Vec<u8>>, CacheError>;

    /// Store a value that expires after `timeout`.
    fn set(
        &self,
        key: &str,
        value: &[u8],
        timeout: Duration,
        version: &str,
    ) -> Result<(), CacheError>;

    /// Delete a value. Deleting a missing key is not an error.
    fn delete(&self, key: &str, version: &str) -> Result<(), CacheError>;

    /// Get cache statistics.
    fn stats(&self) -> CacheStats;
}

/// Statistics about cache usage.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of cache hits.
    pub hits: u64,
    /// Number of cache misses.
    pub misses: u64,
    /// Number of hits rejected as corrupt.
    pub corruptions: u64,
    /// Number of backend calls that failed and were treated as soft failures.
    pub backend_errors: u64,
    /// Number of entries currently in cache.
    pub entry_count: u64,
    /// Approximate memory usage in bytes.
    pub memory_bytes: u64,
    /// Number of entries dropped because they expired.
    pub evictions: u64,
}

impl CacheStats {
    /// Calculate the hit rate (0.0 to 1.0).
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Absolute expiry for an entry written now with `timeout`.
pub(crate) fn expires_at(timeout: Duration) -> DateTime<Utc> {
    chrono::Duration::from_std(timeout)
        .ok()
        .and_then(|ttl| Utc::now().checked_add_signed(ttl))
        .unwrap_or(DateTime::<Utc>::MAX_UTC)
}
