//! LMDB-backed cache implementation with version isolation.
//!
//! Uses the heed crate (Rust bindings for LMDB) to provide a memory-mapped
//! key-value store that survives process restarts and can be shared by
//! several processes on one host.
//!
//! # Layout
//!
//! - key: `version bytes | 0xFF | cache key bytes`
//! - value: `[expires_at millis: 8 bytes LE][payload]`
//!
//! `0xFF` never occurs in UTF-8 text, so a version prefix can be scanned
//! without matching a longer version that happens to share its bytes.
//!
//! # Thread Safety
//!
//! LMDB provides ACID transactions. The backend uses:
//! - Read transactions for `get`
//! - Write transactions for `set`, `delete`, expiry and `invalidate_version`
//! - Statistics are tracked behind an `RwLock`

use std::path::Path;
use std::sync::RwLock;
use std::time::Duration;

use chrono::{DateTime, Utc};
use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};
use modelcache_core::CacheError;

use super::traits::{expires_at, CacheBackend, CacheStats};

/// Separates the version from the key in stored key bytes.
const VERSION_SEPARATOR: u8 = 0xFF;

/// Length of the expiry header in stored values.
const HEADER_LEN: usize = 8;

/// Error type for LMDB cache operations.
#[derive(Debug, thiserror::Error)]
pub enum LmdbCacheError {
    /// Failed to open or create the LMDB environment.
    #[error("Failed to open LMDB environment: {0}")]
    EnvOpen(String),

    /// Failed to open the database within the environment.
    #[error("Failed to open database: {0}")]
    DbOpen(String),

    /// Transaction error.
    #[error("Transaction error: {0}")]
    Transaction(String),

    /// Stored value too short to carry an expiry header.
    #[error("Corrupt entry header: {0}")]
    Header(String),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Convert LmdbCacheError to CacheError.
impl From<LmdbCacheError> for CacheError {
    fn from(e: LmdbCacheError) -> Self {
        CacheError::Backend {
            reason: e.to_string(),
        }
    }
}

fn txn_error(e: heed::Error) -> LmdbCacheError {
    LmdbCacheError::Transaction(e.to_string())
}

fn encode_key(key: &str, version: &str) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(version.len() + 1 + key.len());
    bytes.extend_from_slice(version.as_bytes());
    bytes.push(VERSION_SEPARATOR);
    bytes.extend_from_slice(key.as_bytes());
    bytes
}

fn version_prefix(version: &str) -> Vec<u8> {
    let mut bytes = version.as_bytes().to_vec();
    bytes.push(VERSION_SEPARATOR);
    bytes
}

fn encode_value(value: &[u8], expires_at: DateTime<Utc>) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(HEADER_LEN + value.len());
    bytes.extend_from_slice(&expires_at.timestamp_millis().to_le_bytes());
    bytes.extend_from_slice(value);
    bytes
}

/// Split a stored value into its expiry and payload.
fn decode_value(bytes: &[u8]) -> Result<(DateTime<Utc>, &[u8]), LmdbCacheError> {
    if bytes.len() < HEADER_LEN {
        return Err(LmdbCacheError::Header(format!(
            "expected at least {} bytes, found {}",
            HEADER_LEN,
            bytes.len()
        )));
    }
    let (header, payload) = bytes.split_at(HEADER_LEN);
    let header: [u8; HEADER_LEN] = header
        .try_into()
        .map_err(|_| LmdbCacheError::Header("invalid expiry".into()))?;
    let expires_at = DateTime::from_timestamp_millis(i64::from_le_bytes(header))
        .unwrap_or(DateTime::<Utc>::MAX_UTC);
    Ok((expires_at, payload))
}

/// LMDB-backed cache with version isolation.
///
/// # Example
///
/// ```ignore
/// use modelcache_storage::cache::{CacheBackend, LmdbCacheBackend};
/// use std::time::Duration;
///
/// let backend = LmdbCacheBackend::new("/tmp/modelcache", 100)?;
/// backend.set("modelcache:Widget:...", b"...", Duration::from_secs(60), "1a2b3c4d")?;
/// let cached = backend.get("modelcache:Widget:...", "1a2b3c4d")?;
/// ```
pub struct LmdbCacheBackend {
    /// The LMDB environment.
    env: Env,
    /// The main database (single unnamed database).
    db: Database<Bytes, Bytes>,
    stats: RwLock<CacheStats>,
}

impl LmdbCacheBackend {
    /// Create a new LMDB cache backend.
    ///
    /// # Arguments
    ///
    /// * `path` - Directory where LMDB files will be stored
    /// * `max_size_mb` - Maximum size of the database in megabytes
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory cannot be created
    /// - LMDB environment cannot be opened
    /// - Database cannot be created
    pub fn new<P: AsRef<Path>>(path: P, max_size_mb: usize) -> Result<Self, LmdbCacheError> {
        std::fs::create_dir_all(&path)?;

        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(max_size_mb * 1024 * 1024)
                .max_dbs(1)
                .open(path.as_ref())
        }
        .map_err(|e| LmdbCacheError::EnvOpen(e.to_string()))?;

        let mut wtxn = env.write_txn().map_err(txn_error)?;
        let db: Database<Bytes, Bytes> = env
            .create_database(&mut wtxn, None)
            .map_err(|e| LmdbCacheError::DbOpen(e.to_string()))?;
        wtxn.commit().map_err(txn_error)?;

        let entry_count = {
            let rtxn = env.read_txn().map_err(txn_error)?;
            db.len(&rtxn).map_err(txn_error)?
        };

        Ok(Self {
            env,
            db,
            stats: RwLock::new(CacheStats {
                entry_count,
                ..Default::default()
            }),
        })
    }

    fn update_stats(&self, f: impl FnOnce(&mut CacheStats)) {
        if let Ok(mut stats) = self.stats.write() {
            f(&mut stats);
        }
    }

    /// Read a live payload. Expired entries are reported separately so the
    /// caller can remove them outside the read transaction.
    fn read(&self, key: &[u8]) -> Result<Lookup, LmdbCacheError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let Some(bytes) = self.db.get(&rtxn, key).map_err(txn_error)? else {
            return Ok(Lookup::Missing);
        };
        let (expires_at, payload) = decode_value(bytes)?;
        if expires_at <= Utc::now() {
            return Ok(Lookup::Expired);
        }
        Ok(Lookup::Live(payload.to_vec()))
    }

    /// Delete a key. Returns whether it existed.
    fn remove(&self, key: &[u8]) -> Result<bool, LmdbCacheError> {
        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let deleted = self.db.delete(&mut wtxn, key).map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;
        if deleted {
            self.update_stats(|s| s.entry_count = s.entry_count.saturating_sub(1));
        }
        Ok(deleted)
    }

    /// Collect every key starting with `prefix`.
    fn collect_keys_with_prefix(&self, prefix: &[u8]) -> Result<Vec<Vec<u8>>, LmdbCacheError> {
        let rtxn = self.env.read_txn().map_err(txn_error)?;
        let iter = self.db.prefix_iter(&rtxn, prefix).map_err(txn_error)?;

        let mut keys = Vec::new();
        for result in iter {
            let (key, _) = result.map_err(txn_error)?;
            keys.push(key.to_vec());
        }
        Ok(keys)
    }

    /// Drop every entry stored under `version`. Returns how many were removed.
    pub fn invalidate_version(&self, version: &str) -> Result<u64, LmdbCacheError> {
        let keys_to_delete = self.collect_keys_with_prefix(&version_prefix(version))?;

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let mut deleted = 0u64;
        for key in &keys_to_delete {
            if self.db.delete(&mut wtxn, key).map_err(txn_error)? {
                deleted += 1;
            }
        }
        wtxn.commit().map_err(txn_error)?;

        self.update_stats(|s| s.entry_count = s.entry_count.saturating_sub(deleted));
        Ok(deleted)
    }
}

enum Lookup {
    Live(Vec<u8>),
    Expired,
    Missing,
}

impl CacheBackend for LmdbCacheBackend {
    fn get(&self, key: &str, version: &str) -> Result<Option<Vec<u8>>, CacheError> {
        let encoded_key = encode_key(key, version);
        match self.read(&encoded_key) {
            Ok(Lookup::Live(payload)) => {
                self.update_stats(|s| s.hits += 1);
                Ok(Some(payload))
            }
            Ok(Lookup::Expired) => {
                if self.remove(&encoded_key)? {
                    self.update_stats(|s| s.evictions += 1);
                }
                self.update_stats(|s| s.misses += 1);
                Ok(None)
            }
            Ok(Lookup::Missing) => {
                self.update_stats(|s| s.misses += 1);
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    fn set(
        &self,
        key: &str,
        value: &[u8],
        timeout: Duration,
        version: &str,
    ) -> Result<(), CacheError> {
        let encoded_key = encode_key(key, version);
        let full_bytes = encode_value(value, expires_at(timeout));

        let mut wtxn = self.env.write_txn().map_err(txn_error)?;
        let is_new = self
            .db
            .get(&wtxn, &encoded_key)
            .map_err(txn_error)?
            .is_none();
        self.db
            .put(&mut wtxn, &encoded_key, &full_bytes)
            .map_err(txn_error)?;
        wtxn.commit().map_err(txn_error)?;

        self.update_stats(|s| {
            if is_new {
                s.entry_count += 1;
            }
            s.memory_bytes += full_bytes.len() as u64;
        });
        Ok(())
    }

    fn delete(&self, key: &str, version: &str) -> Result<(), CacheError> {
        self.remove(&encode_key(key, version))?;
        Ok(())
    }

    fn stats(&self) -> CacheStats {
        self.stats.read().map(|s| s.clone()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::coordinator::CacheCoordinator;
    use crate::cache::key::KeyCodec;
    use crate::cache::test_fixtures::Gadget;
    use modelcache_core::FieldValue;
    use std::sync::Arc;
    use tempfile::TempDir;

    const TTL: Duration = Duration::from_secs(60);

    fn create_test_backend() -> (LmdbCacheBackend, TempDir) {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        let backend =
            LmdbCacheBackend::new(temp_dir.path(), 10).expect("backend creation should succeed");
        (backend, temp_dir)
    }

    #[test]
    fn test_new_backend() {
        let (backend, _temp_dir) = create_test_backend();
        assert_eq!(backend.stats().entry_count, 0);
    }

    #[test]
    fn test_set_and_get() {
        let (backend, _temp_dir) = create_test_backend();
        backend
            .set("modelcache:Widget:abc", b"payload", TTL, "v1")
            .expect("set should succeed");

        let cached = backend
            .get("modelcache:Widget:abc", "v1")
            .expect("get should succeed");
        assert_eq!(cached, Some(b"payload".to_vec()));
    }

    #[test]
    fn test_get_nonexistent() {
        let (backend, _temp_dir) = create_test_backend();
        let cached = backend.get("missing", "v1").expect("get should succeed");
        assert!(cached.is_none());
    }

    #[test]
    fn test_delete() {
        let (backend, _temp_dir) = create_test_backend();
        backend.set("k", b"x", TTL, "v1").expect("set should succeed");
        backend.delete("k", "v1").expect("delete should succeed");
        assert!(backend.get("k", "v1").expect("get should succeed").is_none());

        // deleting again is not an error
        backend.delete("k", "v1").expect("delete should succeed");
        assert_eq!(backend.stats().entry_count, 0);
    }

    #[test]
    fn test_version_isolation() {
        let (backend, _temp_dir) = create_test_backend();
        backend.set("k", b"one", TTL, "v1").expect("set should succeed");

        assert!(backend.get("k", "v2").expect("get should succeed").is_none());
        assert_eq!(
            backend.get("k", "v1").expect("get should succeed"),
            Some(b"one".to_vec())
        );
    }

    #[test]
    fn test_invalidate_version() {
        let (backend, _temp_dir) = create_test_backend();
        for key in ["a", "b", "c", "d", "e"] {
            backend.set(key, b"x", TTL, "v1").expect("set should succeed");
        }
        backend.set("a", b"x", TTL, "v10").expect("set should succeed");

        let deleted = backend
            .invalidate_version("v1")
            .expect("invalidate_version should succeed");
        assert_eq!(deleted, 5);
        assert!(backend.get("a", "v10").expect("get should succeed").is_some());
    }

    #[test]
    fn test_expired_entry_is_a_miss() {
        let (backend, _temp_dir) = create_test_backend();
        backend
            .set("k", b"x", Duration::ZERO, "v1")
            .expect("set should succeed");

        assert!(backend.get("k", "v1").expect("get should succeed").is_none());
        let stats = backend.stats();
        assert_eq!(stats.evictions, 1);
        assert_eq!(stats.entry_count, 0);
    }

    #[test]
    fn test_stats() {
        let (backend, _temp_dir) = create_test_backend();
        let _ = backend.get("k", "v1");
        backend.set("k", b"x", TTL, "v1").expect("set should succeed");
        let _ = backend.get("k", "v1");
        let _ = backend.get("k", "v1");

        let stats = backend.stats();
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.hits, 2);
        assert_eq!(stats.entry_count, 1);
    }

    #[test]
    fn test_overwrite() {
        let (backend, _temp_dir) = create_test_backend();
        backend.set("k", b"old", TTL, "v1").expect("set should succeed");
        backend.set("k", b"new", TTL, "v1").expect("set should succeed");

        assert_eq!(
            backend.get("k", "v1").expect("get should succeed"),
            Some(b"new".to_vec())
        );
        assert_eq!(backend.stats().entry_count, 1);
    }

    #[test]
    fn test_reopen_keeps_entries() {
        let temp_dir = TempDir::new().expect("TempDir creation should succeed");
        {
            let backend = LmdbCacheBackend::new(temp_dir.path(), 10).expect("open");
            backend.set("k", b"kept", TTL, "v1").expect("set should succeed");
        }
        let backend = LmdbCacheBackend::new(temp_dir.path(), 10).expect("reopen");
        assert_eq!(backend.stats().entry_count, 1);
        assert_eq!(
            backend.get("k", "v1").expect("get should succeed"),
            Some(b"kept".to_vec())
        );
    }

    fn put_raw(backend: &LmdbCacheBackend, key: &str, version: &str, bytes: &[u8]) {
        let mut wtxn = backend.env.write_txn().expect("write txn should open");
        backend
            .db
            .put(&mut wtxn, &encode_key(key, version), bytes)
            .expect("put should succeed");
        wtxn.commit().expect("commit should succeed");
    }

    #[test]
    fn test_invalidate_version_leaves_other_versions() {
        let (backend, _temp_dir) = create_test_backend();
        backend.set("a", b"x", TTL, "v1").expect("set should succeed");
        backend.set("a", b"y", TTL, "v2").expect("set should succeed");

        assert_eq!(backend.invalidate_version("v3").expect("invalidate"), 0);
        assert_eq!(backend.invalidate_version("v1").expect("invalidate"), 1);
        assert_eq!(backend.stats().entry_count, 1);
        assert_eq!(
            backend.get("a", "v2").expect("get should succeed"),
            Some(b"y".to_vec())
        );
    }

    #[test]
    fn test_failed_read_is_counted_once() {
        let (backend, _temp_dir) = create_test_backend();
        let backend = Arc::new(backend);
        let coord: CacheCoordinator<Gadget, LmdbCacheBackend> = CacheCoordinator::new(
            Arc::clone(&backend),
            KeyCodec::for_record::<Gadget>("modelcache"),
            vec!["sku".to_string()],
            TTL,
            Some("v1".to_string()),
        );
        let pk_key = coord.codec().pk_key(&FieldValue::Int(1));
        put_raw(&backend, pk_key.as_str(), "v1", b"abc");

        assert!(backend.get(pk_key.as_str(), "v1").is_err());
        assert_eq!(backend.stats().backend_errors, 0);
        assert_eq!(backend.stats().misses, 0);

        assert!(coord.lookup("id", &FieldValue::Int(1), None).unwrap().is_none());
        let stats = coord.stats();
        assert_eq!(stats.backend_errors, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn test_short_value_is_backend_error() {
        let err = decode_value(b"abc").unwrap_err();
        assert!(matches!(err, LmdbCacheError::Header(_)));
        let cache_err: CacheError = err.into();
        assert!(matches!(cache_err, CacheError::Backend { .. }));
    }
}
