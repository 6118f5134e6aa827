//! Cache population, pointer maintenance and validated read-through lookups.
//!
//! The coordinator is the only component that talks to the cache backend.
//! Backend failures never escape it: a failed read is a miss, a failed write
//! or delete is logged and dropped. Every hit is checked against the query
//! that produced it before it is trusted.
//!
//! # Entry Layout
//!
//! For a record with primary key `pk` and cache-eligible spec `f`:
//! - `key(pk_name = pk)` holds the full record snapshot
//! - `key(f = value)` holds a pointer to `pk`
//!
//! A lookup on `f` follows the pointer and repeats the lookup on the primary
//! key, then checks that the record it found still has `f = value`.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use modelcache_core::{
    CorruptionError, FieldValue, ModelCacheResult, ObservedState, Query, Record, StoreError,
};
use once_cell::sync::OnceCell;
use tracing::{debug, warn};

use super::entry::CacheEntry;
use super::extract::FieldValueExtractor;
use super::key::{schema_version, CacheKey, KeyCodec};
use super::observer::ChangeObserver;
use super::traits::{CacheBackend, CacheStats};

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    corruptions: AtomicU64,
    backend_errors: AtomicU64,
}

/// Coordinates cache entries for one record type.
pub struct CacheCoordinator<R, C>
where
    R: Record,
    C: CacheBackend,
{
    backend: Arc<C>,
    codec: KeyCodec,
    observer: ChangeObserver,
    timeout: Duration,
    configured_version: Option<String>,
    version: OnceCell<String>,
    counters: Counters,
    _record: PhantomData<fn() -> R>,
}

impl<R, C> CacheCoordinator<R, C>
where
    R: Record,
    C: CacheBackend,
{
    /// `fields` are normalized cache-eligible specs (see
    /// [`ManagerConfig::normalized_fields`](modelcache_core::ManagerConfig::normalized_fields)).
    pub fn new(
        backend: Arc<C>,
        codec: KeyCodec,
        fields: Vec<String>,
        timeout: Duration,
        version: Option<String>,
    ) -> Self {
        Self {
            backend,
            codec,
            observer: ChangeObserver::new(fields),
            timeout,
            configured_version: version,
            version: OnceCell::new(),
            counters: Counters::default(),
            _record: PhantomData,
        }
    }

    pub fn backend(&self) -> &C {
        &self.backend
    }

    pub fn codec(&self) -> &KeyCodec {
        &self.codec
    }

    pub fn observer(&self) -> &ChangeObserver {
        &self.observer
    }

    pub fn fields(&self) -> &[String] {
        self.observer.fields()
    }

    /// Cache namespace version, derived from `R`'s field set on first use
    /// when none was configured.
    pub fn version(&self) -> &str {
        self.version.get_or_init(|| {
            self.configured_version
                .clone()
                .unwrap_or_else(schema_version::<R>)
        })
    }

    /// Coordinator counters merged with the backend's entry statistics.
    ///
    /// Lookup outcomes and soft failures are counted here only; the backend
    /// contributes entry count, memory and evictions.
    pub fn stats(&self) -> CacheStats {
        let backend = self.backend.stats();
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            corruptions: self.counters.corruptions.load(Ordering::Relaxed),
            backend_errors: self.counters.backend_errors.load(Ordering::Relaxed),
            ..backend
        }
    }

    /// Write pointer entries and the full record, drop pointers the record
    /// has moved away from, then refresh the instance's snapshot.
    pub fn populate(&self, record: &mut R) -> ModelCacheResult<()> {
        let pk = record
            .pk()
            .filter(|pk| !pk.is_null())
            .ok_or(StoreError::MissingPrimaryKey {
                record_type: R::type_name(),
            })?;
        let pk_name = self.codec.pk_name();
        let current = FieldValueExtractor::snapshot(record, self.observer.fields())?;

        for (spec, value) in &current {
            if spec == pk_name {
                continue;
            }
            let key = self.codec.key_for(spec, value);
            self.write(&key, &CacheEntry::pointer(pk.clone()));
        }

        let db = record.state_mut().take_db();
        let full = CacheEntry::record(&*record);
        record.state_mut().db = db;
        let pk_key = self.codec.pk_key(&pk);
        match full {
            Ok(entry) => self.write(&pk_key, &entry),
            Err(e) => {
                self.counters.backend_errors.fetch_add(1, Ordering::Relaxed);
                warn!(
                    record_type = R::type_name(),
                    key = %pk_key,
                    error = %e,
                    "Failed to serialize record for cache"
                );
            }
        }

        for stale in ChangeObserver::stale_fields(&record.state().observed, &current) {
            let key = self.codec.key_for(&stale.spec, &stale.value);
            debug!(record_type = R::type_name(), key = %key, "Dropping stale pointer");
            self.remove(&key);
        }

        record.state_mut().observed = ObservedState::Observed(current);
        Ok(())
    }

    /// Remove every pointer entry of `record` and its full-record entry.
    pub fn invalidate(&self, record: &R) -> ModelCacheResult<()> {
        let pk_name = self.codec.pk_name();
        for spec in self.observer.fields() {
            if spec == pk_name {
                continue;
            }
            let value = FieldValueExtractor::value_for(record, spec)?;
            self.remove(&self.codec.key_for(spec, &value));
        }
        if let Some(pk) = record.pk() {
            self.uncache(&pk);
        }
        Ok(())
    }

    /// Remove only the full-record entry for `pk`.
    pub fn uncache(&self, pk: &FieldValue) {
        self.remove(&self.codec.pk_key(pk));
    }

    /// Resolve `field = value` from the cache.
    ///
    /// `Ok(None)` is a miss; the caller reads the store and calls
    /// [`populate`](Self::populate). A hit that fails validation is returned
    /// as a [`CorruptionError`]. Hits are stamped with `db` as their
    /// affinity marker.
    pub fn lookup(
        &self,
        field: &str,
        value: &FieldValue,
        db: Option<&str>,
    ) -> Result<Option<R>, CorruptionError> {
        self.count(self.resolve(field, value, db))
    }

    /// Resolve a whole query from the cache.
    ///
    /// Same as [`lookup`](Self::lookup) on the query's collapsed
    /// `(field spec, value)` pair, but a hit must also satisfy every
    /// condition of the query on its own. Composite values are joined text,
    /// so two records whose members contain the delimiter can share a key.
    pub fn lookup_query(
        &self,
        query: &Query,
        db: Option<&str>,
    ) -> Result<Option<R>, CorruptionError> {
        let Some((field, value)) = query.lookup_key(self.codec.pk_name()) else {
            return Ok(None);
        };
        let result = self.resolve(&field, &value, db).and_then(|hit| match hit {
            Some(record) => {
                Self::check_conditions(&record, query, || self.codec.key_for(&field, &value))?;
                Ok(Some(record))
            }
            None => Ok(None),
        });
        self.count(result)
    }

    fn check_conditions(
        record: &R,
        query: &Query,
        key: impl FnOnce() -> CacheKey,
    ) -> Result<(), CorruptionError> {
        let mismatch = query.conditions().find(|(name, expected)| {
            !FieldValueExtractor::value_for(record, name)
                .map(|actual| actual.matches(expected))
                .unwrap_or(false)
        });
        match mismatch {
            Some((name, _)) => Err(CorruptionError::PointerMismatch {
                key: key().into_string(),
                field: name.to_string(),
            }),
            None => Ok(()),
        }
    }

    fn count(
        &self,
        result: Result<Option<R>, CorruptionError>,
    ) -> Result<Option<R>, CorruptionError> {
        match &result {
            Ok(Some(_)) => {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
            }
            Ok(None) => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
            }
            Err(e) => {
                self.counters.corruptions.fetch_add(1, Ordering::Relaxed);
                debug!(record_type = R::type_name(), error = %e, "Rejected cache hit");
            }
        }
        result
    }

    fn resolve(
        &self,
        field: &str,
        value: &FieldValue,
        db: Option<&str>,
    ) -> Result<Option<R>, CorruptionError> {
        let pk_name = self.codec.pk_name();
        let key = self.codec.key_for(field, value);
        let Some(entry) = self.read(&key) else {
            debug!(record_type = R::type_name(), key = %key, "Cache miss");
            return Ok(None);
        };

        if field != pk_name {
            let pk = match entry {
                CacheEntry::Pointer { pk } => pk,
                other => {
                    return Err(CorruptionError::UnexpectedType {
                        key: key.into_string(),
                        expected: "pointer".to_string(),
                        found: other.describe(),
                    })
                }
            };
            debug!(record_type = R::type_name(), key = %key, "Following pointer");
            let Some(record) = self.resolve(pk_name, &pk, db)? else {
                return Ok(None);
            };
            let still_matches = FieldValueExtractor::value_for(&record, field)
                .map(|actual| actual.matches(value))
                .unwrap_or(false);
            if !still_matches {
                return Err(CorruptionError::PointerMismatch {
                    key: key.into_string(),
                    field: field.to_string(),
                });
            }
            return Ok(Some(record));
        }

        let mut record = match entry {
            CacheEntry::Record { record_type, body } if record_type == R::type_name() => {
                serde_json::from_value::<R>(body).map_err(|e| CorruptionError::UnexpectedType {
                    key: key.to_string(),
                    expected: format!("record {}", R::type_name()),
                    found: format!("undecodable record body ({})", e),
                })?
            }
            other => {
                return Err(CorruptionError::UnexpectedType {
                    key: key.into_string(),
                    expected: format!("record {}", R::type_name()),
                    found: other.describe(),
                })
            }
        };

        match record.pk() {
            Some(actual) if actual.matches(value) => {}
            actual => {
                return Err(CorruptionError::PrimaryKeyMismatch {
                    key: key.into_string(),
                    expected: value.to_string(),
                    found: actual.unwrap_or(FieldValue::Null).to_string(),
                })
            }
        }

        debug!(record_type = R::type_name(), key = %key, "Cache hit");
        record.state_mut().db = db.map(str::to_string);
        Ok(Some(record))
    }

    fn read(&self, key: &CacheKey) -> Option<CacheEntry> {
        let bytes = match self.backend.get(key.as_str(), self.version()) {
            Ok(bytes) => bytes?,
            Err(e) => {
                self.counters.backend_errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "Cache read failed, treating as miss");
                return None;
            }
        };
        match CacheEntry::decode(&bytes) {
            Ok(entry) => Some(entry),
            Err(e) => {
                self.counters.backend_errors.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, error = %e, "Undecodable cache entry, treating as miss");
                None
            }
        }
    }

    fn write(&self, key: &CacheKey, entry: &CacheEntry) {
        let result = entry
            .encode()
            .and_then(|bytes| {
                self.backend
                    .set(key.as_str(), &bytes, self.timeout, self.version())
            });
        if let Err(e) = result {
            self.counters.backend_errors.fetch_add(1, Ordering::Relaxed);
            warn!(key = %key, error = %e, "Cache write failed");
        }
    }

    fn remove(&self, key: &CacheKey) {
        if let Err(e) = self.backend.delete(key.as_str(), self.version()) {
            self.counters.backend_errors.fetch_add(1, Ordering::Relaxed);
            warn!(key = %key, error = %e, "Cache delete failed");
        }
    }
}
