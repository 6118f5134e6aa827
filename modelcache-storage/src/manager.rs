//! Cached record manager.
//!
//! [`CachedManager`] is the entry point consumers call. It decides whether a
//! read can be served by the cache, applies the corruption policy, and runs
//! the lifecycle hooks around store writes.
//!
//! # Read Path
//!
//! 1. The query collapses to a `(field spec, value)` pair.
//! 2. Specs that are not cache-eligible go straight to the store.
//! 3. A hit that satisfies every condition of the query is returned as-is.
//! 4. A miss reads the store and populates the cache.
//! 5. A corrupt hit is an error in strict mode. Otherwise the store is read
//!    and the cache is only rewritten when `repopulate_on_corruption` is set.

use std::marker::PhantomData;
use std::sync::Arc;

use modelcache_core::{FieldValue, ManagerConfig, ModelCacheResult, Query, Record};
use tracing::{debug, warn};

use crate::cache::{CacheBackend, CacheCoordinator, CacheStats, KeyCodec};
use crate::RecordStore;

/// A record or a bare primary key, accepted by
/// [`CachedManager::uncache_object`].
#[derive(Debug, Clone)]
pub enum PrimaryKeyRef<'a, R> {
    Record(&'a R),
    Pk(FieldValue),
}

impl<'a, R: Record> PrimaryKeyRef<'a, R> {
    fn pk(&self) -> Option<FieldValue> {
        match self {
            PrimaryKeyRef::Record(record) => record.pk(),
            PrimaryKeyRef::Pk(pk) => Some(pk.clone()),
        }
    }
}

impl<'a, R> From<&'a R> for PrimaryKeyRef<'a, R> {
    fn from(record: &'a R) -> Self {
        PrimaryKeyRef::Record(record)
    }
}

impl<'a, R> From<FieldValue> for PrimaryKeyRef<'a, R> {
    fn from(pk: FieldValue) -> Self {
        PrimaryKeyRef::Pk(pk)
    }
}

/// Read-through, write-through manager for one record type.
pub struct CachedManager<R, S, C>
where
    R: Record,
    S: RecordStore<R>,
    C: CacheBackend,
{
    store: Arc<S>,
    coordinator: CacheCoordinator<R, C>,
    config: ManagerConfig,
    _record: PhantomData<fn() -> R>,
}

impl<R, S, C> CachedManager<R, S, C>
where
    R: Record,
    S: RecordStore<R>,
    C: CacheBackend,
{
    /// Build a manager. Fails fast if the config names fields `R` does not
    /// have or carries invalid values.
    pub fn new(store: Arc<S>, backend: Arc<C>, config: ManagerConfig) -> ModelCacheResult<Self> {
        let fields = config.normalized_fields::<R>()?;
        let coordinator = CacheCoordinator::new(
            backend,
            KeyCodec::for_record::<R>(config.key_prefix.clone()),
            fields,
            config.cache_timeout(),
            config.cache_version.clone(),
        );
        debug!(
            record_type = R::type_name(),
            fields = ?coordinator.fields(),
            strict = config.strict,
            "Cached manager ready"
        );
        Ok(Self {
            store,
            coordinator,
            config,
            _record: PhantomData,
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn config(&self) -> &ManagerConfig {
        &self.config
    }

    pub fn coordinator(&self) -> &CacheCoordinator<R, C> {
        &self.coordinator
    }

    pub fn cache_version(&self) -> &str {
        self.coordinator.version()
    }

    pub fn stats(&self) -> CacheStats {
        self.coordinator.stats()
    }

    /// Whether any field is cache-eligible. When false every hook is a no-op
    /// and every read goes to the store.
    pub fn is_caching(&self) -> bool {
        !self.coordinator.fields().is_empty()
    }

    /// Read from the store, bypassing the cache.
    pub fn get(&self, query: &Query) -> ModelCacheResult<R> {
        self.read_store(query)
    }

    pub fn get_with(&self, query: &Query, use_cache: bool) -> ModelCacheResult<R> {
        if use_cache {
            self.get_from_cache(query)
        } else {
            self.get(query)
        }
    }

    /// Read through the cache when the query addresses a cache-eligible
    /// field, otherwise read from the store.
    pub fn get_from_cache(&self, query: &Query) -> ModelCacheResult<R> {
        if !self.is_caching() {
            return self.read_store(query);
        }
        let pk_name = self.coordinator.codec().pk_name();
        let Some((field, _)) = query.lookup_key(pk_name) else {
            return self.read_store(query);
        };
        if !self.coordinator.fields().iter().any(|f| *f == field) {
            debug!(
                record_type = R::type_name(),
                lookup = %query.describe(),
                "Lookup is not cache-eligible"
            );
            return self.read_store(query);
        }

        let affinity = self.store.db_for_read(query);
        match self.coordinator.lookup_query(query, affinity.as_deref()) {
            Ok(Some(mut record)) => {
                self.on_init(&mut record)?;
                Ok(record)
            }
            Ok(None) => {
                let mut record = self.read_store(query)?;
                self.coordinator.populate(&mut record)?;
                Ok(record)
            }
            Err(corruption) if self.config.strict => Err(corruption.into()),
            Err(corruption) => {
                warn!(
                    record_type = R::type_name(),
                    error = %corruption,
                    "Cache corruption, falling back to store"
                );
                let mut record = self.read_store(query)?;
                if self.config.repopulate_on_corruption {
                    self.coordinator.populate(&mut record)?;
                }
                Ok(record)
            }
        }
    }

    /// Write through the store, then refresh the cache.
    pub fn save(&self, record: &mut R) -> ModelCacheResult<()> {
        self.store.save(record)?;
        self.after_save(record)
    }

    /// Delete from the store, then drop the record's cache entries.
    pub fn delete(&self, record: &R) -> ModelCacheResult<()> {
        self.store.delete(record)?;
        self.after_delete(record)
    }

    /// Instance-initialized hook. Call whenever a record is materialized
    /// outside this manager.
    pub fn on_init(&self, record: &mut R) -> ModelCacheResult<()> {
        if self.is_caching() {
            self.coordinator.observer().on_init(record)?;
        }
        Ok(())
    }

    /// Post-save hook.
    pub fn after_save(&self, record: &mut R) -> ModelCacheResult<()> {
        if self.is_caching() {
            self.coordinator.populate(record)?;
        }
        Ok(())
    }

    /// Post-delete hook.
    pub fn after_delete(&self, record: &R) -> ModelCacheResult<()> {
        if self.is_caching() {
            self.coordinator.invalidate(record)?;
        }
        Ok(())
    }

    /// Drop the full-record entry for a record or primary key. Pointer entries
    /// are left in place; a lookup through them misses and repopulates.
    pub fn uncache_object<'a>(&self, target: impl Into<PrimaryKeyRef<'a, R>>) {
        if let Some(pk) = target.into().pk() {
            self.coordinator.uncache(&pk);
        }
    }

    fn read_store(&self, query: &Query) -> ModelCacheResult<R> {
        let mut record = self.store.get(query)?;
        self.on_init(&mut record)?;
        Ok(record)
    }
}
