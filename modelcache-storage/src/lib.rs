//! modelcache Storage - Record Store Trait, Cache Layer and Cached Manager
//!
//! Defines the source-of-truth store abstraction, an in-memory reference
//! store, the cache subsystem, and [`CachedManager`], the public entry point
//! that ties a store and a cache backend together.

pub mod cache;
pub mod manager;

pub use cache::{
    make_key, schema_version, CacheBackend, CacheCoordinator, CacheEntry, CacheKey, CacheStats,
    ChangeObserver, FieldValueExtractor, InMemoryCacheBackend, KeyCodec, LmdbCacheBackend,
    LmdbCacheError, StaleField,
};
pub use manager::{CachedManager, PrimaryKeyRef};

use modelcache_core::{
    ConfigError, FieldValue, ModelCacheResult, Query, Record, StoreError, PK_ALIAS,
};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, RwLock};

/// Affinity stamped on records read from an [`InMemoryStore`] by default.
pub const DEFAULT_DB_ALIAS: &str = "default";

// ============================================================================
// RECORD STORE TRAIT
// ============================================================================

/// Source-of-truth store for one record type.
///
/// Field introspection comes from the record type itself
/// ([`Record::fields`]). Implementations do not touch the cache; the
/// [`CachedManager`] runs the lifecycle hooks around these calls.
pub trait RecordStore<R: Record>: Send + Sync {
    /// Fetch exactly one record matching every condition of `query`.
    ///
    /// No match is [`StoreError::NotFound`]; more than one is
    /// [`StoreError::MultipleReturned`].
    fn get(&self, query: &Query) -> ModelCacheResult<R>;

    /// Insert or update. Assigns a primary key to unsaved records.
    fn save(&self, record: &mut R) -> ModelCacheResult<()>;

    fn delete(&self, record: &R) -> ModelCacheResult<()>;

    /// Backend/session affinity a read of `query` would be routed to.
    fn db_for_read(&self, _query: &Query) -> Option<String> {
        None
    }
}

// ============================================================================
// IN-MEMORY STORE
// ============================================================================

/// In-memory record store keyed by the canonical text of the primary key.
///
/// Unsaved records get sequential integer keys. Stored copies never carry
/// transient state; records handed out are stamped with the store's alias.
#[derive(Debug)]
pub struct InMemoryStore<R: Record> {
    records: Arc<RwLock<BTreeMap<String, R>>>,
    next_id: AtomicI64,
    alias: String,
    reads: AtomicUsize,
}

impl<R: Record> Default for InMemoryStore<R> {
    fn default() -> Self {
        Self::with_alias(DEFAULT_DB_ALIAS)
    }
}

impl<R: Record> InMemoryStore<R> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_alias(alias: impl Into<String>) -> Self {
        Self {
            records: Arc::new(RwLock::new(BTreeMap::new())),
            next_id: AtomicI64::new(1),
            alias: alias.into(),
            reads: AtomicUsize::new(0),
        }
    }

    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Number of `get` calls served so far.
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.records.read().map(|r| r.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        if let Ok(mut records) = self.records.write() {
            records.clear();
        }
    }

    fn resolve_field(name: &str) -> Result<&'static str, ConfigError> {
        R::field(name)
            .map(|f| f.name)
            .ok_or_else(|| ConfigError::FieldNotFound {
                record_type: R::type_name(),
                field: name.to_string(),
            })
    }

    fn stored_copy(record: &R) -> R {
        let mut copy = record.clone();
        *copy.state_mut() = Default::default();
        copy
    }
}

impl<R: Record> RecordStore<R> for InMemoryStore<R> {
    fn get(&self, query: &Query) -> ModelCacheResult<R> {
        self.reads.fetch_add(1, Ordering::SeqCst);

        let conditions = query
            .conditions()
            .map(|(name, value)| Ok((Self::resolve_field(name)?, value)))
            .collect::<Result<Vec<_>, ConfigError>>()?;

        let records = self.records.read().map_err(|_| StoreError::LockPoisoned)?;
        let mut matches = records.values().filter(|record| {
            conditions.iter().all(|(name, expected)| {
                record
                    .field_value(name)
                    .map_or(false, |actual| actual.matches(expected))
            })
        });

        let found = matches.next().cloned();
        let extra = matches.count();
        match found {
            None => Err(StoreError::NotFound {
                record_type: R::type_name(),
                lookup: query.describe(),
            }
            .into()),
            Some(_) if extra > 0 => Err(StoreError::MultipleReturned {
                record_type: R::type_name(),
                lookup: query.describe(),
                count: extra + 1,
            }
            .into()),
            Some(mut record) => {
                record.state_mut().db = Some(self.alias.clone());
                Ok(record)
            }
        }
    }

    fn save(&self, record: &mut R) -> ModelCacheResult<()> {
        let mut records = self.records.write().map_err(|_| StoreError::LockPoisoned)?;

        let pk = match record.pk().filter(|pk| !pk.is_null()) {
            Some(pk) => {
                if let Some(id) = pk.as_integer() {
                    self.next_id.fetch_max(id.saturating_add(1), Ordering::SeqCst);
                }
                pk
            }
            None => {
                let id = self
                    .next_id
                    .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |id| id.checked_add(1))
                    .map_err(|_| StoreError::Backend {
                        reason: format!("{} key sequence exhausted", R::type_name()),
                    })?;
                let id = FieldValue::Int(id);
                record.set_pk(id.clone());
                id
            }
        };

        records.insert(pk.to_string(), Self::stored_copy(record));
        record.state_mut().db = Some(self.alias.clone());
        Ok(())
    }

    fn delete(&self, record: &R) -> ModelCacheResult<()> {
        let pk = record.pk().ok_or(StoreError::MissingPrimaryKey {
            record_type: R::type_name(),
        })?;
        let mut records = self.records.write().map_err(|_| StoreError::LockPoisoned)?;
        match records.remove(&pk.to_string()) {
            Some(_) => Ok(()),
            None => Err(StoreError::NotFound {
                record_type: R::type_name(),
                lookup: PK_ALIAS.to_string(),
            }
            .into()),
        }
    }

    fn db_for_read(&self, _query: &Query) -> Option<String> {
        Some(self.alias.clone())
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::test_fixtures::Gadget;
    use modelcache_core::ModelCacheError;

    fn seeded() -> InMemoryStore<Gadget> {
        let store = InMemoryStore::new();
        for (sku, name) in [("A1", "Bolt"), ("B1", "Nut"), ("C1", "Bolt")] {
            let mut gadget = Gadget::new(None, sku, name);
            store.save(&mut gadget).unwrap();
        }
        store
    }

    #[test]
    fn test_save_assigns_sequential_keys() {
        let store = seeded();
        assert_eq!(store.len(), 3);
        let gadget = store.get(&Query::by("sku", "C1")).unwrap();
        assert_eq!(gadget.id, Some(3));
    }

    #[test]
    fn test_explicit_key_advances_sequence() {
        let store: InMemoryStore<Gadget> = InMemoryStore::new();
        let mut first = Gadget::new(Some(10), "A1", "Bolt");
        store.save(&mut first).unwrap();
        let mut second = Gadget::new(None, "B1", "Nut");
        store.save(&mut second).unwrap();
        assert_eq!(second.id, Some(11));
    }

    #[test]
    fn test_largest_explicit_key() {
        let store: InMemoryStore<Gadget> = InMemoryStore::new();
        let mut gadget = Gadget::new(Some(i64::MAX), "A1", "Bolt");
        store.save(&mut gadget).unwrap();

        assert_eq!(gadget.id, Some(i64::MAX));
        assert_eq!(store.get(&Query::pk(i64::MAX)).unwrap().sku, "A1");
        assert_eq!(store.next_id.load(Ordering::SeqCst), i64::MAX);

        let mut unsaved = Gadget::new(None, "B1", "Nut");
        assert!(matches!(
            store.save(&mut unsaved).unwrap_err(),
            ModelCacheError::Store(StoreError::Backend { .. })
        ));
        assert_eq!(unsaved.id, None);
        assert_eq!(store.get(&Query::pk(i64::MAX)).unwrap().sku, "A1");
    }

    #[test]
    fn test_get_by_pk_alias_and_name() {
        let store = seeded();
        assert_eq!(store.get(&Query::pk(2)).unwrap().sku, "B1");
        assert_eq!(store.get(&Query::by("id", 2)).unwrap().sku, "B1");
        assert_eq!(store.get(&Query::pk("2")).unwrap().sku, "B1");
    }

    #[test]
    fn test_get_stamps_alias() {
        let store = seeded();
        let gadget = store.get(&Query::by("sku", "A1")).unwrap();
        assert_eq!(gadget.state.db.as_deref(), Some(DEFAULT_DB_ALIAS));
        assert_eq!(store.read_count(), 1);
    }

    #[test]
    fn test_get_not_found() {
        let store = seeded();
        let err = store.get(&Query::by("sku", "Z9")).unwrap_err();
        assert!(err.is_not_found());
    }

    #[test]
    fn test_get_multiple_returned() {
        let store = seeded();
        let err = store.get(&Query::by("name", "Bolt")).unwrap_err();
        assert!(matches!(
            err,
            ModelCacheError::Store(StoreError::MultipleReturned { count: 2, .. })
        ));
    }

    #[test]
    fn test_get_multiple_conditions() {
        let store = seeded();
        let query = Query::by("name", "Bolt").and("sku", "C1");
        assert_eq!(store.get(&query).unwrap().id, Some(3));
    }

    #[test]
    fn test_get_unknown_field() {
        let store = seeded();
        let err = store.get(&Query::by("colour", "red")).unwrap_err();
        assert!(matches!(
            err,
            ModelCacheError::Config(ConfigError::FieldNotFound { .. })
        ));
    }

    #[test]
    fn test_stored_copy_drops_transient_state() {
        let store: InMemoryStore<Gadget> = InMemoryStore::with_alias("replica");
        let mut gadget = Gadget::new(None, "A1", "Bolt");
        gadget.state.db = Some("elsewhere".to_string());
        store.save(&mut gadget).unwrap();
        assert_eq!(gadget.state.db.as_deref(), Some("replica"));

        let loaded = store.get(&Query::pk(1)).unwrap();
        assert_eq!(loaded.state.db.as_deref(), Some("replica"));
        assert!(loaded.state.observed.snapshot().is_none());
    }

    #[test]
    fn test_update_in_place() {
        let store = seeded();
        let mut gadget = store.get(&Query::pk(1)).unwrap();
        gadget.sku = "A2".to_string();
        store.save(&mut gadget).unwrap();

        assert_eq!(store.len(), 3);
        assert!(store.get(&Query::by("sku", "A1")).unwrap_err().is_not_found());
        assert_eq!(store.get(&Query::by("sku", "A2")).unwrap().id, Some(1));
    }

    #[test]
    fn test_delete() {
        let store = seeded();
        let gadget = store.get(&Query::pk(1)).unwrap();
        store.delete(&gadget).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.delete(&gadget).unwrap_err().is_not_found());

        let unsaved = Gadget::new(None, "X", "Y");
        assert!(matches!(
            store.delete(&unsaved).unwrap_err(),
            ModelCacheError::Store(StoreError::MissingPrimaryKey { .. })
        ));
    }
}
