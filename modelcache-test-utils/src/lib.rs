//! modelcache Test Utilities
//!
//! Shared test infrastructure for the modelcache workspace:
//! - Record types with static field tables
//! - A fault-injecting cache backend
//! - Proptest generators
//! - Test fixtures for common scenarios
//! - Custom assertions for modelcache-specific validation

pub use modelcache_storage::{
    CacheBackend, CacheEntry, CacheStats, CachedManager, InMemoryCacheBackend, InMemoryStore,
    LmdbCacheBackend, RecordStore,
};

pub use modelcache_core::{
    CacheError, CacheField, ConfigError, CorruptionError, FieldDescriptor, FieldValue,
    ManagerConfig, ModelCacheError, ModelCacheResult, Query, Record, RecordState, StoreError,
};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;
use uuid::Uuid;

/// Install a `fmt` subscriber filtered by `RUST_LOG`. Safe to call from
/// every test; only the first call installs anything.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

// ============================================================================
// RECORD TYPES
// ============================================================================

/// Integer-keyed record with a unique `sku`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Widget {
    pub id: Option<i64>,
    pub sku: String,
    pub name: String,
    #[serde(skip)]
    pub state: RecordState,
}

static WIDGET_FIELDS: [FieldDescriptor; 3] = [
    FieldDescriptor::primary("id"),
    FieldDescriptor::new("sku"),
    FieldDescriptor::new("name"),
];

impl Widget {
    pub fn new(sku: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: None,
            sku: sku.into(),
            name: name.into(),
            state: RecordState::default(),
        }
    }
}

impl Record for Widget {
    fn type_name() -> &'static str {
        "Widget"
    }

    fn fields() -> &'static [FieldDescriptor] {
        &WIDGET_FIELDS
    }

    fn pk(&self) -> Option<FieldValue> {
        self.id.map(FieldValue::Int)
    }

    fn set_pk(&mut self, pk: FieldValue) {
        self.id = pk.as_integer();
    }

    fn field_value(&self, name: &str) -> Option<FieldValue> {
        match name {
            "id" => Some(self.id.into()),
            "sku" => Some(self.sku.as_str().into()),
            "name" => Some(self.name.as_str().into()),
            _ => None,
        }
    }

    fn state(&self) -> &RecordState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RecordState {
        &mut self.state
    }
}

/// Record keyed by a two-letter text code.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Country {
    pub code: String,
    pub name: String,
    #[serde(skip)]
    pub state: RecordState,
}

static COUNTRY_FIELDS: [FieldDescriptor; 2] = [
    FieldDescriptor::primary("code"),
    FieldDescriptor::new("name"),
];

impl Country {
    pub fn new(code: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            name: name.into(),
            state: RecordState::default(),
        }
    }
}

impl Record for Country {
    fn type_name() -> &'static str {
        "Country"
    }

    fn fields() -> &'static [FieldDescriptor] {
        &COUNTRY_FIELDS
    }

    fn pk(&self) -> Option<FieldValue> {
        (!self.code.is_empty()).then(|| FieldValue::Text(self.code.clone()))
    }

    fn set_pk(&mut self, pk: FieldValue) {
        self.code = pk.reduced().to_string();
    }

    fn field_value(&self, name: &str) -> Option<FieldValue> {
        match name {
            "code" => Some(self.code.as_str().into()),
            "name" => Some(self.name.as_str().into()),
            _ => None,
        }
    }

    fn state(&self) -> &RecordState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RecordState {
        &mut self.state
    }
}

/// Record referencing a [`Country`], unique per `(country, name)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct State {
    pub id: Option<i64>,
    pub country_code: String,
    pub name: String,
    pub abbreviation: String,
    #[serde(skip)]
    pub state: RecordState,
}

static STATE_FIELDS: [FieldDescriptor; 4] = [
    FieldDescriptor::primary("id"),
    FieldDescriptor::reference("country", "country_id"),
    FieldDescriptor::new("name"),
    FieldDescriptor::new("abbreviation"),
];

impl State {
    pub fn new(country: &Country, name: impl Into<String>, abbreviation: impl Into<String>) -> Self {
        Self {
            id: None,
            country_code: country.code.clone(),
            name: name.into(),
            abbreviation: abbreviation.into(),
            state: RecordState::default(),
        }
    }
}

impl Record for State {
    fn type_name() -> &'static str {
        "State"
    }

    fn fields() -> &'static [FieldDescriptor] {
        &STATE_FIELDS
    }

    fn pk(&self) -> Option<FieldValue> {
        self.id.map(FieldValue::Int)
    }

    fn set_pk(&mut self, pk: FieldValue) {
        self.id = pk.as_integer();
    }

    fn field_value(&self, name: &str) -> Option<FieldValue> {
        match name {
            "id" => Some(self.id.into()),
            "country" => Some(FieldValue::reference(self.country_code.as_str())),
            "name" => Some(self.name.as_str().into()),
            "abbreviation" => Some(self.abbreviation.as_str().into()),
            _ => None,
        }
    }

    fn state(&self) -> &RecordState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RecordState {
        &mut self.state
    }
}

/// UUID-keyed record with a unique `email`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Option<Uuid>,
    pub email: String,
    pub is_active: bool,
    pub joined_at: DateTime<Utc>,
    #[serde(skip)]
    pub state: RecordState,
}

static USER_FIELDS: [FieldDescriptor; 4] = [
    FieldDescriptor::primary("id"),
    FieldDescriptor::new("email"),
    FieldDescriptor::new("is_active"),
    FieldDescriptor::new("joined_at"),
];

impl User {
    /// A user with a fresh UUIDv7 key.
    pub fn new(email: impl Into<String>) -> Self {
        Self {
            id: Some(Uuid::now_v7()),
            email: email.into(),
            is_active: true,
            joined_at: Utc::now(),
            state: RecordState::default(),
        }
    }
}

impl Record for User {
    fn type_name() -> &'static str {
        "User"
    }

    fn fields() -> &'static [FieldDescriptor] {
        &USER_FIELDS
    }

    fn pk(&self) -> Option<FieldValue> {
        self.id.map(FieldValue::Uuid)
    }

    fn set_pk(&mut self, pk: FieldValue) {
        self.id = match pk.reduced() {
            FieldValue::Uuid(id) => Some(*id),
            other => Uuid::parse_str(&other.to_string()).ok(),
        };
    }

    fn field_value(&self, name: &str) -> Option<FieldValue> {
        match name {
            "id" => Some(self.id.into()),
            "email" => Some(self.email.as_str().into()),
            "is_active" => Some(self.is_active.into()),
            "joined_at" => Some(self.joined_at.into()),
            _ => None,
        }
    }

    fn state(&self) -> &RecordState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RecordState {
        &mut self.state
    }
}

// ============================================================================
// FAULT INJECTION
// ============================================================================

/// In-memory backend whose reads, writes and deletes can be switched to fail.
#[derive(Debug, Default)]
pub struct FlakyBackend {
    inner: InMemoryCacheBackend,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
    fail_deletes: AtomicBool,
    failures: AtomicU64,
}

impl FlakyBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryCacheBackend {
        &self.inner
    }

    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, fail: bool) {
        self.fail_deletes.store(fail, Ordering::SeqCst);
    }

    pub fn fail_everything(&self, fail: bool) {
        self.fail_reads(fail);
        self.fail_writes(fail);
        self.fail_deletes(fail);
    }

    /// Number of calls that were made to fail.
    pub fn failures(&self) -> u64 {
        self.failures.load(Ordering::SeqCst)
    }

    fn check(&self, flag: &AtomicBool, op: &str) -> Result<(), CacheError> {
        if flag.load(Ordering::SeqCst) {
            self.failures.fetch_add(1, Ordering::SeqCst);
            return Err(CacheError::Backend {
                reason: format!("injected {} failure", op),
            });
        }
        Ok(())
    }
}

impl CacheBackend for FlakyBackend {
    fn get(&self, key: &str, version: &str) -> Result<Option<Vec<u8>>, CacheError> {
        self.check(&self.fail_reads, "read")?;
        self.inner.get(key, version)
    }

    fn set(
        &self,
        key: &str,
        value: &[u8],
        timeout: Duration,
        version: &str,
    ) -> Result<(), CacheError> {
        self.check(&self.fail_writes, "write")?;
        self.inner.set(key, value, timeout, version)
    }

    fn delete(&self, key: &str, version: &str) -> Result<(), CacheError> {
        self.check(&self.fail_deletes, "delete")?;
        self.inner.delete(key, version)
    }

    fn stats(&self) -> CacheStats {
        self.inner.stats()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for generating modelcache values and records.

    use super::*;
    use proptest::prelude::*;

    /// Generate a field name: lowercase ASCII with underscores, never the
    /// composite delimiter.
    pub fn arb_field_name() -> impl Strategy<Value = String> {
        "[a-z][a-z_]{0,11}"
    }

    /// Generate a Timestamp within 2020-2030.
    pub fn arb_timestamp() -> impl Strategy<Value = DateTime<Utc>> {
        (1577836800i64..1893456000i64)
            .prop_map(|secs| DateTime::from_timestamp(secs, 0).unwrap_or_else(Utc::now))
    }

    pub fn arb_uuid() -> impl Strategy<Value = Uuid> {
        any::<[u8; 16]>().prop_map(Uuid::from_bytes)
    }

    /// Generate any non-reference field value.
    pub fn arb_scalar_value() -> impl Strategy<Value = FieldValue> {
        prop_oneof![
            Just(FieldValue::Null),
            any::<bool>().prop_map(FieldValue::Bool),
            any::<i64>().prop_map(FieldValue::Int),
            "[ -~]{0,24}".prop_map(FieldValue::Text),
            arb_timestamp().prop_map(FieldValue::Timestamp),
            arb_uuid().prop_map(FieldValue::Uuid),
        ]
    }

    /// Generate a field value, possibly a reference to another record.
    pub fn arb_field_value() -> impl Strategy<Value = FieldValue> {
        prop_oneof![
            4 => arb_scalar_value(),
            1 => prop_oneof![
                any::<i64>().prop_map(FieldValue::Int),
                "[A-Z]{2}".prop_map(FieldValue::Text),
            ]
            .prop_map(|pk| FieldValue::reference(pk)),
        ]
    }

    /// Generate a field-name to value map of 1..=6 entries.
    pub fn arb_field_map() -> impl Strategy<Value = Vec<(String, FieldValue)>> {
        prop::collection::btree_map(arb_field_name(), arb_field_value(), 1..=6)
            .prop_map(|m| m.into_iter().collect())
    }

    /// Generate a SKU: uppercase letter followed by digits.
    pub fn arb_sku() -> impl Strategy<Value = String> {
        "[A-Z][0-9]{1,5}"
    }

    /// Generate an unsaved Widget.
    pub fn arb_widget() -> impl Strategy<Value = Widget> {
        (arb_sku(), "[A-Za-z ]{1,16}").prop_map(|(sku, name)| Widget::new(sku, name))
    }

    /// Generate 1..=max unsaved Widgets with distinct SKUs.
    pub fn arb_distinct_widgets(max: usize) -> impl Strategy<Value = Vec<Widget>> {
        prop::collection::btree_map(arb_sku(), "[A-Za-z]{1,12}", 1..=max).prop_map(|m| {
            m.into_iter()
                .map(|(sku, name)| Widget::new(sku, name))
                .collect()
        })
    }

    /// Generate a valid manager config for [`Widget`].
    pub fn arb_widget_config() -> impl Strategy<Value = ManagerConfig> {
        (
            prop::sample::subsequence(vec!["pk", "sku", "name"], 1..=3),
            any::<bool>(),
            1u64..=86_400,
        )
            .prop_map(|(fields, composite, timeout)| {
                let config = ManagerConfig::new()
                    .with_cache_fields(fields)
                    .with_timeout(Duration::from_secs(timeout));
                if composite {
                    config.with_cache_field(["sku", "name"])
                } else {
                    config
                }
            })
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built managers and records for common test scenarios.

    use super::*;
    use std::sync::Arc;

    pub type WidgetManager = CachedManager<Widget, InMemoryStore<Widget>, InMemoryCacheBackend>;

    /// Manager config caching widgets by primary key and SKU.
    pub fn widget_config() -> ManagerConfig {
        ManagerConfig::new().with_cache_fields(["pk", "sku"])
    }

    /// Widget manager over fresh in-memory collaborators.
    pub fn widget_manager(config: ManagerConfig) -> WidgetManager {
        CachedManager::new(
            Arc::new(InMemoryStore::new()),
            Arc::new(InMemoryCacheBackend::new()),
            config,
        )
        .expect("widget config should be valid")
    }

    /// Widget manager whose backend can be made to fail.
    pub fn flaky_widget_manager(
        config: ManagerConfig,
    ) -> (
        CachedManager<Widget, InMemoryStore<Widget>, FlakyBackend>,
        Arc<FlakyBackend>,
    ) {
        let backend = Arc::new(FlakyBackend::new());
        let manager = CachedManager::new(
            Arc::new(InMemoryStore::new()),
            Arc::clone(&backend),
            config,
        )
        .expect("widget config should be valid");
        (manager, backend)
    }

    /// Save a new widget through `manager`.
    pub fn saved_widget<S, C>(
        manager: &CachedManager<Widget, S, C>,
        sku: &str,
        name: &str,
    ) -> Widget
    where
        S: RecordStore<Widget>,
        C: CacheBackend,
    {
        let mut widget = Widget::new(sku, name);
        manager.save(&mut widget).expect("saving a widget should succeed");
        widget
    }

    pub fn usa() -> Country {
        Country::new("US", "United States")
    }

    pub fn canada() -> Country {
        Country::new("CA", "Canada")
    }

    /// Place a raw envelope in the cache, bypassing the coordinator.
    pub fn plant_entry<R, S, C>(
        manager: &CachedManager<R, S, C>,
        field: &str,
        value: &FieldValue,
        entry: &CacheEntry,
    ) where
        R: Record,
        S: RecordStore<R>,
        C: CacheBackend,
    {
        let coordinator = manager.coordinator();
        let key = coordinator.codec().key_for(field, value);
        coordinator
            .backend()
            .set(
                key.as_str(),
                &entry.encode().expect("entry should encode"),
                Duration::from_secs(60),
                coordinator.version(),
            )
            .expect("in-memory set should succeed");
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertion helpers for modelcache results.

    use super::*;

    /// Assert that a ModelCacheResult is a NotFound store error for `record_type`.
    #[track_caller]
    pub fn assert_not_found<T: std::fmt::Debug>(
        result: &ModelCacheResult<T>,
        record_type: &'static str,
    ) {
        match result {
            Err(ModelCacheError::Store(StoreError::NotFound { record_type: rt, .. })) => {
                assert_eq!(*rt, record_type, "Wrong record type in NotFound error");
            }
            other => panic!("Expected NotFound error for {}, got: {:?}", record_type, other),
        }
    }

    /// Assert that a ModelCacheResult is a cache corruption error.
    #[track_caller]
    pub fn assert_corruption<T: std::fmt::Debug>(result: &ModelCacheResult<T>) {
        match result {
            Err(ModelCacheError::Corruption(_)) => {}
            other => panic!("Expected Corruption error, got: {:?}", other),
        }
    }

    /// Assert that a ModelCacheResult is a Config error.
    #[track_caller]
    pub fn assert_config_error<T: std::fmt::Debug>(result: &ModelCacheResult<T>) {
        match result {
            Err(ModelCacheError::Config(_)) => {}
            other => panic!("Expected Config error, got: {:?}", other),
        }
    }

    /// Assert that two records share a primary key.
    #[track_caller]
    pub fn assert_same_record<R: Record>(a: &R, b: &R) {
        assert_eq!(a.pk(), b.pk(), "Records have different primary keys");
    }
}
