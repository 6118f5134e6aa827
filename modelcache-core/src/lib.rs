//! modelcache Core - Record Model
//!
//! Data types shared by the cache manager and its collaborators: field values,
//! static field tables, the `Record` trait, queries, manager configuration and
//! the error taxonomy. This crate performs no I/O.

pub mod config;
pub mod error;
pub mod field;
pub mod query;
pub mod record;

pub use config::{CacheField, ManagerConfig, DEFAULT_CACHE_TIMEOUT_SECS, DEFAULT_KEY_PREFIX};
pub use error::{
    CacheError, ConfigError, CorruptionError, ModelCacheError, ModelCacheResult, StoreError,
};
pub use field::{FieldDescriptor, FieldValue, FIELD_DELIMITER, PK_ALIAS};
pub use query::{Query, EXACT_SUFFIX};
pub use record::{ObservedState, Record, RecordState, Snapshot};
