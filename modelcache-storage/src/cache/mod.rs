//! Cache layer for field-equality record lookups.
//!
//! Records are cached once under their primary key. Every other
//! cache-eligible field gets a small pointer entry naming that primary key,
//! so an update rewrites one full snapshot plus a handful of pointers.
//!
//! # Correctness
//!
//! The cache is never trusted blindly. A hit is returned only when:
//! - the entry holds the expected record type
//! - the record's primary key matches the one that was looked up
//! - a record reached through a pointer still carries the pointer's value
//!
//! Anything else is reported as a [`CorruptionError`](modelcache_core::CorruptionError)
//! and the manager decides whether to surface it or fall back to the store.
//!
//! # Example
//!
//! ```ignore
//! let coordinator = CacheCoordinator::<Widget, _>::new(
//!     Arc::new(InMemoryCacheBackend::new()),
//!     KeyCodec::for_record::<Widget>("modelcache"),
//!     vec!["id".to_string(), "sku".to_string()],
//!     Duration::from_secs(3600),
//!     None,
//! );
//! coordinator.populate(&mut widget)?;
//! let hit = coordinator.lookup("sku", &FieldValue::from("A1"), None)?;
//! ```

pub mod coordinator;
pub mod entry;
pub mod extract;
pub mod key;
pub mod lmdb_backend;
pub mod memory_backend;
pub mod observer;
pub mod traits;

#[cfg(test)]
pub(crate) mod test_fixtures;

pub use coordinator::CacheCoordinator;
pub use entry::CacheEntry;
pub use extract::FieldValueExtractor;
pub use key::{make_key, schema_version, CacheKey, KeyCodec};
pub use lmdb_backend::{LmdbCacheBackend, LmdbCacheError};
pub use memory_backend::InMemoryCacheBackend;
pub use observer::{ChangeObserver, StaleField};
pub use traits::{CacheBackend, CacheStats};
