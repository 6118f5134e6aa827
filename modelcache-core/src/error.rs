//! Error types for modelcache operations

use thiserror::Error;

/// Source-of-truth store errors. Always surface unchanged to the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StoreError {
    #[error("{record_type} not found for lookup on ({lookup})")]
    NotFound {
        record_type: &'static str,
        lookup: String,
    },

    #[error("{count} {record_type} records returned for lookup on ({lookup})")]
    MultipleReturned {
        record_type: &'static str,
        lookup: String,
        count: usize,
    },

    #[error("{record_type} instance has no primary key")]
    MissingPrimaryKey { record_type: &'static str },

    #[error("Store lock poisoned")]
    LockPoisoned,

    #[error("Store backend failure: {reason}")]
    Backend { reason: String },
}

/// Misconfiguration. Fatal when the manager is built.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Field {field} does not exist on {record_type}")]
    FieldNotFound {
        record_type: &'static str,
        field: String,
    },

    #[error("{record_type} declares no primary key field")]
    MissingPrimaryKey { record_type: &'static str },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Failed to parse manager config: {reason}")]
    Parse { reason: String },
}

/// Cache backend failures. Never fatal: a failed read is a miss and a
/// failed write or delete is logged and dropped.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CacheError {
    #[error("Cache backend error: {reason}")]
    Backend { reason: String },

    #[error("Cache serialization error: {reason}")]
    Serialization { reason: String },
}

/// A cache hit that failed validation against the query that produced it.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum CorruptionError {
    #[error("Unexpected value type returned from cache for {key}: expected {expected}, found {found}")]
    UnexpectedType {
        key: String,
        expected: String,
        found: String,
    },

    #[error("Unexpected primary key returned from cache for {key}: expected {expected}, found {found}")]
    PrimaryKeyMismatch {
        key: String,
        expected: String,
        found: String,
    },

    #[error("Pointer {key} resolved to a record whose {field} no longer matches")]
    PointerMismatch { key: String, field: String },
}

/// Master error type for all modelcache errors.
#[derive(Debug, Clone, Error)]
pub enum ModelCacheError {
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),

    #[error("Cache corruption: {0}")]
    Corruption(#[from] CorruptionError),
}

impl ModelCacheError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, ModelCacheError::Store(StoreError::NotFound { .. }))
    }
}

/// Result type alias for modelcache operations.
pub type ModelCacheResult<T> = Result<T, ModelCacheError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_error_display_not_found() {
        let err = StoreError::NotFound {
            record_type: "Widget",
            lookup: "sku".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Widget"));
        assert!(msg.contains("sku"));
    }

    #[test]
    fn test_config_error_display_field_not_found() {
        let err = ConfigError::FieldNotFound {
            record_type: "Widget",
            field: "colour".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("colour"));
        assert!(msg.contains("Widget"));
    }

    #[test]
    fn test_corruption_error_display() {
        let err = CorruptionError::PrimaryKeyMismatch {
            key: "modelcache:Widget:abc".to_string(),
            expected: "1".to_string(),
            found: "2".to_string(),
        };
        let msg = format!("{}", err);
        assert!(msg.contains("Unexpected primary key"));
        assert!(msg.contains("modelcache:Widget:abc"));
    }

    #[test]
    fn test_model_cache_error_from_variants() {
        let store = ModelCacheError::from(StoreError::LockPoisoned);
        assert!(matches!(store, ModelCacheError::Store(_)));

        let config = ModelCacheError::from(ConfigError::Parse {
            reason: "bad".to_string(),
        });
        assert!(matches!(config, ModelCacheError::Config(_)));

        let cache = ModelCacheError::from(CacheError::Backend {
            reason: "down".to_string(),
        });
        assert!(matches!(cache, ModelCacheError::Cache(_)));

        let corruption = ModelCacheError::from(CorruptionError::PointerMismatch {
            key: "k".to_string(),
            field: "sku".to_string(),
        });
        assert!(matches!(corruption, ModelCacheError::Corruption(_)));
    }

    #[test]
    fn test_is_not_found() {
        let err = ModelCacheError::from(StoreError::NotFound {
            record_type: "Widget",
            lookup: "sku".to_string(),
        });
        assert!(err.is_not_found());
        assert!(!ModelCacheError::from(StoreError::LockPoisoned).is_not_found());
    }
}
