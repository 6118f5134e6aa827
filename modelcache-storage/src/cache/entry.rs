//! Serialized form of cache values.

use modelcache_core::{CacheError, FieldValue, Record};
use serde::{Deserialize, Serialize};

/// What a cache key holds: a full record snapshot under its primary-key key,
/// or a pointer to that primary key under an alternate-field key.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CacheEntry {
    Pointer {
        pk: FieldValue,
    },
    Record {
        record_type: String,
        body: serde_json::Value,
    },
}

impl CacheEntry {
    pub fn pointer(pk: FieldValue) -> Self {
        CacheEntry::Pointer { pk }
    }

    pub fn record<R: Record>(record: &R) -> Result<Self, CacheError> {
        let body = serde_json::to_value(record).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })?;
        Ok(CacheEntry::Record {
            record_type: R::type_name().to_string(),
            body,
        })
    }

    /// Short description for corruption reports.
    pub fn describe(&self) -> String {
        match self {
            CacheEntry::Pointer { .. } => "pointer".to_string(),
            CacheEntry::Record { record_type, .. } => format!("record {}", record_type),
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, CacheError> {
        serde_json::to_vec(self).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, CacheError> {
        serde_json::from_slice(bytes).map_err(|e| CacheError::Serialization {
            reason: e.to_string(),
        })
    }
}
