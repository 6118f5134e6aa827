//! Cached-manager configuration

use crate::error::ConfigError;
use crate::field::{FIELD_DELIMITER, PK_ALIAS};
use crate::record::Record;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Default lifetime of cache entries.
pub const DEFAULT_CACHE_TIMEOUT_SECS: u64 = 60 * 60;

/// Default namespace prefix of every cache key.
pub const DEFAULT_KEY_PREFIX: &str = "modelcache";

/// A cache-eligible field: one field name or an ordered composite of names.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CacheField {
    Single(String),
    Composite(Vec<String>),
}

impl CacheField {
    pub fn members(&self) -> Vec<&str> {
        match self {
            CacheField::Single(name) => vec![name.as_str()],
            CacheField::Composite(names) => names.iter().map(String::as_str).collect(),
        }
    }
}

impl From<&str> for CacheField {
    fn from(name: &str) -> Self {
        CacheField::Single(name.to_string())
    }
}

impl From<String> for CacheField {
    fn from(name: String) -> Self {
        CacheField::Single(name)
    }
}

impl From<Vec<String>> for CacheField {
    fn from(names: Vec<String>) -> Self {
        CacheField::Composite(names)
    }
}

impl<const N: usize> From<[&str; N]> for CacheField {
    fn from(names: [&str; N]) -> Self {
        CacheField::Composite(names.iter().map(|s| s.to_string()).collect())
    }
}

/// Configuration recognized when a cached manager is built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ManagerConfig {
    /// Fields usable for cache lookups. Empty disables caching.
    pub cache_fields: Vec<CacheField>,
    pub cache_timeout_secs: u64,
    /// Cache namespace version. Derived from the record's field set when unset.
    pub cache_version: Option<String>,
    /// Corruption is returned as an error instead of falling back to the store.
    pub strict: bool,
    /// After a corruption fallback, write the freshly read record back.
    pub repopulate_on_corruption: bool,
    pub key_prefix: String,
}

impl Default for ManagerConfig {
    fn default() -> Self {
        Self {
            cache_fields: Vec::new(),
            cache_timeout_secs: DEFAULT_CACHE_TIMEOUT_SECS,
            cache_version: None,
            strict: false,
            repopulate_on_corruption: false,
            key_prefix: DEFAULT_KEY_PREFIX.to_string(),
        }
    }
}

impl ManagerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a config from TOML. Missing keys take their defaults.
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        toml::from_str(s).map_err(|e| ConfigError::Parse {
            reason: e.to_string(),
        })
    }

    pub fn with_cache_field(mut self, field: impl Into<CacheField>) -> Self {
        self.cache_fields.push(field.into());
        self
    }

    pub fn with_cache_fields<I, F>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = F>,
        F: Into<CacheField>,
    {
        self.cache_fields.extend(fields.into_iter().map(Into::into));
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.cache_timeout_secs = timeout.as_secs();
        self
    }

    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.cache_version = Some(version.into());
        self
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_repopulate_on_corruption(mut self, enabled: bool) -> Self {
        self.repopulate_on_corruption = enabled;
        self
    }

    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub fn cache_timeout(&self) -> Duration {
        Duration::from_secs(self.cache_timeout_secs)
    }

    /// Check the config against `R`'s field table and return the normalized
    /// field specs.
    ///
    /// Composite members are sorted and joined with [`FIELD_DELIMITER`] so that
    /// a declared composite and a multi-condition query address the same key.
    /// `pk` is rewritten to the primary-key field name. Duplicates are dropped.
    pub fn normalized_fields<R: Record>(&self) -> Result<Vec<String>, ConfigError> {
        if self.cache_timeout_secs == 0 {
            return Err(ConfigError::InvalidValue {
                field: "cache_timeout_secs".to_string(),
                value: "0".to_string(),
                reason: "must be at least one second".to_string(),
            });
        }
        if self.key_prefix.is_empty() || self.key_prefix.contains(':') {
            return Err(ConfigError::InvalidValue {
                field: "key_prefix".to_string(),
                value: self.key_prefix.clone(),
                reason: "must be non-empty and contain no ':'".to_string(),
            });
        }

        let pk_name = R::pk_field()
            .map(|f| f.name)
            .ok_or(ConfigError::MissingPrimaryKey {
                record_type: R::type_name(),
            })?;

        let mut specs: Vec<String> = Vec::with_capacity(self.cache_fields.len());
        for field in &self.cache_fields {
            let mut members = field.members();
            if let CacheField::Composite(_) = field {
                if members.len() < 2 {
                    return Err(ConfigError::InvalidValue {
                        field: "cache_fields".to_string(),
                        value: members.join(","),
                        reason: "a composite needs at least two fields".to_string(),
                    });
                }
            }

            for member in &mut members {
                if member.contains(FIELD_DELIMITER) {
                    return Err(ConfigError::InvalidValue {
                        field: "cache_fields".to_string(),
                        value: member.to_string(),
                        reason: format!("field names may not contain '{}'", FIELD_DELIMITER),
                    });
                }
                if R::field(member).is_none() {
                    return Err(ConfigError::FieldNotFound {
                        record_type: R::type_name(),
                        field: member.to_string(),
                    });
                }
                if *member == PK_ALIAS {
                    *member = pk_name;
                }
            }
            members.sort_unstable();

            let spec = members.join(&FIELD_DELIMITER.to_string());
            if !specs.contains(&spec) {
                specs.push(spec);
            }
        }
        Ok(specs)
    }
}
