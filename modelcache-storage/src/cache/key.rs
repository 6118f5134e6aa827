//! Cache key derivation.
//!
//! A key is `prefix:TypeName:digest`, where the digest is the XXH3-128 hash of
//! the `field=value` pairs sorted by field name and joined with `:`. Keys are
//! fixed-length regardless of how many fields they cover, and they never
//! contain raw field values, so they are safe to log.

use std::fmt;

use modelcache_core::{FieldValue, Record, PK_ALIAS};
use xxhash_rust::xxh3::xxh3_128;

/// Separator between key segments and between hashed field pairs.
const SEGMENT_SEPARATOR: char = ':';

/// Hex length of the derived schema version.
const SCHEMA_VERSION_LEN: usize = 8;

/// An opaque cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Builds cache keys for one record type.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyCodec {
    prefix: String,
    type_name: &'static str,
    pk_name: &'static str,
}

impl KeyCodec {
    pub fn new(prefix: impl Into<String>, type_name: &'static str, pk_name: &'static str) -> Self {
        Self {
            prefix: prefix.into(),
            type_name,
            pk_name,
        }
    }

    /// Codec for `R`. Types without a declared primary key keep the `pk` alias.
    pub fn for_record<R: Record>(prefix: impl Into<String>) -> Self {
        let pk_name = R::pk_field().map(|f| f.name).unwrap_or(PK_ALIAS);
        Self::new(prefix, R::type_name(), pk_name)
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    pub fn pk_name(&self) -> &'static str {
        self.pk_name
    }

    /// Key for a set of field values. Insertion order does not matter.
    pub fn make_key<'a, I>(&self, fields: I) -> CacheKey
    where
        I: IntoIterator<Item = (&'a str, &'a FieldValue)>,
    {
        let mut bits: Vec<(&str, String)> = fields
            .into_iter()
            .map(|(field, value)| {
                let field = if field == PK_ALIAS { self.pk_name } else { field };
                (field, value.to_string())
            })
            .collect();
        bits.sort();

        let joined = bits
            .iter()
            .map(|(field, value)| format!("{}={}", field, value))
            .collect::<Vec<_>>()
            .join(&SEGMENT_SEPARATOR.to_string());

        CacheKey(format!(
            "{prefix}{sep}{type_name}{sep}{digest:032x}",
            prefix = self.prefix,
            type_name = self.type_name,
            digest = xxh3_128(joined.as_bytes()),
            sep = SEGMENT_SEPARATOR,
        ))
    }

    /// Key for a single field spec and value.
    pub fn key_for(&self, field: &str, value: &FieldValue) -> CacheKey {
        self.make_key([(field, value)])
    }

    /// Key of the full-record entry for a primary key.
    pub fn pk_key(&self, pk: &FieldValue) -> CacheKey {
        self.key_for(self.pk_name, pk)
    }
}

/// Key for `R` under `prefix`.
pub fn make_key<'a, R, I>(prefix: &str, fields: I) -> CacheKey
where
    R: Record,
    I: IntoIterator<Item = (&'a str, &'a FieldValue)>,
{
    KeyCodec::for_record::<R>(prefix).make_key(fields)
}

/// Short digest of `R`'s sorted column names.
///
/// Used as the cache version when none is configured, so adding, removing or
/// renaming a field moves the type into a fresh cache namespace.
pub fn schema_version<R: Record>() -> String {
    let mut columns: Vec<&str> = R::fields().iter().map(|f| f.column).collect();
    columns.sort_unstable();
    let digest = format!("{:032x}", xxh3_128(columns.join("&").as_bytes()));
    digest[..SCHEMA_VERSION_LEN].to_string()
}
