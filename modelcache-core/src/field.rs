//! Field values and static field descriptors

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Alias accepted anywhere a primary-key field name is expected.
pub const PK_ALIAS: &str = "pk";

/// Joins the members of a composite field spec and their values.
///
/// Must not be a character that is valid inside a field name.
pub const FIELD_DELIMITER: char = '-';

/// A single field value read off a record.
///
/// The `Display` impl is the canonical text form used for cache keys and
/// composite values. References to other records reduce to the referenced
/// primary key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    Timestamp(DateTime<Utc>),
    Uuid(Uuid),
    /// Reference to another record, holding that record's primary key.
    Ref(Box<FieldValue>),
}

impl FieldValue {
    /// Reference to another record by its primary key.
    pub fn reference(pk: impl Into<FieldValue>) -> Self {
        FieldValue::Ref(Box::new(pk.into()))
    }

    /// Strip any record references down to the primary key they carry.
    pub fn reduced(&self) -> &FieldValue {
        match self {
            FieldValue::Ref(inner) => inner.reduced(),
            other => other,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self.reduced(), FieldValue::Null)
    }

    /// Integer view of the value, coercing decimal-digit text.
    pub fn as_integer(&self) -> Option<i64> {
        match self.reduced() {
            FieldValue::Int(i) => Some(*i),
            FieldValue::Text(s) if !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()) => {
                s.parse().ok()
            }
            _ => None,
        }
    }

    /// Loose equality used when validating cache hits.
    ///
    /// Equal values match; decimal-digit text matches an integer with the same
    /// value; otherwise the canonical text forms are compared.
    pub fn matches(&self, other: &FieldValue) -> bool {
        let (a, b) = (self.reduced(), other.reduced());
        if a == b {
            return true;
        }
        match (a.as_integer(), b.as_integer()) {
            (Some(x), Some(y)) => x == y,
            _ => a.to_string() == b.to_string(),
        }
    }
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Null => f.write_str("null"),
            FieldValue::Bool(b) => write!(f, "{}", b),
            FieldValue::Int(i) => write!(f, "{}", i),
            FieldValue::Text(s) => f.write_str(s),
            FieldValue::Timestamp(ts) => f.write_str(&ts.to_rfc3339()),
            FieldValue::Uuid(id) => write!(f, "{}", id.hyphenated()),
            FieldValue::Ref(pk) => pk.fmt(f),
        }
    }
}

impl From<i64> for FieldValue {
    fn from(v: i64) -> Self {
        FieldValue::Int(v)
    }
}

impl From<i32> for FieldValue {
    fn from(v: i32) -> Self {
        FieldValue::Int(i64::from(v))
    }
}

impl From<u32> for FieldValue {
    fn from(v: u32) -> Self {
        FieldValue::Int(i64::from(v))
    }
}

impl From<bool> for FieldValue {
    fn from(v: bool) -> Self {
        FieldValue::Bool(v)
    }
}

impl From<&str> for FieldValue {
    fn from(v: &str) -> Self {
        FieldValue::Text(v.to_string())
    }
}

impl From<String> for FieldValue {
    fn from(v: String) -> Self {
        FieldValue::Text(v)
    }
}

impl From<&String> for FieldValue {
    fn from(v: &String) -> Self {
        FieldValue::Text(v.clone())
    }
}

impl From<Uuid> for FieldValue {
    fn from(v: Uuid) -> Self {
        FieldValue::Uuid(v)
    }
}

impl From<DateTime<Utc>> for FieldValue {
    fn from(v: DateTime<Utc>) -> Self {
        FieldValue::Timestamp(v)
    }
}

impl<T: Into<FieldValue>> From<Option<T>> for FieldValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(FieldValue::Null)
    }
}

/// Static description of one field of a record type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FieldDescriptor {
    /// Name used in queries and cache field specs.
    pub name: &'static str,
    /// Stored attribute name (differs from `name` for references, e.g. `state_id`).
    pub column: &'static str,
    pub primary_key: bool,
}

impl FieldDescriptor {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            column: name,
            primary_key: false,
        }
    }

    pub const fn primary(name: &'static str) -> Self {
        Self {
            name,
            column: name,
            primary_key: true,
        }
    }

    /// Reference field stored under a separate column name.
    pub const fn reference(name: &'static str, column: &'static str) -> Self {
        Self {
            name,
            column,
            primary_key: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_text() {
        assert_eq!(FieldValue::Int(42).to_string(), "42");
        assert_eq!(FieldValue::from("A1").to_string(), "A1");
        assert_eq!(FieldValue::Bool(true).to_string(), "true");
        assert_eq!(FieldValue::Null.to_string(), "null");
        assert_eq!(FieldValue::from(None::<i64>), FieldValue::Null);
    }

    #[test]
    fn test_reference_reduces_to_pk() {
        let r = FieldValue::reference(7);
        assert_eq!(r.reduced(), &FieldValue::Int(7));
        assert_eq!(r.to_string(), "7");

        let nested = FieldValue::reference(FieldValue::reference("CA"));
        assert_eq!(nested.to_string(), "CA");
    }

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(FieldValue::from("123").as_integer(), Some(123));
        assert_eq!(FieldValue::from("12a").as_integer(), None);
        assert_eq!(FieldValue::from("").as_integer(), None);
        assert_eq!(FieldValue::from("-1").as_integer(), None);
        assert!(FieldValue::from("1").matches(&FieldValue::Int(1)));
        assert!(FieldValue::from("007").matches(&FieldValue::Int(7)));
        assert!(FieldValue::from("007").matches(&FieldValue::from("007")));
        assert!(!FieldValue::from("2").matches(&FieldValue::Int(1)));
        assert!(!FieldValue::from("CA").matches(&FieldValue::from("US")));
    }

    #[test]
    fn test_descriptor_constructors() {
        let pk = FieldDescriptor::primary("id");
        assert!(pk.primary_key);
        assert_eq!(pk.column, "id");

        let state = FieldDescriptor::reference("state", "state_id");
        assert!(!state.primary_key);
        assert_eq!(state.column, "state_id");
    }
}
