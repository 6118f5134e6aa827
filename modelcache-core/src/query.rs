//! Field-equality queries against a record store

use crate::field::{FieldValue, FIELD_DELIMITER, PK_ALIAS};
use std::collections::BTreeMap;

/// Lookup suffix stripped from condition names (`sku__exact` == `sku`).
pub const EXACT_SUFFIX: &str = "__exact";

/// A conjunction of `field = value` conditions.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Query {
    conditions: BTreeMap<String, FieldValue>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    /// Single-condition query.
    pub fn by(field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        Self::new().and(field, value)
    }

    /// Primary-key query.
    pub fn pk(value: impl Into<FieldValue>) -> Self {
        Self::by(PK_ALIAS, value)
    }

    /// Add a condition. A later condition on the same field replaces the earlier one.
    pub fn and(mut self, field: impl Into<String>, value: impl Into<FieldValue>) -> Self {
        let mut field = field.into();
        if let Some(stripped) = field.strip_suffix(EXACT_SUFFIX) {
            field = stripped.to_string();
        }
        self.conditions.insert(field, value.into());
        self
    }

    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    pub fn get(&self, field: &str) -> Option<&FieldValue> {
        self.conditions.get(field)
    }

    /// Conditions in field-name order.
    pub fn conditions(&self) -> impl Iterator<Item = (&str, &FieldValue)> {
        self.conditions.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Comma-separated field names. Values are left out so this is safe to log.
    pub fn describe(&self) -> String {
        self.conditions
            .keys()
            .map(String::as_str)
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Collapse the query into the `(field spec, value)` pair used for cache
    /// lookups, with `pk` normalized to `pk_name`.
    ///
    /// A single condition keeps its value as-is. Several conditions become a
    /// composite: field names sorted and joined with [`FIELD_DELIMITER`], values
    /// rendered as text and joined in the same order.
    pub fn lookup_key(&self, pk_name: &str) -> Option<(String, FieldValue)> {
        let mut pairs: Vec<(&str, &FieldValue)> = self
            .conditions
            .iter()
            .map(|(k, v)| {
                let k = if k == PK_ALIAS { pk_name } else { k.as_str() };
                (k, v)
            })
            .collect();

        match pairs.len() {
            0 => None,
            1 => {
                let (field, value) = pairs[0];
                Some((field.to_string(), value.clone()))
            }
            _ => {
                pairs.sort_by(|a, b| a.0.cmp(b.0));
                let delimiter = FIELD_DELIMITER.to_string();
                let fields = pairs
                    .iter()
                    .map(|(k, _)| *k)
                    .collect::<Vec<_>>()
                    .join(&delimiter);
                let values = pairs
                    .iter()
                    .map(|(_, v)| v.to_string())
                    .collect::<Vec<_>>()
                    .join(&delimiter);
                Some((fields, FieldValue::Text(values)))
            }
        }
    }
}

impl<K: Into<String>, V: Into<FieldValue>> FromIterator<(K, V)> for Query {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(Query::new(), |q, (k, v)| q.and(k, v))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_suffix_stripped() {
        let q = Query::by("sku__exact", "A1");
        assert_eq!(q.get("sku"), Some(&FieldValue::from("A1")));
        assert!(q.get("sku__exact").is_none());
    }

    #[test]
    fn test_single_lookup_key_keeps_value() {
        let q = Query::by("sku", "A1");
        assert_eq!(
            q.lookup_key("id"),
            Some(("sku".to_string(), FieldValue::from("A1")))
        );
    }

    #[test]
    fn test_pk_alias_normalized() {
        let q = Query::pk(5);
        assert_eq!(q.lookup_key("id"), Some(("id".to_string(), FieldValue::Int(5))));
    }

    #[test]
    fn test_composite_lookup_key_sorted() {
        let q = Query::new()
            .and("name", "Quebec")
            .and("country_code", "CA");
        assert_eq!(
            q.lookup_key("id"),
            Some((
                "country_code-name".to_string(),
                FieldValue::from("CA-Quebec")
            ))
        );
    }

    #[test]
    fn test_composite_reduces_references() {
        let q = Query::new()
            .and("state", FieldValue::reference(9))
            .and("city", "Montreal");
        let (fields, value) = q.lookup_key("id").unwrap();
        assert_eq!(fields, "city-state");
        assert_eq!(value, FieldValue::from("Montreal-9"));
    }

    #[test]
    fn test_empty_query_has_no_lookup_key() {
        assert!(Query::new().lookup_key("id").is_none());
        assert!(Query::new().is_empty());
    }

    #[test]
    fn test_describe_omits_values() {
        let q: Query = vec![("sku", "secret"), ("name", "x")].into_iter().collect();
        assert_eq!(q.describe(), "name, sku");
        assert_eq!(q.len(), 2);
    }

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_lookup_key_ignores_condition_order(
                pairs in prop::collection::btree_map("[a-z][a-z_]{0,8}", "[A-Za-z0-9]{1,8}", 2..5)
            ) {
                let forward: Query = pairs.iter().map(|(k, v)| (k.as_str(), v.as_str())).collect();
                let reverse: Query = pairs.iter().rev().map(|(k, v)| (k.as_str(), v.as_str())).collect();
                prop_assert_eq!(forward.lookup_key("id"), reverse.lookup_key("id"));
            }

            #[test]
            fn prop_exact_suffix_is_transparent(field in "[a-z]{1,9}", value in any::<i64>()) {
                let plain = Query::by(field.as_str(), value);
                let exact = Query::by(format!("{}{}", field, EXACT_SUFFIX), value);
                prop_assert_eq!(plain, exact);
            }
        }
    }
}
