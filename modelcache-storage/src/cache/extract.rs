//! Reading cache-eligible field values off record instances.

use modelcache_core::{ConfigError, FieldValue, Record, Snapshot, FIELD_DELIMITER, PK_ALIAS};

/// Reads current values of field specs from a record.
///
/// A spec is a field name, `pk`, or several names joined with
/// [`FIELD_DELIMITER`]. Composite values are the members' text forms joined
/// with the same delimiter, in the order the spec lists them.
pub struct FieldValueExtractor;

impl FieldValueExtractor {
    pub fn value_for<R: Record>(record: &R, spec: &str) -> Result<FieldValue, ConfigError> {
        if spec == PK_ALIAS {
            return Ok(record.pk().unwrap_or(FieldValue::Null));
        }

        if !spec.contains(FIELD_DELIMITER) {
            return Self::single(record, spec);
        }

        let values = spec
            .split(FIELD_DELIMITER)
            .map(|name| Self::single(record, name).map(|v| v.to_string()))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(FieldValue::Text(values.join(&FIELD_DELIMITER.to_string())))
    }

    /// Values for every spec, keyed by spec.
    pub fn snapshot<R: Record>(record: &R, specs: &[String]) -> Result<Snapshot, ConfigError> {
        specs
            .iter()
            .map(|spec| Self::value_for(record, spec).map(|v| (spec.clone(), v)))
            .collect()
    }

    fn single<R: Record>(record: &R, name: &str) -> Result<FieldValue, ConfigError> {
        record
            .field_value(name)
            .ok_or_else(|| ConfigError::FieldNotFound {
                record_type: R::type_name(),
                field: name.to_string(),
            })
    }
}
