//! Per-instance change tracking for cache-eligible fields.
//!
//! Each record instance carries its own [`ObservedState`] inside its transient
//! [`RecordState`](modelcache_core::RecordState), so the observed snapshot
//! lives and dies with the instance and is never shared between instances or
//! threads. The observer itself is stateless apart from the field specs it
//! tracks; staleness is a pure function of the previous state and the current
//! field values.

use modelcache_core::{ConfigError, FieldValue, ObservedState, Record, Snapshot};

use super::extract::FieldValueExtractor;

/// A pointer that no longer matches its record: `spec` used to hold `value`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StaleField {
    pub spec: String,
    pub value: FieldValue,
}

/// Tracks the cache-eligible fields of one record type.
#[derive(Debug, Clone)]
pub struct ChangeObserver {
    fields: Vec<String>,
}

impl ChangeObserver {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    /// Current state of `record`: the unsaved marker if it has no primary key,
    /// otherwise a snapshot of every tracked field.
    pub fn observe<R: Record>(&self, record: &R) -> Result<ObservedState, ConfigError> {
        if !record.is_saved() {
            return Ok(ObservedState::Unsaved);
        }
        FieldValueExtractor::snapshot(record, &self.fields).map(ObservedState::Observed)
    }

    /// Instance-initialized hook: record the freshly loaded state.
    pub fn on_init<R: Record>(&self, record: &mut R) -> Result<(), ConfigError> {
        let observed = self.observe(record)?;
        record.state_mut().observed = observed;
        Ok(())
    }

    /// Fields whose value changed between `previous` and `current`, with
    /// their previous values.
    ///
    /// Values are compared by canonical text, the same form cache keys are
    /// derived from, so a stale entry never shares a key with a fresh one.
    pub fn stale_fields(previous: &ObservedState, current: &Snapshot) -> Vec<StaleField> {
        let Some(previous) = previous.snapshot() else {
            return Vec::new();
        };
        previous
            .iter()
            .filter_map(|(spec, old)| match current.get(spec) {
                Some(new) if new.to_string() == old.to_string() => None,
                _ => Some(StaleField {
                    spec: spec.clone(),
                    value: old.clone(),
                }),
            })
            .collect()
    }
}
