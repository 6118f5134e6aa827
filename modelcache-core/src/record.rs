//! Record trait and per-instance transient state

use crate::field::{FieldDescriptor, FieldValue, PK_ALIAS};
use serde::{de::DeserializeOwned, Serialize};
use std::collections::BTreeMap;

/// Last observed values of the cache-eligible fields of one instance,
/// keyed by normalized field spec.
pub type Snapshot = BTreeMap<String, FieldValue>;

/// What the change observer last recorded for an instance.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ObservedState {
    /// No lifecycle hook has run for this instance yet.
    #[default]
    Unobserved,
    /// Observed before it had a primary key. Distinct from an empty snapshot.
    Unsaved,
    Observed(Snapshot),
}

impl ObservedState {
    pub fn snapshot(&self) -> Option<&Snapshot> {
        match self {
            ObservedState::Observed(snapshot) => Some(snapshot),
            _ => None,
        }
    }

    pub fn is_unsaved(&self) -> bool {
        matches!(self, ObservedState::Unsaved)
    }
}

/// Transient, never-serialized state carried by every record instance.
///
/// Implementors keep it behind `#[serde(skip)]`, so it is dropped with the
/// instance and never travels through the cache.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RecordState {
    /// Backend/session affinity of the instance (which store it was read from).
    pub db: Option<String>,
    pub observed: ObservedState,
}

impl RecordState {
    /// Remove the affinity marker, returning it for later restoration.
    pub fn take_db(&mut self) -> Option<String> {
        self.db.take()
    }
}

/// A persistent entity that can be cached by field lookups.
///
/// Field tables are static: `fields()` is resolved once per type and never
/// introspected per call.
pub trait Record: Clone + Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Type name used in cache keys and corruption checks.
    fn type_name() -> &'static str;

    /// Declared fields, in declaration order. Exactly one is the primary key.
    fn fields() -> &'static [FieldDescriptor];

    /// Primary key value, `None` while the instance is unsaved.
    fn pk(&self) -> Option<FieldValue>;

    /// Assign the primary key. Called by stores on first save.
    fn set_pk(&mut self, pk: FieldValue);

    /// Current value of the named field, `None` if the type has no such field.
    fn field_value(&self, name: &str) -> Option<FieldValue>;

    fn state(&self) -> &RecordState;

    fn state_mut(&mut self) -> &mut RecordState;

    fn pk_field() -> Option<&'static FieldDescriptor> {
        Self::fields().iter().find(|f| f.primary_key)
    }

    /// Look up a field by name. `pk` resolves to the primary-key field.
    fn field(name: &str) -> Option<&'static FieldDescriptor> {
        if name == PK_ALIAS {
            return Self::pk_field();
        }
        Self::fields().iter().find(|f| f.name == name)
    }

    fn is_saved(&self) -> bool {
        self.pk().map_or(false, |pk| !pk.is_null())
    }
}
