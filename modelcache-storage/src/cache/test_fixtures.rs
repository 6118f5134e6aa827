//! Record type shared by the unit tests of the cache modules.

use modelcache_core::{FieldDescriptor, FieldValue, Record, RecordState};
use serde::{Deserialize, Serialize, Serializer};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Gadget {
    pub id: Option<i64>,
    pub sku: String,
    pub name: String,
    pub owner: Option<i64>,
    #[serde(skip)]
    pub state: RecordState,
}

static GADGET_FIELDS: [FieldDescriptor; 4] = [
    FieldDescriptor::primary("id"),
    FieldDescriptor::new("sku"),
    FieldDescriptor::new("name"),
    FieldDescriptor::reference("owner", "owner_id"),
];

impl Gadget {
    pub fn new(id: Option<i64>, sku: &str, name: &str) -> Self {
        Self {
            id,
            sku: sku.to_string(),
            name: name.to_string(),
            owner: None,
            state: RecordState::default(),
        }
    }
}

impl Record for Gadget {
    fn type_name() -> &'static str {
        "Gadget"
    }

    fn fields() -> &'static [FieldDescriptor] {
        &GADGET_FIELDS
    }

    fn pk(&self) -> Option<FieldValue> {
        self.id.map(FieldValue::Int)
    }

    fn set_pk(&mut self, pk: FieldValue) {
        self.id = pk.as_integer();
    }

    fn field_value(&self, name: &str) -> Option<FieldValue> {
        match name {
            "id" => Some(self.id.into()),
            "sku" => Some(self.sku.as_str().into()),
            "name" => Some(self.name.as_str().into()),
            "owner" => Some(self.owner.map(FieldValue::reference).unwrap_or(FieldValue::Null)),
            _ => None,
        }
    }

    fn state(&self) -> &RecordState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RecordState {
        &mut self.state
    }
}

/// A different record type with an identical shape, for type-mismatch checks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Sprocket {
    pub id: Option<i64>,
    pub sku: String,
    #[serde(skip)]
    pub state: RecordState,
}

static SPROCKET_FIELDS: [FieldDescriptor; 2] =
    [FieldDescriptor::primary("id"), FieldDescriptor::new("sku")];

impl Record for Sprocket {
    fn type_name() -> &'static str {
        "Sprocket"
    }

    fn fields() -> &'static [FieldDescriptor] {
        &SPROCKET_FIELDS
    }

    fn pk(&self) -> Option<FieldValue> {
        self.id.map(FieldValue::Int)
    }

    fn set_pk(&mut self, pk: FieldValue) {
        self.id = pk.as_integer();
    }

    fn field_value(&self, name: &str) -> Option<FieldValue> {
        match name {
            "id" => Some(self.id.into()),
            "sku" => Some(self.sku.as_str().into()),
            _ => None,
        }
    }

    fn state(&self) -> &RecordState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RecordState {
        &mut self.state
    }
}

/// Record whose serialization always fails.
#[derive(Debug, Clone, Deserialize)]
pub struct Unserializable {
    pub id: Option<i64>,
    pub label: String,
    #[serde(skip)]
    pub state: RecordState,
}

impl Serialize for Unserializable {
    fn serialize<S: Serializer>(&self, _serializer: S) -> Result<S::Ok, S::Error> {
        Err(serde::ser::Error::custom("record cannot be serialized"))
    }
}

static UNSERIALIZABLE_FIELDS: [FieldDescriptor; 2] =
    [FieldDescriptor::primary("id"), FieldDescriptor::new("label")];

impl Record for Unserializable {
    fn type_name() -> &'static str {
        "Unserializable"
    }

    fn fields() -> &'static [FieldDescriptor] {
        &UNSERIALIZABLE_FIELDS
    }

    fn pk(&self) -> Option<FieldValue> {
        self.id.map(FieldValue::Int)
    }

    fn set_pk(&mut self, pk: FieldValue) {
        self.id = pk.as_integer();
    }

    fn field_value(&self, name: &str) -> Option<FieldValue> {
        match name {
            "id" => Some(self.id.into()),
            "label" => Some(self.label.as_str().into()),
            _ => None,
        }
    }

    fn state(&self) -> &RecordState {
        &self.state
    }

    fn state_mut(&mut self) -> &mut RecordState {
        &mut self.state
    }
}
