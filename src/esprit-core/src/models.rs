use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

/// A stored document: field name to JSON value.
pub type Record = Map<String, Value>;

pub const ID_FIELD: &str = "id";
pub const CREATED_FIELD: &str = "created_date";
pub const UPDATED_FIELD: &str = "last_updated";

/// Timestamps are written at one-second resolution.
pub const TIMESTAMP_FORMAT: &str = "%Y-%m-%dT%H:%M:%SZ";

pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.format(TIMESTAMP_FORMAT).to_string()
}

/// Dao wraps a record with the identity and timestamp fields the lifecycle
/// manager maintains.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dao {
    data: Record,
}

impl Dao {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_record(data: Record) -> Self {
        Self { data }
    }

    pub fn id(&self) -> Option<&str> {
        self.data.get(ID_FIELD).and_then(Value::as_str)
    }

    pub fn set_id(&mut self, id: impl Into<String>) {
        self.data
            .insert(ID_FIELD.to_string(), Value::String(id.into()));
    }

    pub fn created_date(&self) -> Option<&str> {
        self.data.get(CREATED_FIELD).and_then(Value::as_str)
    }

    pub fn set_created_date(&mut self, at: impl Into<String>) {
        self.data
            .insert(CREATED_FIELD.to_string(), Value::String(at.into()));
    }

    pub fn last_updated(&self) -> Option<&str> {
        self.data.get(UPDATED_FIELD).and_then(Value::as_str)
    }

    pub fn set_last_updated(&mut self, at: impl Into<String>) {
        self.data
            .insert(UPDATED_FIELD.to_string(), Value::String(at.into()));
    }

    pub fn has(&self, field: &str) -> bool {
        self.data.contains_key(field)
    }

    pub fn data(&self) -> &Record {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut Record {
        &mut self.data
    }

    pub fn into_record(self) -> Record {
        self.data
    }

    pub fn to_json(&self) -> String {
        Value::Object(self.data.clone()).to_string()
    }

    /// A fresh identity: 32 lowercase hex characters.
    pub fn makeid() -> String {
        uuid::Uuid::new_v4().simple().to_string()
    }
}

impl From<Record> for Dao {
    fn from(data: Record) -> Self {
        Self::from_record(data)
    }
}
