//! Entities and aggregation handles
//!
//! The query layer treats both as opaque: an [`Entity`] is a bag of JSON
//! fields plus an optional identifier, and an [`Aggregation`] is a server-side
//! job description forwarded untouched.

use crate::query::RemoteError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Field under which the remote store keeps entity identifiers
pub const ID_FIELD: &str = "_id";

/// A record returned by the remote store
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    /// Collection the entity was fetched from
    #[serde(skip)]
    pub entity_name: String,
    /// Unique identifier, if the store sent one
    #[serde(rename = "_id", default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    /// Remaining fields
    #[serde(flatten)]
    pub fields: Map<String, Value>,
}

impl Entity {
    /// Create an empty entity for the given collection
    pub fn new(entity_name: impl Into<String>) -> Self {
        Self {
            entity_name: entity_name.into(),
            id: None,
            fields: Map::new(),
        }
    }

    /// Decode an entity from a raw JSON document
    pub fn from_value(entity_name: &str, value: Value) -> Result<Self, RemoteError> {
        if !value.is_object() {
            return Err(RemoteError::MalformedResponse(format!(
                "expected an entity object, got {}",
                type_name(&value)
            )));
        }

        let mut entity: Entity = serde_json::from_value(value)
            .map_err(|e| RemoteError::MalformedResponse(e.to_string()))?;
        entity.entity_name = entity_name.to_string();
        Ok(entity)
    }

    /// Get the unique identifier
    pub fn id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    /// Get a field value by key
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.fields.get(key)
    }

    /// Set a field value (builder style)
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Opaque handle to a server-side aggregation (map/reduce) job
///
/// Attaching one to a query changes its semantics: skip is ignored and only
/// list and count results are available.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Aggregation(Value);

impl Aggregation {
    /// Wrap a job description
    pub fn new(job: Value) -> Self {
        Self(job)
    }

    /// The job description as sent on the wire
    pub fn as_value(&self) -> &Value {
        &self.0
    }
}

pub(crate) fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
