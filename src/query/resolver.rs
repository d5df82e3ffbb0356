//! Result Resolver
//!
//! Turns raw transport responses into typed outcomes. A `NotFound` from the
//! transport is an empty outcome, never an error: no entity, an empty list
//! or a zero count.

use crate::entity::{type_name, Entity};
use crate::query::error::RemoteError;
use serde_json::Value;

/// Decode a list of entities (`[...]` or `null`)
pub fn resolve_entities(
    entity_name: &str,
    raw: Result<Value, RemoteError>,
) -> Result<Vec<Entity>, RemoteError> {
    match empty_on_not_found(raw)? {
        None | Some(Value::Null) => Ok(Vec::new()),
        Some(Value::Array(items)) => items
            .into_iter()
            .map(|item| Entity::from_value(entity_name, item))
            .collect(),
        Some(other) => Err(unexpected("an array of entities", &other)),
    }
}

/// Decode at most one entity (object, `[...]` or `null`)
pub fn resolve_entity(
    entity_name: &str,
    raw: Result<Value, RemoteError>,
) -> Result<Option<Entity>, RemoteError> {
    match empty_on_not_found(raw)? {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .into_iter()
            .next()
            .map(|item| Entity::from_value(entity_name, item))
            .transpose(),
        Some(value @ Value::Object(_)) => Entity::from_value(entity_name, value).map(Some),
        Some(other) => Err(unexpected("an entity", &other)),
    }
}

/// Decode a count (`n` or `{"count": n}`)
pub fn resolve_count(raw: Result<Value, RemoteError>) -> Result<u64, RemoteError> {
    let value = match empty_on_not_found(raw)? {
        None => return Ok(0),
        Some(Value::Object(mut object)) => object.remove("count").unwrap_or(Value::Null),
        Some(value) => value,
    };

    value
        .as_u64()
        .ok_or_else(|| unexpected("a non-negative integer count", &value))
}

fn empty_on_not_found(raw: Result<Value, RemoteError>) -> Result<Option<Value>, RemoteError> {
    match raw {
        Ok(value) => Ok(Some(value)),
        Err(RemoteError::NotFound(_)) => Ok(None),
        Err(e) => Err(e),
    }
}

fn unexpected(expected: &str, got: &Value) -> RemoteError {
    RemoteError::MalformedResponse(format!("expected {}, got {}", expected, type_name(got)))
}
