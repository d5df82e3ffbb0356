//! Transports
//!
//! A transport takes a compiled query description and returns the raw JSON
//! response of the remote store. Everything network-related (connections,
//! authentication, retries, timeouts) belongs here, not in the query layer.
//!
//! - [`HttpTransport`]: REST client for a remote DataKit server
//! - [`MemoryTransport`]: in-process store evaluating queries over JSON documents

mod http;
mod memory;

pub use http::{HttpTransport, HttpTransportConfig};
pub use memory::MemoryTransport;

use crate::query::{CompiledQuery, RemoteError};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Common trait for all transports
#[async_trait]
pub trait Transport: Send + Sync {
    /// Transport name for logging
    fn name(&self) -> &str;

    /// Submit a request and return the raw response body
    async fn submit(&self, request: &QueryRequest) -> Result<Value, RemoteError>;
}

/// What the remote store should do with a compiled query
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    /// All matching entities
    FindAll,
    /// The first matching entity
    FindOne,
    /// The entity with the given identifier
    FindById { id: String },
    /// Number of matching entities
    CountAll,
}

impl Operation {
    /// Operation name as used on the wire and in logs
    pub fn name(&self) -> &'static str {
        match self {
            Operation::FindAll => "find_all",
            Operation::FindOne => "find_one",
            Operation::FindById { .. } => "find_by_id",
            Operation::CountAll => "count_all",
        }
    }

    /// Whether the operation yields at most one entity
    pub fn is_single_result(&self) -> bool {
        matches!(self, Operation::FindOne | Operation::FindById { .. })
    }

    /// Identifier for by-id lookups
    pub fn id(&self) -> Option<&str> {
        match self {
            Operation::FindById { id } => Some(id),
            _ => None,
        }
    }
}

impl std::fmt::Display for Operation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// How the caller is waiting for the result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExecutionMode {
    /// Caller waits for the outcome
    Blocking,
    /// Caller gets the outcome through a callback
    Background,
}

/// A compiled query plus the operation to run on it
#[derive(Debug, Clone, Serialize)]
pub struct QueryRequest {
    #[serde(flatten)]
    pub operation: Operation,
    pub query: CompiledQuery,
    #[serde(skip)]
    pub mode: ExecutionMode,
}

impl QueryRequest {
    /// Create a new request
    pub fn new(operation: Operation, query: CompiledQuery, mode: ExecutionMode) -> Self {
        Self {
            operation,
            query,
            mode,
        }
    }

    /// Cache key of this request's result
    pub fn cache_key(&self) -> Result<String, RemoteError> {
        Ok(self
            .query
            .cache_key(self.operation.name(), self.operation.id())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::Query;
    use serde_json::json;

    #[test]
    fn test_request_body() {
        let query = Query::new("Person").unwrap().compile();
        let request = QueryRequest::new(
            Operation::FindById {
                id: "p1".to_string(),
            },
            query,
            ExecutionMode::Background,
        );

        let body = serde_json::to_value(&request).unwrap();
        assert_eq!(body["op"], "find_by_id");
        assert_eq!(body["id"], "p1");
        assert_eq!(body["query"]["entity"], "Person");
        assert!(body.get("mode").is_none());
    }

    #[test]
    fn test_operation_names() {
        assert_eq!(Operation::CountAll.to_string(), "count_all");
        assert!(Operation::FindOne.is_single_result());
        assert!(!Operation::FindAll.is_single_result());
        assert_eq!(
            serde_json::to_value(Operation::FindAll).unwrap(),
            json!({"op": "find_all"})
        );
    }
}
