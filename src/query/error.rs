//! Query error types
//!
//! Two families of failure exist and never mix:
//!
//! - [`UsageError`]: the caller broke the query contract. Reported at the call
//!   site before anything is sent to the remote store.
//! - [`RemoteError`]: the request was dispatched and failed. Reported through
//!   the execution result or the completion callback.
//!
//! Empty outcomes (no match, zero count) are successes, not errors.

use crate::query::ast::{OperandShape, Operator};
use thiserror::Error;

/// Caller-contract violations
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UsageError {
    /// Query created without an entity name
    #[error("Entity name must not be empty")]
    EmptyEntityName,

    /// Condition added without a key
    #[error("Condition key must not be empty")]
    EmptyKey,

    /// Operand does not match the operator's shape
    #[error("Invalid operand for {operator}: expected {expected}")]
    InvalidOperand {
        operator: Operator,
        expected: OperandShape,
    },

    /// Scope handle was invalidated by a reset or belongs to another query
    #[error("Scope handle is stale or belongs to a different query")]
    InvalidScope,

    /// Single-result fetch attempted on an aggregation query
    #[error("{operation} is not allowed while an aggregation is set")]
    AggregationNotAllowed { operation: &'static str },
}

/// Failures reported by the transport, the cache or the response decoder
#[derive(Error, Debug)]
pub enum RemoteError {
    /// Remote service could not be reached
    #[error("Remote store unavailable")]
    Unavailable,

    /// Request timed out
    #[error("Request timeout")]
    Timeout,

    /// HTTP client failure
    #[error("Request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// Credentials were rejected
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Collection or entity does not exist
    #[error("Not found: {0}")]
    NotFound(String),

    /// Remote store returned an error status
    #[error("API error {status}: {message}")]
    ApiError { status: u16, message: String },

    /// Response body had an unexpected shape
    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    /// Cache-only query found nothing cached
    #[error("No cached result for {0}")]
    CacheMiss(String),

    /// Transport cannot execute this kind of query
    #[error("Unsupported query: {0}")]
    Unsupported(String),

    /// Background request was dropped before it completed
    #[error("Background request interrupted before completion")]
    Interrupted,

    /// Request or response (de)serialization failed
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<serde_json::Error> for RemoteError {
    fn from(err: serde_json::Error) -> Self {
        RemoteError::Serialization(err.to_string())
    }
}

/// Any failure of an awaited or blocking execution
#[derive(Error, Debug)]
pub enum QueryError {
    /// Caller-contract violation, nothing was dispatched
    #[error("Usage error: {0}")]
    Usage(#[from] UsageError),

    /// Dispatched request failed
    #[error("Remote error: {0}")]
    Remote(#[from] RemoteError),
}

impl QueryError {
    /// Returns true if this is a caller-contract violation
    pub fn is_usage(&self) -> bool {
        matches!(self, QueryError::Usage(_))
    }
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

/// Failures turning a textual predicate into a condition
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParseError {
    /// Input does not follow the predicate grammar
    #[error("Invalid predicate '{input}': {reason}")]
    Syntax { input: String, reason: String },

    /// Predicate parsed but the condition is not valid
    #[error(transparent)]
    Usage(#[from] UsageError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = UsageError::InvalidOperand {
            operator: Operator::ContainedIn,
            expected: OperandShape::List,
        };
        assert_eq!(
            err.to_string(),
            "Invalid operand for contained_in: expected an array of values"
        );

        let err = UsageError::AggregationNotAllowed {
            operation: "find_one",
        };
        assert_eq!(
            err.to_string(),
            "find_one is not allowed while an aggregation is set"
        );
    }

    #[test]
    fn test_query_error_conversion() {
        let err: QueryError = UsageError::InvalidScope.into();
        assert!(err.is_usage());

        let err: QueryError = RemoteError::Timeout.into();
        assert!(!err.is_usage());
    }

    #[test]
    fn test_json_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let err: RemoteError = json_err.into();
        assert!(matches!(err, RemoteError::Serialization(_)));
    }
}
