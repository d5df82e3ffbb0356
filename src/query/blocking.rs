//! Thread-blocking facade over [`QueryExecutor`]
//!
//! For callers outside any async context. Each call parks the calling OS
//! thread until the outcome is known. Calling these from inside the runtime
//! panics, as with any `block_on`.

use crate::entity::Entity;
use crate::query::builder::Query;
use crate::query::error::QueryResult;
use crate::query::executor::QueryExecutor;

/// Borrowed blocking view of an executor
pub struct BlockingQueryExecutor<'e> {
    inner: &'e QueryExecutor,
}

impl<'e> BlockingQueryExecutor<'e> {
    pub(crate) fn new(inner: &'e QueryExecutor) -> Self {
        Self { inner }
    }

    /// Every entity matching the query
    pub fn find_all(&self, query: &Query) -> QueryResult<Vec<Entity>> {
        self.inner.block_on(self.inner.find_all(query))
    }

    /// First matching entity, or `None`
    pub fn find_one(&self, query: &Query) -> QueryResult<Option<Entity>> {
        self.inner.block_on(self.inner.find_one(query))
    }

    /// Entity with the given id, or `None`
    pub fn find_by_id(&self, query: &Query, id: &str) -> QueryResult<Option<Entity>> {
        self.inner.block_on(self.inner.find_by_id(query, id))
    }

    /// Number of matching entities
    pub fn count_all(&self, query: &Query) -> QueryResult<u64> {
        self.inner.block_on(self.inner.count_all(query))
    }
}
