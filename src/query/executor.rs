//! Query Executor
//!
//! Runs queries against a [`Transport`], honoring the query's cache policy:
//! 1. Usage checks (aggregation rules) before anything is dispatched
//! 2. Compilation into an immutable [`QueryRequest`]
//! 3. Cache lookup and/or transport submission
//! 4. Result resolution into typed outcomes
//!
//! # Execution Pipeline
//!
//! ```text
//! Query → Check → Compile → Cache? → Transport → Cache? → Resolve → Result
//! ```
//!
//! Every operation has an awaited entry point (`find_all`) and a background
//! one (`find_all_in_background`). The background variant performs the usage
//! checks and compilation on the caller's thread, returns immediately and
//! invokes its callback exactly once, on an unspecified runtime worker thread,
//! with either the result or a [`RemoteError`]. A request that can no longer
//! complete (runtime shut down, transport panic) reports
//! [`RemoteError::Interrupted`].

use crate::cache::{MemoryCache, ResultCache};
use crate::entity::Entity;
use crate::query::ast::CachePolicy;
use crate::query::blocking::BlockingQueryExecutor;
use crate::query::builder::Query;
use crate::query::error::{QueryResult, RemoteError, UsageError};
use crate::query::resolver;
use crate::transport::{ExecutionMode, Operation, QueryRequest, Transport};
use serde_json::Value;
use std::future::Future;
use std::marker::PhantomData;
use std::sync::Arc;
use tokio::runtime::Handle;

/// Submits compiled requests, consulting the cache per policy
#[derive(Clone)]
struct Dispatcher {
    transport: Arc<dyn Transport>,
    cache: Arc<dyn ResultCache>,
}

impl Dispatcher {
    async fn submit(&self, request: &QueryRequest) -> Result<Value, RemoteError> {
        let policy = request.query.cache_policy;
        tracing::debug!(
            entity = %request.query.entity,
            operation = %request.operation,
            mode = ?request.mode,
            cache_policy = %policy,
            transport = self.transport.name(),
            "Dispatching query"
        );

        if policy == CachePolicy::IgnoreCache {
            return self.transport.submit(request).await;
        }

        let key = request.cache_key()?;

        if matches!(policy, CachePolicy::CacheOnly | CachePolicy::CacheElseNetwork) {
            if let Some(cached) = self.cache.get(&key).await {
                tracing::debug!(entity = %request.query.entity, "Cache hit");
                return Ok(cached);
            }
            tracing::debug!(entity = %request.query.entity, "Cache miss");

            if policy == CachePolicy::CacheOnly {
                return Err(RemoteError::CacheMiss(format!(
                    "{} on {}",
                    request.operation, request.query.entity
                )));
            }
        }

        let value = self.transport.submit(request).await?;
        if policy.stores_results() {
            self.cache.put(key, value.clone()).await;
        }
        Ok(value)
    }
}

/// Executes queries in awaited or background mode
#[derive(Clone)]
pub struct QueryExecutor {
    dispatcher: Dispatcher,
    runtime: Handle,
}

impl QueryExecutor {
    /// Create an executor with an in-memory result cache
    ///
    /// Background requests are spawned onto `runtime`.
    pub fn new(transport: Arc<dyn Transport>, runtime: Handle) -> Self {
        Self {
            dispatcher: Dispatcher {
                transport,
                cache: Arc::new(MemoryCache::new()),
            },
            runtime,
        }
    }

    /// Replace the result cache
    pub fn with_cache(mut self, cache: Arc<dyn ResultCache>) -> Self {
        self.dispatcher.cache = cache;
        self
    }

    /// The result cache in use
    pub fn cache(&self) -> &Arc<dyn ResultCache> {
        &self.dispatcher.cache
    }

    /// The runtime background requests run on
    pub fn runtime(&self) -> &Handle {
        &self.runtime
    }

    /// Thread-blocking facade over this executor
    pub fn blocking(&self) -> BlockingQueryExecutor<'_> {
        BlockingQueryExecutor::new(self)
    }

    /// Find all matching entities
    pub async fn find_all(&self, query: &Query) -> QueryResult<Vec<Entity>> {
        let request = prepare(query, Operation::FindAll, ExecutionMode::Blocking)?;
        let raw = self.dispatcher.submit(&request).await;
        Ok(resolver::resolve_entities(query.entity_name(), raw)?)
    }

    /// Find the first matching entity
    ///
    /// Fails with [`UsageError::AggregationNotAllowed`] if an aggregation is set.
    pub async fn find_one(&self, query: &Query) -> QueryResult<Option<Entity>> {
        let request = prepare(query, Operation::FindOne, ExecutionMode::Blocking)?;
        let raw = self.dispatcher.submit(&request).await;
        Ok(resolver::resolve_entity(query.entity_name(), raw)?)
    }

    /// Find an entity by its unique id, ignoring the query's conditions
    ///
    /// Fails with [`UsageError::AggregationNotAllowed`] if an aggregation is set.
    pub async fn find_by_id(&self, query: &Query, id: &str) -> QueryResult<Option<Entity>> {
        let operation = Operation::FindById { id: id.to_string() };
        let request = prepare(query, operation, ExecutionMode::Blocking)?;
        let raw = self.dispatcher.submit(&request).await;
        Ok(resolver::resolve_entity(query.entity_name(), raw)?)
    }

    /// Count matching entities
    pub async fn count_all(&self, query: &Query) -> QueryResult<u64> {
        let request = prepare(query, Operation::CountAll, ExecutionMode::Blocking)?;
        let raw = self.dispatcher.submit(&request).await;
        Ok(resolver::resolve_count(raw)?)
    }

    /// Find all matching entities in the background
    pub fn find_all_in_background<F>(&self, query: &Query, callback: F) -> Result<(), UsageError>
    where
        F: FnOnce(Result<Vec<Entity>, RemoteError>) + Send + 'static,
    {
        let request = prepare(query, Operation::FindAll, ExecutionMode::Background)?;
        let entity = query.entity_name().to_string();
        self.spawn(request, callback, move |raw| {
            resolver::resolve_entities(&entity, raw)
        });
        Ok(())
    }

    /// Find the first matching entity in the background
    ///
    /// The aggregation check happens before this returns; the callback only
    /// ever sees remote outcomes.
    pub fn find_one_in_background<F>(&self, query: &Query, callback: F) -> Result<(), UsageError>
    where
        F: FnOnce(Result<Option<Entity>, RemoteError>) + Send + 'static,
    {
        let request = prepare(query, Operation::FindOne, ExecutionMode::Background)?;
        let entity = query.entity_name().to_string();
        self.spawn(request, callback, move |raw| {
            resolver::resolve_entity(&entity, raw)
        });
        Ok(())
    }

    /// Find an entity by its unique id in the background
    pub fn find_by_id_in_background<F>(
        &self,
        query: &Query,
        id: &str,
        callback: F,
    ) -> Result<(), UsageError>
    where
        F: FnOnce(Result<Option<Entity>, RemoteError>) + Send + 'static,
    {
        let operation = Operation::FindById { id: id.to_string() };
        let request = prepare(query, operation, ExecutionMode::Background)?;
        let entity = query.entity_name().to_string();
        self.spawn(request, callback, move |raw| {
            resolver::resolve_entity(&entity, raw)
        });
        Ok(())
    }

    /// Count matching entities in the background
    pub fn count_all_in_background<F>(&self, query: &Query, callback: F) -> Result<(), UsageError>
    where
        F: FnOnce(Result<u64, RemoteError>) + Send + 'static,
    {
        let request = prepare(query, Operation::CountAll, ExecutionMode::Background)?;
        self.spawn(request, callback, resolver::resolve_count);
        Ok(())
    }

    /// Run a request on the runtime and hand the resolved outcome to `callback`
    fn spawn<T, R, F>(&self, request: QueryRequest, callback: F, resolve: R)
    where
        T: Send + 'static,
        R: FnOnce(Result<Value, RemoteError>) -> Result<T, RemoteError> + Send + 'static,
        F: FnOnce(Result<T, RemoteError>) + Send + 'static,
    {
        let dispatcher = self.dispatcher.clone();
        let guard = CallbackGuard::new(callback);
        self.runtime.spawn(async move {
            let raw = dispatcher.submit(&request).await;
            guard.complete(resolve(raw));
        });
    }

    pub(crate) fn block_on<Fut: Future>(&self, future: Fut) -> Fut::Output {
        self.runtime.block_on(future)
    }
}

/// Hands a background outcome to its callback exactly once
///
/// If the task is dropped first (runtime shut down, panic in the transport)
/// the callback receives [`RemoteError::Interrupted`] from whichever thread
/// drops it.
struct CallbackGuard<T, F>
where
    F: FnOnce(Result<T, RemoteError>),
{
    callback: Option<F>,
    _outcome: PhantomData<fn(T)>,
}

impl<T, F> CallbackGuard<T, F>
where
    F: FnOnce(Result<T, RemoteError>),
{
    fn new(callback: F) -> Self {
        Self {
            callback: Some(callback),
            _outcome: PhantomData,
        }
    }

    fn complete(mut self, outcome: Result<T, RemoteError>) {
        if let Some(callback) = self.callback.take() {
            callback(outcome);
        }
    }
}

impl<T, F> Drop for CallbackGuard<T, F>
where
    F: FnOnce(Result<T, RemoteError>),
{
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            tracing::warn!("Background request dropped before completion");
            callback(Err(RemoteError::Interrupted));
        }
    }
}

/// Check usage rules and compile the query into a request
fn prepare(
    query: &Query,
    operation: Operation,
    mode: ExecutionMode,
) -> Result<QueryRequest, UsageError> {
    if operation.is_single_result() && query.aggregation().is_some() {
        return Err(UsageError::AggregationNotAllowed {
            operation: operation.name(),
        });
    }

    Ok(QueryRequest::new(operation, query.compile(), mode))
}
