//! # DataKit
//!
//! Client-side query layer for a remote entity store.
//!
//! ## Features
//!
//! - **Fluent queries**: predicates, one level of AND/OR groups, ordering, paging
//! - **Aggregations**: opaque map/reduce jobs attached to list and count queries
//! - **Three execution styles**: awaited, background with callback, thread-blocking
//! - **Cache policies**: ignore, cache only, cache else network, network then cache
//! - **Pluggable transports**: HTTP and in-memory
//!
//! ## Modules
//!
//! - [`query`]: Query builder, compilation, execution and result resolution
//! - [`transport`]: Transports that submit compiled queries
//! - [`cache`]: Local result cache
//! - [`entity`]: Entity and aggregation values
//! - [`config`]: TOML and environment configuration
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use datakit::query::{Predicates, Query, QueryExecutor};
//! use datakit::transport::{HttpTransport, HttpTransportConfig};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let transport = Arc::new(HttpTransport::new(HttpTransportConfig::default())?);
//!     let executor = QueryExecutor::new(transport, tokio::runtime::Handle::current());
//!
//!     // Adults living in NYC or LA, oldest first
//!     let mut query = Query::new("Person")?;
//!     query.greater_than_or_equal_to("age", 18)?;
//!     query.or().equal_to("city", "NYC")?.equal_to("city", "LA")?;
//!     query.order_descending_by("age").set_limit(10);
//!
//!     let people = executor.find_all(&query).await?;
//!     println!("Found {} people", people.len());
//!
//!     let total = executor.count_all(&query).await?;
//!     println!("{} in total", total);
//!
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod config;
pub mod entity;
pub mod query;
pub mod transport;

// Re-export top-level types for convenience
pub use entity::{Aggregation, Entity};

pub use query::{
    BlockingQueryExecutor, CachePolicy, CompiledQuery, Predicates, Query, QueryError,
    QueryExecutor, QueryResult, RemoteError, UsageError,
};

pub use transport::{
    ExecutionMode, HttpTransport, HttpTransportConfig, MemoryTransport, Operation, QueryRequest,
    Transport,
};

pub use cache::{MemoryCache, ResultCache};

pub use config::{
    CacheConfig, Config, ConfigDiscovery, ConfigError, LoggingConfig, QueryConfig, RemoteConfig,
};
