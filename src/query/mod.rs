//! DataKit Query Layer
//!
//! Describes, compiles and executes entity queries:
//!
//! - **Builder**: [`Query`] and its [`Scope`] proxies collect conditions
//! - **Conditions**: root conditions plus one level of AND/OR groups
//! - **Compiled**: immutable wire description sent to the transport
//! - **Executor**: awaited, background and thread-blocking execution
//! - **Resolver**: raw responses to typed outcomes
//! - **Parser**: textual predicates (`age >= 18`) for the command line
//!
//! # Examples
//!
//! ```rust,ignore
//! use datakit::query::{Predicates, Query, QueryExecutor};
//!
//! let mut query = Query::new("Person")?;
//! query.greater_than("age", 18)?;
//! query.or().equal_to("city", "NYC")?.equal_to("city", "LA")?;
//! query.order_descending_by("age").set_limit(10);
//!
//! // Awaited
//! let people = executor.find_all(&query).await?;
//!
//! // Background
//! executor.count_all_in_background(&query, |count| println!("{:?}", count))?;
//! ```

mod ast;
mod blocking;
mod builder;
mod compiled;
mod conditions;
mod error;
mod executor;
mod parser;
mod resolver;

pub use ast::{
    CachePolicy, Condition, Group, GroupLogic, Operand, OperandShape, Operator, Order,
    RegexOptions, SortDirection,
};
pub use blocking::BlockingQueryExecutor;
pub use builder::{Predicates, Query, Scope};
pub use compiled::{CompiledCondition, CompiledGroup, CompiledQuery};
pub use conditions::{ConditionTree, ScopeHandle};
pub use error::{ParseError, QueryError, QueryResult, RemoteError, UsageError};
pub use executor::QueryExecutor;
pub use parser::{apply_predicate, parse_predicate};
pub use resolver::{resolve_count, resolve_entities, resolve_entity};
