//! In-memory Transport
//!
//! Keeps JSON documents per entity collection and evaluates compiled queries
//! the way a remote store would:
//!
//! ```text
//! Request → Collection → Filter (root AND groups) → Order → Skip/Limit → Response
//! ```
//!
//! Keys may address nested fields with dots (`address.city`). Aggregation
//! jobs cannot run in-process and are rejected.

use super::{Operation, QueryRequest, Transport};
use crate::entity::ID_FIELD;
use crate::query::{CompiledCondition, CompiledQuery, GroupLogic, Operator, RegexOptions};
use crate::query::{RemoteError, SortDirection};
use async_trait::async_trait;
use regex::RegexBuilder;
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use tokio::sync::RwLock;

/// Transport backed by in-process collections
#[derive(Default)]
pub struct MemoryTransport {
    collections: RwLock<HashMap<String, Vec<Value>>>,
    submitted: AtomicU64,
}

impl MemoryTransport {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a document into a collection
    ///
    /// Documents without an `_id` get a generated one. Returns the id.
    pub async fn insert(&self, entity: &str, mut document: Value) -> Result<String, RemoteError> {
        let object = document.as_object_mut().ok_or_else(|| {
            RemoteError::MalformedResponse("documents must be JSON objects".to_string())
        })?;

        let id = match object.get(ID_FIELD).and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => {
                let id = uuid::Uuid::new_v4().to_string();
                object.insert(ID_FIELD.to_string(), Value::String(id.clone()));
                id
            }
        };

        self.collections
            .write()
            .await
            .entry(entity.to_string())
            .or_default()
            .push(document);
        Ok(id)
    }

    /// Number of requests submitted so far
    pub fn submitted(&self) -> u64 {
        self.submitted.load(AtomicOrdering::Relaxed)
    }

    /// Remove every document of every collection
    pub async fn clear(&self) {
        self.collections.write().await.clear();
    }
}

#[async_trait]
impl Transport for MemoryTransport {
    fn name(&self) -> &str {
        "memory"
    }

    async fn submit(&self, request: &QueryRequest) -> Result<Value, RemoteError> {
        self.submitted.fetch_add(1, AtomicOrdering::Relaxed);
        let query = &request.query;

        if query.aggregation.is_some() {
            return Err(RemoteError::Unsupported(
                "aggregation jobs cannot run in memory".to_string(),
            ));
        }

        let collections = self.collections.read().await;
        let documents = collections
            .get(&query.entity)
            .map(Vec::as_slice)
            .unwrap_or_default();

        if let Operation::FindById { id } = &request.operation {
            let found = documents
                .iter()
                .find(|doc| doc.get(ID_FIELD).and_then(Value::as_str) == Some(id.as_str()));
            return Ok(found.cloned().unwrap_or(Value::Null));
        }

        let mut matched = Vec::new();
        for doc in documents {
            if matches_query(doc, query)? {
                matched.push(doc);
            }
        }

        if let Some(order) = &query.order {
            matched.sort_by(|a, b| {
                compare_missing_last(lookup(a, &order.key), lookup(b, &order.key), order.direction)
            });
        }

        // Counts cover every match, not one page
        if request.operation == Operation::CountAll {
            return Ok(json!({ "count": matched.len() }));
        }

        let limit = if query.limit == 0 {
            usize::MAX
        } else {
            query.limit as usize
        };
        let page = matched.into_iter().skip(query.skip as usize).take(limit);

        Ok(match request.operation {
            Operation::FindAll => Value::Array(page.cloned().collect()),
            Operation::FindOne => page.take(1).next().cloned().unwrap_or(Value::Null),
            Operation::CountAll | Operation::FindById { .. } => Value::Null,
        })
    }
}

/// Root conditions and every group must hold
fn matches_query(doc: &Value, query: &CompiledQuery) -> Result<bool, RemoteError> {
    for condition in &query.conditions {
        if !matches_condition(doc, condition)? {
            return Ok(false);
        }
    }

    for group in &query.groups {
        if group.members.is_empty() {
            continue;
        }
        let matched = match group.logic {
            GroupLogic::And => {
                let mut all = true;
                for member in &group.members {
                    if !matches_condition(doc, member)? {
                        all = false;
                        break;
                    }
                }
                all
            }
            GroupLogic::Or => {
                let mut any = false;
                for member in &group.members {
                    if matches_condition(doc, member)? {
                        any = true;
                        break;
                    }
                }
                any
            }
        };
        if !matched {
            return Ok(false);
        }
    }

    Ok(true)
}

fn matches_condition(doc: &Value, condition: &CompiledCondition) -> Result<bool, RemoteError> {
    let field = lookup(doc, &condition.key);
    let operand = &condition.operand;

    Ok(match condition.op {
        Operator::Exists => field.is_some(),
        Operator::NotExists => field.is_none(),
        Operator::EqualTo => field.is_some_and(|v| values_equal(v, operand)),
        Operator::NotEqualTo => !field.is_some_and(|v| values_equal(v, operand)),
        Operator::LessThan => compare_field(field, operand, |o| o == Ordering::Less),
        Operator::LessThanOrEqualTo => compare_field(field, operand, |o| o != Ordering::Greater),
        Operator::GreaterThan => compare_field(field, operand, |o| o == Ordering::Greater),
        Operator::GreaterThanOrEqualTo => compare_field(field, operand, |o| o != Ordering::Less),
        Operator::ContainedIn => {
            let wanted = list(operand)?;
            field.is_some_and(|v| contained_in(v, wanted))
        }
        Operator::NotContainedIn => {
            let wanted = list(operand)?;
            !field.is_some_and(|v| contained_in(v, wanted))
        }
        Operator::ContainsAllIn => match (field, list(operand)?) {
            (Some(Value::Array(items)), wanted) => wanted
                .iter()
                .all(|w| items.iter().any(|item| values_equal(item, w))),
            _ => false,
        },
        Operator::ContainsString => text_match(field, operand, |s, t| s.contains(t))?,
        Operator::HasPrefix => text_match(field, operand, |s, t| s.starts_with(t))?,
        Operator::HasSuffix => text_match(field, operand, |s, t| s.ends_with(t))?,
        Operator::MatchesRegex => match field.and_then(Value::as_str) {
            Some(s) => regex_match(s, operand)?,
            None => false,
        },
    })
}

/// Resolve a dotted key path
fn lookup<'a>(doc: &'a Value, key: &str) -> Option<&'a Value> {
    key.split('.').try_fold(doc, |value, part| value.get(part))
}

fn list(operand: &Value) -> Result<&[Value], RemoteError> {
    operand.as_array().map(Vec::as_slice).ok_or_else(|| rejected("expected an array operand"))
}

fn rejected(message: &str) -> RemoteError {
    RemoteError::ApiError {
        status: 400,
        message: message.to_string(),
    }
}

/// Array fields match if any element is listed
fn contained_in(field: &Value, wanted: &[Value]) -> bool {
    match field {
        Value::Array(items) => items.iter().any(|item| wanted.iter().any(|w| values_equal(item, w))),
        other => wanted.iter().any(|w| values_equal(other, w)),
    }
}

fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(_), Value::Number(_)) => compare_values(a, b) == Some(Ordering::Equal),
        _ => a == b,
    }
}

/// Order numbers numerically and strings lexicographically; other pairs are incomparable
fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

fn compare_field(field: Option<&Value>, operand: &Value, accept: impl Fn(Ordering) -> bool) -> bool {
    field
        .and_then(|v| compare_values(v, operand))
        .is_some_and(accept)
}

/// Missing values sort last in either direction
fn compare_missing_last(a: Option<&Value>, b: Option<&Value>, direction: SortDirection) -> Ordering {
    match (a, b) {
        (Some(x), Some(y)) => {
            let ordering = compare_values(x, y).unwrap_or(Ordering::Equal);
            match direction {
                SortDirection::Ascending => ordering,
                SortDirection::Descending => ordering.reverse(),
            }
        }
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

fn text_match(
    field: Option<&Value>,
    operand: &Value,
    test: impl Fn(&str, &str) -> bool,
) -> Result<bool, RemoteError> {
    let needle = operand
        .as_str()
        .ok_or_else(|| rejected("expected a string operand"))?;
    Ok(field.and_then(Value::as_str).is_some_and(|s| test(s, needle)))
}

fn regex_match(haystack: &str, operand: &Value) -> Result<bool, RemoteError> {
    let pattern = operand
        .get("pattern")
        .and_then(Value::as_str)
        .ok_or_else(|| rejected("regex operand is missing its pattern"))?;
    let flags = operand.get("options").and_then(Value::as_str).unwrap_or("");
    let options =
        RegexOptions::from_flags(flags).ok_or_else(|| rejected("unknown regex option"))?;

    let regex = RegexBuilder::new(pattern)
        .case_insensitive(options.case_insensitive)
        .multi_line(options.multi_line)
        .dot_matches_new_line(options.dot_all)
        .ignore_whitespace(options.extended)
        .build()
        .map_err(|e| rejected(&format!("invalid regex: {}", e)))?;

    Ok(regex.is_match(haystack))
}
