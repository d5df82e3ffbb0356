//! Wire query description
//!
//! A [`CompiledQuery`] is the immutable snapshot of a [`Query`](super::Query)
//! that is handed to a transport. Conditions and groups keep their insertion
//! order, since some backends pick indexes by predicate order.
//!
//! ```text
//! {
//!   "entity": "Person",
//!   "conditions": [{"key": "age", "op": "greater_than", "operand": 18}],
//!   "groups": [{"logic": "or", "members": [...]}],
//!   "order": {"key": "name", "dir": "asc"},
//!   "limit": 10,
//!   "skip": 0,
//!   "aggregation": {...},
//!   "cache_policy": "ignore_cache"
//! }
//! ```

use crate::entity::Aggregation;
use crate::query::ast::{CachePolicy, Condition, GroupLogic, Operator, Order};
use crate::query::conditions::ConditionTree;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A compiled leaf condition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledCondition {
    pub key: String,
    pub op: Operator,
    #[serde(default)]
    pub operand: Value,
}

impl From<&Condition> for CompiledCondition {
    fn from(condition: &Condition) -> Self {
        Self {
            key: condition.key.clone(),
            op: condition.operator,
            operand: condition.operand.to_wire(),
        }
    }
}

/// A compiled group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledGroup {
    pub logic: GroupLogic,
    pub members: Vec<CompiledCondition>,
}

/// Immutable wire description of a query
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompiledQuery {
    pub entity: String,
    pub conditions: Vec<CompiledCondition>,
    pub groups: Vec<CompiledGroup>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub order: Option<Order>,
    pub limit: u32,
    pub skip: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregation: Option<Aggregation>,
    #[serde(default)]
    pub cache_policy: CachePolicy,
}

/// Borrowed view of the parts of a description that select results
#[derive(Serialize)]
struct CacheKeyView<'a> {
    op: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    id: Option<&'a str>,
    entity: &'a str,
    conditions: &'a [CompiledCondition],
    groups: &'a [CompiledGroup],
    order: &'a Option<Order>,
    limit: u32,
    skip: u32,
    aggregation: &'a Option<Aggregation>,
}

impl CompiledQuery {
    pub(crate) fn from_parts(
        entity: &str,
        tree: &ConditionTree,
        order: Option<&Order>,
        limit: u32,
        skip: u32,
        aggregation: Option<&Aggregation>,
        cache_policy: CachePolicy,
    ) -> Self {
        Self {
            entity: entity.to_string(),
            conditions: tree.root().iter().map(CompiledCondition::from).collect(),
            groups: tree
                .groups()
                .iter()
                .map(|g| CompiledGroup {
                    logic: g.logic,
                    members: g.members.iter().map(CompiledCondition::from).collect(),
                })
                .collect(),
            order: order.cloned(),
            limit,
            // Skip is meaningless once an aggregation shapes the result
            skip: if aggregation.is_some() { 0 } else { skip },
            aggregation: aggregation.cloned(),
            cache_policy,
        }
    }

    /// Serialize to canonical JSON bytes
    pub fn to_bytes(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    /// Key identifying the result of `op` (and `id`) for this description
    ///
    /// The cache directive is excluded so that every policy shares entries.
    pub fn cache_key(&self, op: &str, id: Option<&str>) -> Result<String, serde_json::Error> {
        serde_json::to_string(&CacheKeyView {
            op,
            id,
            entity: &self.entity,
            conditions: &self.conditions,
            groups: &self.groups,
            order: &self.order,
            limit: self.limit,
            skip: self.skip,
            aggregation: &self.aggregation,
        })
    }
}
