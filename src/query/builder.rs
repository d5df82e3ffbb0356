//! Query Builder
//!
//! [`Query`] collects everything needed to describe one fetch: entity name,
//! conditions, ordering, pagination, aggregation and cache policy.
//!
//! Predicate methods live on the [`Predicates`] trait, shared by the query
//! itself and by the [`Scope`] proxies returned from [`Query::or`] and
//! [`Query::and`]. A scope borrows the query and routes every predicate into
//! the group it opened, so grouped conditions chain exactly like root ones:
//!
//! ```rust
//! use datakit::query::{Predicates, Query};
//!
//! # fn main() -> Result<(), datakit::query::UsageError> {
//! let mut query = Query::new("Person")?;
//! query.greater_than("age", 18)?;
//! query.or().equal_to("city", "NYC")?.equal_to("city", "LA")?;
//! query.set_limit(10);
//!
//! let compiled = query.compile();
//! assert_eq!(compiled.conditions.len(), 1);
//! assert_eq!(compiled.groups[0].members.len(), 2);
//! # Ok(())
//! # }
//! ```
//!
//! Grouping is one level deep: a scope cannot open a nested group, and once a
//! scope is dropped its group cannot be re-entered.

use crate::entity::Aggregation;
use crate::query::ast::*;
use crate::query::compiled::CompiledQuery;
use crate::query::conditions::{ConditionTree, ScopeHandle};
use crate::query::error::UsageError;
use serde_json::Value;

/// Predicate-adding capability shared by [`Query`] and [`Scope`]
pub trait Predicates {
    /// Add a condition with an explicit operator and operand
    ///
    /// Fails with [`UsageError::InvalidOperand`] if the operand shape does not
    /// match the operator.
    fn add_condition(
        &mut self,
        key: &str,
        operator: Operator,
        operand: Operand,
    ) -> Result<&mut Self, UsageError>;

    /// Key equals value
    fn equal_to(&mut self, key: &str, value: impl Into<Value>) -> Result<&mut Self, UsageError> {
        self.add_condition(key, Operator::EqualTo, Operand::Value(value.into()))
    }

    /// Key is less than value
    fn less_than(&mut self, key: &str, value: impl Into<Value>) -> Result<&mut Self, UsageError> {
        self.add_condition(key, Operator::LessThan, Operand::Value(value.into()))
    }

    /// Key is less than or equal to value
    fn less_than_or_equal_to(
        &mut self,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<&mut Self, UsageError> {
        self.add_condition(key, Operator::LessThanOrEqualTo, Operand::Value(value.into()))
    }

    /// Key is greater than value
    fn greater_than(
        &mut self,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<&mut Self, UsageError> {
        self.add_condition(key, Operator::GreaterThan, Operand::Value(value.into()))
    }

    /// Key is greater than or equal to value
    fn greater_than_or_equal_to(
        &mut self,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<&mut Self, UsageError> {
        self.add_condition(
            key,
            Operator::GreaterThanOrEqualTo,
            Operand::Value(value.into()),
        )
    }

    /// Key differs from value
    fn not_equal_to(
        &mut self,
        key: &str,
        value: impl Into<Value>,
    ) -> Result<&mut Self, UsageError> {
        self.add_condition(key, Operator::NotEqualTo, Operand::Value(value.into()))
    }

    /// Key value is one of `values`
    fn contained_in<I, V>(&mut self, key: &str, values: I) -> Result<&mut Self, UsageError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let list = values.into_iter().map(Into::into).collect();
        self.add_condition(key, Operator::ContainedIn, Operand::List(list))
    }

    /// Key value is none of `values`
    fn not_contained_in<I, V>(&mut self, key: &str, values: I) -> Result<&mut Self, UsageError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let list = values.into_iter().map(Into::into).collect();
        self.add_condition(key, Operator::NotContainedIn, Operand::List(list))
    }

    /// Key value (an array) contains every one of `values`
    fn contains_all_in<I, V>(&mut self, key: &str, values: I) -> Result<&mut Self, UsageError>
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        let list = values.into_iter().map(Into::into).collect();
        self.add_condition(key, Operator::ContainsAllIn, Operand::List(list))
    }

    /// Key matches a regex with no options set
    fn matches_regex(
        &mut self,
        key: &str,
        pattern: impl Into<String>,
    ) -> Result<&mut Self, UsageError> {
        self.matches_regex_with(key, pattern, RegexOptions::default())
    }

    /// Key matches a regex using the given options
    fn matches_regex_with(
        &mut self,
        key: &str,
        pattern: impl Into<String>,
        options: RegexOptions,
    ) -> Result<&mut Self, UsageError> {
        let operand = Operand::Regex {
            pattern: pattern.into(),
            options,
        };
        self.add_condition(key, Operator::MatchesRegex, operand)
    }

    /// Key value contains the substring
    fn contains_string(
        &mut self,
        key: &str,
        needle: impl Into<String>,
    ) -> Result<&mut Self, UsageError> {
        let operand = Operand::Value(Value::String(needle.into()));
        self.add_condition(key, Operator::ContainsString, operand)
    }

    /// Key value starts with the prefix
    fn has_prefix(
        &mut self,
        key: &str,
        prefix: impl Into<String>,
    ) -> Result<&mut Self, UsageError> {
        let operand = Operand::Value(Value::String(prefix.into()));
        self.add_condition(key, Operator::HasPrefix, operand)
    }

    /// Key value ends with the suffix
    fn has_suffix(
        &mut self,
        key: &str,
        suffix: impl Into<String>,
    ) -> Result<&mut Self, UsageError> {
        let operand = Operand::Value(Value::String(suffix.into()));
        self.add_condition(key, Operator::HasSuffix, operand)
    }

    /// Key is present
    fn exists(&mut self, key: &str) -> Result<&mut Self, UsageError> {
        self.add_condition(key, Operator::Exists, Operand::None)
    }

    /// Key is absent
    fn not_exists(&mut self, key: &str) -> Result<&mut Self, UsageError> {
        self.add_condition(key, Operator::NotExists, Operand::None)
    }
}

/// A fetch/count request against one entity collection
///
/// Not safe for concurrent mutation; compile it into a [`CompiledQuery`]
/// snapshot to share it.
#[derive(Debug, Clone)]
pub struct Query {
    entity_name: String,
    limit: u32,
    skip: u32,
    order: Option<Order>,
    aggregation: Option<Aggregation>,
    cache_policy: CachePolicy,
    conditions: ConditionTree,
}

impl Query {
    /// Create a query for the given entity collection
    pub fn new(entity_name: impl Into<String>) -> Result<Self, UsageError> {
        let entity_name = entity_name.into();
        if entity_name.is_empty() {
            return Err(UsageError::EmptyEntityName);
        }

        Ok(Self {
            entity_name,
            limit: 0,
            skip: 0,
            order: None,
            aggregation: None,
            cache_policy: CachePolicy::default(),
            conditions: ConditionTree::new(),
        })
    }

    /// The entity collection this query targets
    pub fn entity_name(&self) -> &str {
        &self.entity_name
    }

    /// Maximum number of results (0 = backend default)
    pub fn limit(&self) -> u32 {
        self.limit
    }

    /// Set the maximum number of results (0 = backend default)
    pub fn set_limit(&mut self, limit: u32) -> &mut Self {
        self.limit = limit;
        self
    }

    /// Number of results to skip
    pub fn skip(&self) -> u32 {
        self.skip
    }

    /// Set the number of results to skip
    ///
    /// Has no effect on execution while an aggregation is attached.
    pub fn set_skip(&mut self, skip: u32) -> &mut Self {
        self.skip = skip;
        self
    }

    /// The active ordering
    pub fn order(&self) -> Option<&Order> {
        self.order.as_ref()
    }

    /// Sort ascending by key, replacing any previous ordering
    pub fn order_ascending_by(&mut self, key: impl Into<String>) -> &mut Self {
        self.order = Some(Order {
            key: key.into(),
            direction: SortDirection::Ascending,
        });
        self
    }

    /// Sort descending by key, replacing any previous ordering
    pub fn order_descending_by(&mut self, key: impl Into<String>) -> &mut Self {
        self.order = Some(Order {
            key: key.into(),
            direction: SortDirection::Descending,
        });
        self
    }

    /// The attached aggregation job
    pub fn aggregation(&self) -> Option<&Aggregation> {
        self.aggregation.as_ref()
    }

    /// Attach an aggregation job
    pub fn set_aggregation(&mut self, aggregation: Aggregation) -> &mut Self {
        self.aggregation = Some(aggregation);
        self
    }

    /// Detach the aggregation job
    pub fn clear_aggregation(&mut self) -> &mut Self {
        self.aggregation = None;
        self
    }

    /// The active cache policy
    pub fn cache_policy(&self) -> CachePolicy {
        self.cache_policy
    }

    /// Select the cache policy
    pub fn set_cache_policy(&mut self, policy: CachePolicy) -> &mut Self {
        self.cache_policy = policy;
        self
    }

    /// The condition tree
    pub fn conditions(&self) -> &ConditionTree {
        &self.conditions
    }

    /// Open an OR group and return a proxy that adds conditions to it
    pub fn or(&mut self) -> Scope<'_> {
        let handle = self.open_group(GroupLogic::Or);
        Scope {
            query: self,
            handle,
        }
    }

    /// Open an AND group and return a proxy that adds conditions to it
    pub fn and(&mut self) -> Scope<'_> {
        let handle = self.open_group(GroupLogic::And);
        Scope {
            query: self,
            handle,
        }
    }

    /// Open a group and return its raw handle
    pub fn open_group(&mut self, logic: GroupLogic) -> ScopeHandle {
        self.conditions.open_group(logic)
    }

    /// Add a condition to the group bound to `handle`
    pub fn add_grouped_condition(
        &mut self,
        handle: ScopeHandle,
        key: &str,
        operator: Operator,
        operand: Operand,
    ) -> Result<&mut Self, UsageError> {
        if !self.conditions.is_valid(handle) {
            return Err(UsageError::InvalidScope);
        }
        let condition = Condition::new(key, operator, operand)?;
        self.conditions.add_grouped(handle, condition)?;
        Ok(self)
    }

    /// Clear conditions, groups, ordering, pagination and aggregation
    ///
    /// The entity name and cache policy are kept. Every scope handle issued
    /// before the reset becomes invalid.
    pub fn reset(&mut self) {
        self.conditions.clear();
        self.order = None;
        self.limit = 0;
        self.skip = 0;
        self.aggregation = None;
    }

    /// Compile the current state into an immutable wire description
    pub fn compile(&self) -> CompiledQuery {
        CompiledQuery::from_parts(
            &self.entity_name,
            &self.conditions,
            self.order.as_ref(),
            self.limit,
            self.skip,
            self.aggregation.as_ref(),
            self.cache_policy,
        )
    }
}

impl Predicates for Query {
    fn add_condition(
        &mut self,
        key: &str,
        operator: Operator,
        operand: Operand,
    ) -> Result<&mut Self, UsageError> {
        let condition = Condition::new(key, operator, operand)?;
        self.conditions.add_root(condition);
        Ok(self)
    }
}

/// Proxy routing predicates into one group of a borrowed [`Query`]
#[derive(Debug)]
pub struct Scope<'q> {
    query: &'q mut Query,
    handle: ScopeHandle,
}

impl<'q> Scope<'q> {
    /// Handle of the group this scope writes to
    pub fn handle(&self) -> ScopeHandle {
        self.handle
    }

    /// Open another OR group on the same query
    pub fn or(&mut self) -> Scope<'_> {
        self.query.or()
    }

    /// Open another AND group on the same query
    pub fn and(&mut self) -> Scope<'_> {
        self.query.and()
    }
}

impl Predicates for Scope<'_> {
    fn add_condition(
        &mut self,
        key: &str,
        operator: Operator,
        operand: Operand,
    ) -> Result<&mut Self, UsageError> {
        self.query
            .add_grouped_condition(self.handle, key, operator, operand)?;
        Ok(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_empty_entity_name_rejected() {
        assert_eq!(Query::new("").unwrap_err(), UsageError::EmptyEntityName);
    }

    #[test]
    fn test_query_defaults() {
        let query = Query::new("Person").unwrap();

        assert_eq!(query.entity_name(), "Person");
        assert_eq!(query.limit(), 0);
        assert_eq!(query.skip(), 0);
        assert!(query.order().is_none());
        assert!(query.aggregation().is_none());
        assert_eq!(query.cache_policy(), CachePolicy::IgnoreCache);
        assert!(query.conditions().is_empty());
    }

    #[test]
    fn test_fluent_root_conditions() {
        let mut query = Query::new("Person").unwrap();
        query
            .greater_than("age", 18)
            .unwrap()
            .has_prefix("name", "Jo")
            .unwrap()
            .exists("email")
            .unwrap();

        let root = query.conditions().root();
        assert_eq!(root.len(), 3);
        assert_eq!(root[0].operator, Operator::GreaterThan);
        assert_eq!(root[1].operand, Operand::Value(json!("Jo")));
        assert_eq!(root[2].operand, Operand::None);
    }

    #[test]
    fn test_add_condition_shape_mismatch() {
        let mut query = Query::new("Person").unwrap();
        let err = query
            .add_condition("city", Operator::ContainedIn, Operand::Value(json!("NYC")))
            .unwrap_err();

        assert!(matches!(err, UsageError::InvalidOperand { .. }));
        assert!(query.conditions().is_empty());
    }

    #[test]
    fn test_scope_routes_into_group_only() {
        let mut query = Query::new("Person").unwrap();
        query
            .or()
            .equal_to("city", "NYC")
            .unwrap()
            .equal_to("city", "LA")
            .unwrap();
        query.equal_to("active", true).unwrap();

        let tree = query.conditions();
        assert_eq!(tree.root().len(), 1);
        assert_eq!(tree.root()[0].key, "active");
        assert_eq!(tree.groups()[0].members.len(), 2);
        assert!(tree.groups()[0].members.iter().all(|c| c.key == "city"));
    }

    #[test]
    fn test_scope_or_opens_new_group() {
        let mut query = Query::new("Person").unwrap();
        let mut scope = query.or();
        scope.equal_to("a", 1).unwrap();
        scope.and().equal_to("b", 2).unwrap();

        let groups = query.conditions().groups();
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].logic, GroupLogic::Or);
        assert_eq!(groups[0].members[0].key, "a");
        assert_eq!(groups[1].logic, GroupLogic::And);
        assert_eq!(groups[1].members[0].key, "b");
    }

    #[test]
    fn test_contained_in_collects_values() {
        let mut query = Query::new("Person").unwrap();
        query.contained_in("city", ["NYC", "LA"]).unwrap();

        assert_eq!(
            query.conditions().root()[0].operand,
            Operand::List(vec![json!("NYC"), json!("LA")])
        );
    }

    #[test]
    fn test_single_active_ordering() {
        let mut query = Query::new("Person").unwrap();
        query.order_ascending_by("name").order_descending_by("age");

        assert_eq!(
            query.order(),
            Some(&Order {
                key: "age".to_string(),
                direction: SortDirection::Descending
            })
        );
    }

    #[test]
    fn test_reset_keeps_entity_name() {
        let mut query = Query::new("Person").unwrap();
        query.set_cache_policy(CachePolicy::CacheElseNetwork);
        query.set_limit(5).set_skip(10).order_ascending_by("name");
        query.set_aggregation(Aggregation::new(json!({"reduce": "sum"})));
        query.equal_to("a", 1).unwrap();
        let handle = query.open_group(GroupLogic::Or);

        query.reset();

        assert_eq!(query.entity_name(), "Person");
        assert!(query.conditions().is_empty());
        assert!(query.order().is_none());
        assert!(query.aggregation().is_none());
        assert_eq!(query.limit(), 0);
        assert_eq!(query.skip(), 0);
        assert_eq!(query.cache_policy(), CachePolicy::CacheElseNetwork);

        let err = query
            .add_grouped_condition(handle, "a", Operator::Exists, Operand::None)
            .unwrap_err();
        assert_eq!(err, UsageError::InvalidScope);
    }

    #[test]
    fn test_handle_from_other_query_rejected() {
        let mut first = Query::new("Person").unwrap();
        let mut second = Query::new("Person").unwrap();
        let handle = first.open_group(GroupLogic::And);
        second.open_group(GroupLogic::And);

        let err = second
            .add_grouped_condition(handle, "a", Operator::Exists, Operand::None)
            .unwrap_err();
        assert_eq!(err, UsageError::InvalidScope);
    }
}
