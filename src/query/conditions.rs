//! Condition Tree
//!
//! Holds the predicate tree of a query: an implicitly AND-combined list of
//! root conditions plus any number of one-level groups.
//!
//! ```text
//! root₁ AND root₂ AND (g1₁ OR g1₂) AND (g2₁ AND g2₂)
//! ```
//!
//! Groups are addressed through [`ScopeHandle`]s. A handle records which tree
//! issued it and the tree's generation at the time; clearing the tree bumps
//! the generation so every outstanding handle is rejected afterwards.

use crate::query::ast::{Condition, Group, GroupLogic};
use crate::query::error::UsageError;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_TREE_ID: AtomicU64 = AtomicU64::new(1);

/// Reference to a group opened on a specific [`ConditionTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScopeHandle {
    tree: u64,
    generation: u64,
    group: usize,
}

impl ScopeHandle {
    /// Index of the bound group within the tree's group list
    pub fn group_index(&self) -> usize {
        self.group
    }
}

/// Root conditions and groups of a query, in insertion order
#[derive(Debug)]
pub struct ConditionTree {
    id: u64,
    generation: u64,
    root: Vec<Condition>,
    groups: Vec<Group>,
}

impl ConditionTree {
    /// Create an empty tree
    pub fn new() -> Self {
        Self {
            id: NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed),
            generation: 0,
            root: Vec::new(),
            groups: Vec::new(),
        }
    }

    /// Append a condition to the root
    pub fn add_root(&mut self, condition: Condition) {
        self.root.push(condition);
    }

    /// Open a new group and return a handle bound to it
    pub fn open_group(&mut self, logic: GroupLogic) -> ScopeHandle {
        self.groups.push(Group {
            logic,
            members: Vec::new(),
        });

        ScopeHandle {
            tree: self.id,
            generation: self.generation,
            group: self.groups.len() - 1,
        }
    }

    /// Append a condition to the group bound to `handle`
    pub fn add_grouped(
        &mut self,
        handle: ScopeHandle,
        condition: Condition,
    ) -> Result<(), UsageError> {
        if handle.tree != self.id || handle.generation != self.generation {
            return Err(UsageError::InvalidScope);
        }

        let group = self
            .groups
            .get_mut(handle.group)
            .ok_or(UsageError::InvalidScope)?;
        group.members.push(condition);
        Ok(())
    }

    /// Check whether a handle may still be used with this tree
    pub fn is_valid(&self, handle: ScopeHandle) -> bool {
        handle.tree == self.id
            && handle.generation == self.generation
            && handle.group < self.groups.len()
    }

    /// Remove all conditions and groups, invalidating outstanding handles
    pub fn clear(&mut self) {
        self.root.clear();
        self.groups.clear();
        self.generation += 1;
    }

    /// Root conditions in insertion order
    pub fn root(&self) -> &[Condition] {
        &self.root
    }

    /// Groups in the order they were opened
    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Check if the tree holds no conditions and no groups
    pub fn is_empty(&self) -> bool {
        self.root.is_empty() && self.groups.is_empty()
    }
}

// A clone is a different tree: handles issued by the original do not apply to it
impl Clone for ConditionTree {
    fn clone(&self) -> Self {
        Self {
            id: NEXT_TREE_ID.fetch_add(1, Ordering::Relaxed),
            generation: 0,
            root: self.root.clone(),
            groups: self.groups.clone(),
        }
    }
}

impl Default for ConditionTree {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::ast::{Operand, Operator};
    use serde_json::json;

    fn eq(key: &str, value: serde_json::Value) -> Condition {
        Condition::new(key, Operator::EqualTo, Operand::Value(value)).unwrap()
    }

    #[test]
    fn test_root_insertion_order() {
        let mut tree = ConditionTree::new();
        tree.add_root(eq("b", json!(1)));
        tree.add_root(eq("a", json!(2)));

        let keys: Vec<_> = tree.root().iter().map(|c| c.key.as_str()).collect();
        assert_eq!(keys, vec!["b", "a"]);
    }

    #[test]
    fn test_grouped_conditions_stay_in_group() {
        let mut tree = ConditionTree::new();
        let handle = tree.open_group(GroupLogic::Or);

        tree.add_grouped(handle, eq("city", json!("NYC"))).unwrap();
        tree.add_root(eq("age", json!(18)));
        tree.add_grouped(handle, eq("city", json!("LA"))).unwrap();

        assert_eq!(tree.root().len(), 1);
        assert_eq!(tree.groups().len(), 1);
        assert_eq!(tree.groups()[0].logic, GroupLogic::Or);
        assert_eq!(tree.groups()[0].members.len(), 2);
        assert!(tree.groups()[0].members.iter().all(|c| c.key == "city"));
    }

    #[test]
    fn test_each_open_creates_new_group() {
        let mut tree = ConditionTree::new();
        let first = tree.open_group(GroupLogic::Or);
        let second = tree.open_group(GroupLogic::And);

        assert_ne!(first, second);
        assert_eq!(tree.groups().len(), 2);
        assert_eq!(second.group_index(), 1);
    }

    #[test]
    fn test_clear_invalidates_handles() {
        let mut tree = ConditionTree::new();
        let handle = tree.open_group(GroupLogic::And);
        tree.add_root(eq("a", json!(1)));

        tree.clear();
        assert!(tree.is_empty());
        assert!(!tree.is_valid(handle));

        // A new group at the same index must not revive the old handle
        tree.open_group(GroupLogic::And);
        let err = tree.add_grouped(handle, eq("a", json!(1))).unwrap_err();
        assert_eq!(err, UsageError::InvalidScope);
        assert!(tree.groups()[0].members.is_empty());
    }

    #[test]
    fn test_clone_rejects_original_handles() {
        let mut tree = ConditionTree::new();
        let handle = tree.open_group(GroupLogic::Or);
        let mut copy = tree.clone();

        assert_eq!(copy.groups().len(), 1);
        assert!(copy.add_grouped(handle, eq("a", json!(1))).is_err());
        assert!(tree.add_grouped(handle, eq("a", json!(1))).is_ok());
    }

    #[test]
    fn test_foreign_handle_rejected() {
        let mut tree = ConditionTree::new();
        let mut other = ConditionTree::new();
        let foreign = other.open_group(GroupLogic::Or);
        tree.open_group(GroupLogic::Or);

        let err = tree.add_grouped(foreign, eq("a", json!(1))).unwrap_err();
        assert_eq!(err, UsageError::InvalidScope);
    }
}
