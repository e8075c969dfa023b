//! Allocation state layered on the static topology
//!
//! An [`AllocationSet`] is the mutable part of a build: which nodes are
//! allocated and which mastery effect is selected per allocated mastery
//! node. Invariant: every allocated node except the root is reachable from
//! the root through other allocated nodes. States violating it must never
//! reach the calculation engine.

use crate::error::TreeError;
use crate::node::NodeId;
use crate::tree::PassiveTree;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Allocated nodes plus per-mastery effect selections
///
/// Ordered collections keep serialization and candidate generation
/// deterministic.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationSet {
    /// Allocated node ids
    pub nodes: BTreeSet<NodeId>,
    /// Selected mastery effect per allocated mastery node
    pub masteries: BTreeMap<NodeId, u32>,
}

impl AllocationSet {
    /// Empty allocation
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocation from a node id list
    #[must_use]
    pub fn from_nodes(nodes: impl IntoIterator<Item = NodeId>) -> Self {
        Self {
            nodes: nodes.into_iter().collect(),
            masteries: BTreeMap::new(),
        }
    }

    /// Number of allocated nodes
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Whether nothing is allocated
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Whether the node is allocated
    #[inline]
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains(&id)
    }

    /// Allocate a node; returns whether the set changed
    pub fn allocate(&mut self, id: NodeId) -> bool {
        self.nodes.insert(id)
    }

    /// Deallocate a node, dropping any mastery selection bound to it
    pub fn deallocate(&mut self, id: NodeId) -> bool {
        self.masteries.remove(&id);
        self.nodes.remove(&id)
    }

    /// Select a mastery effect for an allocated node
    ///
    /// # Errors
    /// Returns [`TreeError::UnknownNode`] if the node is not allocated.
    pub fn select_mastery(&mut self, node: NodeId, effect: u32) -> Result<(), TreeError> {
        if !self.nodes.contains(&node) {
            return Err(TreeError::UnknownNode(node));
        }
        self.masteries.insert(node, effect);
        Ok(())
    }

    /// Selected effect id for a mastery node, if any
    #[inline]
    #[must_use]
    pub fn selected_effect(&self, node: NodeId) -> Option<u32> {
        self.masteries.get(&node).copied()
    }

    /// Points spent by this allocation
    ///
    /// The root is free; unknown nodes count at the default cost of 1 so a
    /// stale build still totals something sane before version checks run.
    #[must_use]
    pub fn points_spent(&self, tree: &PassiveTree) -> u32 {
        self.nodes
            .iter()
            .filter(|&&id| id != tree.root())
            .map(|&id| tree.node(id).map_or(1, |n| n.cost))
            .sum()
    }

    /// Unallocated nodes adjacent to the allocation, sorted
    #[must_use]
    pub fn frontier(&self, tree: &PassiveTree) -> Vec<NodeId> {
        let mut out = BTreeSet::new();
        for &id in self.nodes.iter().chain(std::iter::once(&tree.root())) {
            for next in tree.neighbors(id) {
                if !self.nodes.contains(&next) {
                    out.insert(next);
                }
            }
        }
        out.into_iter().collect()
    }

    /// Whether the allocation satisfies the root-connectivity invariant
    #[inline]
    #[must_use]
    pub fn is_connected(&self, tree: &PassiveTree) -> bool {
        tree.is_connected(&self.nodes, tree.root())
    }

    /// Whether removing `id` keeps the rest of the allocation connected
    #[must_use]
    pub fn removal_keeps_connected(&self, tree: &PassiveTree, id: NodeId) -> bool {
        let mut remaining = self.nodes.clone();
        remaining.remove(&id);
        tree.is_connected(&remaining, tree.root())
    }

    /// Drop mastery selections whose node is no longer an allocated mastery
    ///
    /// Structural mutations can strand a selection; stale selections must be
    /// reconciled before the allocation is serialized.
    pub fn prune_masteries(&mut self, tree: &PassiveTree) {
        self.masteries.retain(|node, _| {
            self.nodes.contains(node)
                && tree.kind(*node).is_some_and(|k| k.is_selectable())
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{NodeKind, TreeNode};
    use crate::tree::{DatasetNode, TreeDataset};

    fn node(id: u32, kind: NodeKind, connections: &[u32]) -> DatasetNode {
        DatasetNode {
            node: TreeNode {
                id: NodeId(id),
                name: String::new(),
                kind,
                stats: vec![],
                mastery_effects: vec![],
                cost: 1,
            },
            connections: connections.iter().copied().map(NodeId).collect(),
        }
    }

    /// 1 - 2 - 3, with mastery 4 hanging off 2
    fn tree() -> PassiveTree {
        PassiveTree::from_dataset(TreeDataset {
            version: "3.25".to_string(),
            root: NodeId(1),
            nodes: vec![
                node(1, NodeKind::Normal, &[2]),
                node(2, NodeKind::Normal, &[3, 4]),
                node(3, NodeKind::Notable, &[]),
                node(4, NodeKind::Mastery, &[]),
            ],
        })
        .unwrap()
    }

    #[test]
    fn allocate_and_deallocate() {
        let mut alloc = AllocationSet::new();
        assert!(alloc.allocate(NodeId(2)));
        assert!(!alloc.allocate(NodeId(2)));
        assert!(alloc.contains(NodeId(2)));
        assert!(alloc.deallocate(NodeId(2)));
        assert!(alloc.is_empty());
    }

    #[test]
    fn deallocate_drops_mastery_selection() {
        let mut alloc = AllocationSet::from_nodes([NodeId(1), NodeId(2), NodeId(4)]);
        alloc.select_mastery(NodeId(4), 7).unwrap();
        alloc.deallocate(NodeId(4));
        assert_eq!(alloc.selected_effect(NodeId(4)), None);
    }

    #[test]
    fn select_mastery_requires_allocation() {
        let mut alloc = AllocationSet::new();
        assert!(matches!(
            alloc.select_mastery(NodeId(4), 7),
            Err(TreeError::UnknownNode(NodeId(4)))
        ));
    }

    #[test]
    fn points_exclude_root() {
        let tree = tree();
        let alloc = AllocationSet::from_nodes([NodeId(1), NodeId(2), NodeId(3)]);
        assert_eq!(alloc.points_spent(&tree), 2);
    }

    #[test]
    fn frontier_is_sorted_and_unallocated() {
        let tree = tree();
        let alloc = AllocationSet::from_nodes([NodeId(1), NodeId(2)]);
        assert_eq!(alloc.frontier(&tree), vec![NodeId(3), NodeId(4)]);
    }

    #[test]
    fn removal_check_detects_cut_node() {
        let tree = tree();
        let alloc = AllocationSet::from_nodes([NodeId(1), NodeId(2), NodeId(3)]);
        // 2 is the sole connection between 3 and the root
        assert!(!alloc.removal_keeps_connected(&tree, NodeId(2)));
        assert!(alloc.removal_keeps_connected(&tree, NodeId(3)));
    }

    #[test]
    fn prune_drops_stranded_selections() {
        let tree = tree();
        let mut alloc = AllocationSet::from_nodes([NodeId(1), NodeId(2), NodeId(4)]);
        alloc.select_mastery(NodeId(4), 7).unwrap();
        // selection on a non-mastery node sneaks in through deserialization
        alloc.masteries.insert(NodeId(2), 1);
        alloc.prune_masteries(&tree);
        assert_eq!(alloc.selected_effect(NodeId(4)), Some(7));
        assert_eq!(alloc.selected_effect(NodeId(2)), None);
    }

    #[test]
    fn serde_round_trip() {
        let mut alloc = AllocationSet::from_nodes([NodeId(1), NodeId(4)]);
        alloc.select_mastery(NodeId(4), 7).unwrap();
        let raw = serde_json::to_string(&alloc).unwrap();
        let back: AllocationSet = serde_json::from_str(&raw).unwrap();
        assert_eq!(alloc, back);
    }
}
