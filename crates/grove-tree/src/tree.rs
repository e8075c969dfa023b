//! Tree topology and connectivity queries
//!
//! The topology is loaded once from a versioned JSON dataset and shared
//! read-only for the rest of the process. All queries are pure; BFS is the
//! single connectivity primitive used by every mutation path.

use crate::error::TreeError;
use crate::node::{NodeId, NodeKind, TreeNode};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use petgraph::graphmap::UnGraphMap;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// On-disk dataset format
///
/// `connections` are undirected; each edge may appear on either endpoint.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TreeDataset {
    /// Dataset version tag; must match the build's tree version
    pub version: String,
    /// Fixed root node of the allocation graph
    pub root: NodeId,
    /// Node declarations
    pub nodes: Vec<DatasetNode>,
}

/// One node declaration in the dataset
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatasetNode {
    /// Node attributes
    #[serde(flatten)]
    pub node: TreeNode,
    /// Adjacent node ids
    #[serde(default)]
    pub connections: Vec<NodeId>,
}

/// In-memory tree topology
///
/// Immutable once built; shared via `Arc` across concurrent evaluations
/// without locking.
#[derive(Debug)]
pub struct PassiveTree {
    version: String,
    root: NodeId,
    nodes: HashMap<NodeId, TreeNode>,
    topology: UnGraphMap<NodeId, ()>,
}

impl PassiveTree {
    /// Build a tree from a parsed dataset
    ///
    /// # Errors
    /// - [`TreeError::UnknownRoot`] if the root id has no declaration
    /// - [`TreeError::DanglingEdge`] if a connection references an
    ///   undeclared node
    pub fn from_dataset(dataset: TreeDataset) -> Result<Self, TreeError> {
        let mut nodes = HashMap::with_capacity(dataset.nodes.len());
        let mut topology = UnGraphMap::new();

        for entry in &dataset.nodes {
            topology.add_node(entry.node.id);
            nodes.insert(entry.node.id, entry.node.clone());
        }

        if !nodes.contains_key(&dataset.root) {
            return Err(TreeError::UnknownRoot(dataset.root));
        }

        for entry in &dataset.nodes {
            for &other in &entry.connections {
                if !nodes.contains_key(&other) {
                    return Err(TreeError::DanglingEdge(other));
                }
                topology.add_edge(entry.node.id, other, ());
            }
        }

        tracing::debug!(
            version = %dataset.version,
            nodes = nodes.len(),
            edges = topology.edge_count(),
            "tree dataset loaded"
        );

        Ok(Self {
            version: dataset.version,
            root: dataset.root,
            nodes,
            topology,
        })
    }

    /// Parse a tree from dataset JSON
    ///
    /// # Errors
    /// Returns [`TreeError::Parse`] on malformed JSON, plus the
    /// [`Self::from_dataset`] validation errors.
    pub fn from_json_str(raw: &str) -> Result<Self, TreeError> {
        let dataset: TreeDataset = serde_json::from_str(raw)?;
        Self::from_dataset(dataset)
    }

    /// Load a dataset file through the process-wide cache
    ///
    /// Parsing is a one-time cost per path; subsequent loads return the
    /// cached `Arc`.
    ///
    /// # Errors
    /// Propagates io and parse errors from the first load of a path.
    pub fn load(path: impl AsRef<Path>) -> Result<Arc<Self>, TreeError> {
        static CACHE: Lazy<RwLock<HashMap<PathBuf, Arc<PassiveTree>>>> =
            Lazy::new(|| RwLock::new(HashMap::new()));

        let path = path.as_ref().to_path_buf();
        if let Some(tree) = CACHE.read().get(&path) {
            return Ok(Arc::clone(tree));
        }

        let raw = std::fs::read_to_string(&path)?;
        let tree = Arc::new(Self::from_json_str(&raw)?);
        CACHE.write().insert(path, Arc::clone(&tree));
        Ok(tree)
    }

    /// Dataset version tag
    #[inline]
    #[must_use]
    pub fn version(&self) -> &str {
        &self.version
    }

    /// Fixed root node
    #[inline]
    #[must_use]
    pub fn root(&self) -> NodeId {
        self.root
    }

    /// Number of nodes
    #[inline]
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether the node exists
    #[inline]
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Node attributes
    #[inline]
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(&id)
    }

    /// Node kind
    #[inline]
    #[must_use]
    pub fn kind(&self, id: NodeId) -> Option<NodeKind> {
        self.nodes.get(&id).map(|n| n.kind)
    }

    /// Adjacent nodes, sorted for deterministic iteration
    #[must_use]
    pub fn neighbors(&self, id: NodeId) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self.topology.neighbors(id).collect();
        out.sort_unstable();
        out
    }

    /// Whether every allocated node is reachable from `root` through other
    /// allocated nodes
    ///
    /// The walk is restricted to `allocated` plus the root itself. This is
    /// THE connectivity primitive; allocation mutations must never be
    /// accepted without it.
    #[must_use]
    pub fn is_connected(&self, allocated: &BTreeSet<NodeId>, root: NodeId) -> bool {
        if allocated.is_empty() {
            return true;
        }
        if !self.contains(root) {
            return false;
        }

        let mut visited = BTreeSet::new();
        let mut queue = VecDeque::new();
        visited.insert(root);
        queue.push_back(root);

        while let Some(current) = queue.pop_front() {
            for next in self.topology.neighbors(current) {
                if (allocated.contains(&next) || next == root) && visited.insert(next) {
                    queue.push_back(next);
                }
            }
        }

        allocated.iter().all(|id| visited.contains(id))
    }

    /// Shortest path between two nodes over the full topology
    ///
    /// Returns the node sequence including both endpoints, or `None` when no
    /// path exists. Ties resolve toward smaller node ids.
    #[must_use]
    pub fn shortest_path(&self, from: NodeId, to: NodeId) -> Option<Vec<NodeId>> {
        if !self.contains(from) || !self.contains(to) {
            return None;
        }
        if from == to {
            return Some(vec![from]);
        }

        let mut parent: HashMap<NodeId, NodeId> = HashMap::new();
        let mut queue = VecDeque::new();
        parent.insert(from, from);
        queue.push_back(from);

        while let Some(current) = queue.pop_front() {
            for next in self.neighbors(current) {
                if parent.contains_key(&next) {
                    continue;
                }
                parent.insert(next, current);
                if next == to {
                    let mut path = vec![to];
                    let mut cursor = to;
                    while cursor != from {
                        cursor = parent[&cursor];
                        path.push(cursor);
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back(next);
            }
        }

        None
    }

    /// Fail unless `build_version` matches the dataset version
    ///
    /// # Errors
    /// Returns [`TreeError::VersionMismatch`] on any difference; mismatched
    /// datasets are a fatal input error, not something to paper over.
    pub fn check_version(&self, build_version: &str) -> Result<(), TreeError> {
        if self.version == build_version {
            Ok(())
        } else {
            Err(TreeError::VersionMismatch {
                dataset: self.version.clone(),
                build: build_version.to_string(),
            })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::{MasteryEffect, NodeKind};

    fn dataset_node(id: u32, connections: &[u32]) -> DatasetNode {
        DatasetNode {
            node: TreeNode {
                id: NodeId(id),
                name: format!("node {id}"),
                kind: NodeKind::Normal,
                stats: vec![],
                mastery_effects: vec![],
                cost: 1,
            },
            connections: connections.iter().copied().map(NodeId).collect(),
        }
    }

    /// 1 - 2 - 3 - 4 with a 2 - 5 spur
    fn chain_tree() -> PassiveTree {
        PassiveTree::from_dataset(TreeDataset {
            version: "3.25".to_string(),
            root: NodeId(1),
            nodes: vec![
                dataset_node(1, &[2]),
                dataset_node(2, &[3, 5]),
                dataset_node(3, &[4]),
                dataset_node(4, &[]),
                dataset_node(5, &[]),
            ],
        })
        .unwrap()
    }

    #[test]
    fn rejects_dangling_edge() {
        let result = PassiveTree::from_dataset(TreeDataset {
            version: "3.25".to_string(),
            root: NodeId(1),
            nodes: vec![dataset_node(1, &[99])],
        });
        assert!(matches!(result, Err(TreeError::DanglingEdge(NodeId(99)))));
    }

    #[test]
    fn rejects_unknown_root() {
        let result = PassiveTree::from_dataset(TreeDataset {
            version: "3.25".to_string(),
            root: NodeId(42),
            nodes: vec![dataset_node(1, &[])],
        });
        assert!(matches!(result, Err(TreeError::UnknownRoot(NodeId(42)))));
    }

    #[test]
    fn neighbors_are_sorted() {
        let tree = chain_tree();
        assert_eq!(tree.neighbors(NodeId(2)), vec![NodeId(1), NodeId(3), NodeId(5)]);
    }

    #[test]
    fn connected_chain() {
        let tree = chain_tree();
        let allocated: BTreeSet<NodeId> = [1, 2, 3].into_iter().map(NodeId).collect();
        assert!(tree.is_connected(&allocated, NodeId(1)));
    }

    #[test]
    fn gap_disconnects() {
        let tree = chain_tree();
        // 3 missing: 4 unreachable from root
        let allocated: BTreeSet<NodeId> = [1, 2, 4].into_iter().map(NodeId).collect();
        assert!(!tree.is_connected(&allocated, NodeId(1)));
    }

    #[test]
    fn empty_allocation_is_connected() {
        let tree = chain_tree();
        assert!(tree.is_connected(&BTreeSet::new(), NodeId(1)));
    }

    #[test]
    fn shortest_path_endpoints() {
        let tree = chain_tree();
        let path = tree.shortest_path(NodeId(1), NodeId(4)).unwrap();
        assert_eq!(path, vec![NodeId(1), NodeId(2), NodeId(3), NodeId(4)]);
        assert_eq!(tree.shortest_path(NodeId(1), NodeId(1)).unwrap(), vec![NodeId(1)]);
    }

    #[test]
    fn shortest_path_missing_node() {
        let tree = chain_tree();
        assert!(tree.shortest_path(NodeId(1), NodeId(99)).is_none());
    }

    #[test]
    fn version_check() {
        let tree = chain_tree();
        assert!(tree.check_version("3.25").is_ok());
        assert!(matches!(
            tree.check_version("3.24"),
            Err(TreeError::VersionMismatch { .. })
        ));
    }

    #[test]
    fn dataset_round_trips_through_json() {
        let raw = serde_json::json!({
            "version": "3.25",
            "root": 1,
            "nodes": [
                {"id": 1, "name": "start", "connections": [2]},
                {
                    "id": 2,
                    "name": "Life Mastery",
                    "kind": "mastery",
                    "mastery_effects": [{"id": 7, "stats": ["+50 to maximum Life"]}]
                }
            ]
        })
        .to_string();

        let tree = PassiveTree::from_json_str(&raw).unwrap();
        assert_eq!(tree.node_count(), 2);
        assert_eq!(tree.kind(NodeId(2)), Some(NodeKind::Mastery));
        assert_eq!(
            tree.node(NodeId(2)).unwrap().mastery_effects,
            vec![MasteryEffect {
                id: 7,
                stats: vec!["+50 to maximum Life".to_string()],
            }]
        );
    }
}
