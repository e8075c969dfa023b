//! Node identity and attributes
//!
//! Node ids are the dataset's stable numeric identifiers, not generated
//! values: the same id must mean the same node across runs and across
//! serialized builds.

use serde::{Deserialize, Serialize};

/// Stable tree node identifier from the topology dataset
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize, Default,
)]
pub struct NodeId(pub u32);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u32> for NodeId {
    fn from(raw: u32) -> Self {
        Self(raw)
    }
}

/// Node kind as declared by the dataset
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    /// Small passive node
    #[default]
    Normal,
    /// Notable passive node
    Notable,
    /// Keystone passive node
    Keystone,
    /// Jewel socket node
    JewelSocket,
    /// Mastery node offering mutually exclusive sub-options
    Mastery,
}

impl NodeKind {
    /// Whether the node offers selectable sub-options when allocated
    #[inline]
    #[must_use]
    pub fn is_selectable(self) -> bool {
        matches!(self, Self::Mastery)
    }
}

/// One selectable sub-option of a mastery node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MasteryEffect {
    /// Effect identifier, unique within the owning node
    pub id: u32,
    /// Stat description lines granted by the effect
    #[serde(default)]
    pub stats: Vec<String>,
}

/// Static attributes of one tree node
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeNode {
    /// Node identifier
    pub id: NodeId,
    /// Display name
    #[serde(default)]
    pub name: String,
    /// Node kind
    #[serde(default)]
    pub kind: NodeKind,
    /// Stat description lines granted when allocated
    #[serde(default)]
    pub stats: Vec<String>,
    /// Selectable sub-options; empty unless `kind` is [`NodeKind::Mastery`]
    #[serde(default)]
    pub mastery_effects: Vec<MasteryEffect>,
    /// Point cost of allocating the node
    #[serde(default = "default_cost")]
    pub cost: u32,
}

fn default_cost() -> u32 {
    1
}

impl TreeNode {
    /// Look up a mastery effect by id
    #[inline]
    #[must_use]
    pub fn effect(&self, effect_id: u32) -> Option<&MasteryEffect> {
        self.mastery_effects.iter().find(|e| e.id == effect_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_display() {
        assert_eq!(NodeId(42).to_string(), "42");
    }

    #[test]
    fn only_mastery_is_selectable() {
        assert!(NodeKind::Mastery.is_selectable());
        assert!(!NodeKind::Normal.is_selectable());
        assert!(!NodeKind::Keystone.is_selectable());
    }

    #[test]
    fn tree_node_defaults() {
        let node: TreeNode = serde_json::from_str(r#"{"id": 7}"#).unwrap();
        assert_eq!(node.id, NodeId(7));
        assert_eq!(node.kind, NodeKind::Normal);
        assert_eq!(node.cost, 1);
        assert!(node.stats.is_empty());
    }

    #[test]
    fn effect_lookup() {
        let node = TreeNode {
            id: NodeId(1),
            name: "Life Mastery".to_string(),
            kind: NodeKind::Mastery,
            stats: vec![],
            mastery_effects: vec![
                MasteryEffect {
                    id: 10,
                    stats: vec!["+50 to maximum Life".to_string()],
                },
                MasteryEffect {
                    id: 11,
                    stats: vec!["10% increased maximum Life".to_string()],
                },
            ],
            cost: 1,
        };
        assert!(node.effect(11).is_some());
        assert!(node.effect(99).is_none());
    }
}
