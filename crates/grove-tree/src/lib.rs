//! Passive-tree topology model
//!
//! Read-only representation of the skill tree plus the allocation state
//! layered on top of it:
//! - Node identity, kind, and mastery sub-options
//! - Adjacency and connectivity queries (BFS)
//! - Versioned dataset loading with a process-wide cache
//! - [`AllocationSet`]: allocated nodes + mastery selections

pub mod allocation;
pub mod error;
pub mod node;
pub mod tree;

pub use allocation::AllocationSet;
pub use error::TreeError;
pub use node::{MasteryEffect, NodeId, NodeKind, TreeNode};
pub use tree::{PassiveTree, TreeDataset};
