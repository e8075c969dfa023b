//! Error types for the tree model

use crate::node::NodeId;

/// Errors raised by tree loading and allocation queries
#[derive(Debug, thiserror::Error)]
pub enum TreeError {
    /// Node id not present in the dataset
    #[error("unknown node {0}")]
    UnknownNode(NodeId),

    /// Edge references a node the dataset does not define
    #[error("edge references unknown node {0}")]
    DanglingEdge(NodeId),

    /// Root node id not present in the dataset
    #[error("root node {0} not in dataset")]
    UnknownRoot(NodeId),

    /// Build was exported against a different tree version
    #[error("tree version mismatch: dataset {dataset}, build {build}")]
    VersionMismatch {
        /// Version tag carried by the loaded dataset
        dataset: String,
        /// Version tag carried by the build
        build: String,
    },

    /// Allocation violates the root-connectivity invariant
    #[error("allocation not connected to root")]
    Disconnected,

    /// Dataset file could not be read
    #[error("dataset io: {0}")]
    Io(#[from] std::io::Error),

    /// Dataset file could not be parsed
    #[error("dataset parse: {0}")]
    Parse(#[from] serde_json::Error),
}
