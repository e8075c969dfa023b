//! Fatal optimizer errors
//!
//! Only problems with the *initial* input are fatal; per-candidate failures
//! are isolated inside the run and reported through the iteration log.

use grove_build::CodecError;
use grove_tree::TreeError;

/// Errors that abort a run before it produces an outcome
#[derive(Debug, thiserror::Error)]
pub enum OptimizeError {
    /// Initial build failed a tree check (version, connectivity)
    #[error("tree: {0}")]
    Tree(#[from] TreeError),

    /// Initial build failed to round-trip through the codec
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
}
