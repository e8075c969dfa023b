//! Build state and the token codec seam
//!
//! A [`Build`] is the full serialized character state. The optimizer edits
//! only the allocation, the mastery selections, and the level; everything
//! else rides along opaquely and re-encodes unchanged.

pub mod build;
pub mod codec;

pub use build::Build;
pub use codec::{verify_round_trip, BuildCodec, CodecError, HexJsonCodec};
