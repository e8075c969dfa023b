//! Token codec seam
//!
//! The real export codec (compression plus text-safe armor) lives outside
//! this workspace; the optimizer only depends on the [`BuildCodec`] trait
//! and on round-trip exactness. [`HexJsonCodec`] is the reference
//! implementation used on the worker wire and in tests: JSON for structure,
//! hex armor so a token can never collide with the line-oriented transport.

use crate::build::Build;

/// Codec failures
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// Build could not be serialized
    #[error("token encode: {0}")]
    Encode(String),

    /// Token could not be parsed back into a build
    #[error("token decode: {0}")]
    Decode(String),

    /// Decoding an encoded build produced a different build
    #[error("codec round-trip mismatch")]
    RoundTrip,
}

/// Reversible build <-> token conversion
pub trait BuildCodec: Send + Sync {
    /// Serialize a build to a text-safe token
    ///
    /// # Errors
    /// Returns [`CodecError::Encode`] when the build cannot be serialized.
    fn encode(&self, build: &Build) -> Result<String, CodecError>;

    /// Parse a token back into a build
    ///
    /// # Errors
    /// Returns [`CodecError::Decode`] on malformed tokens.
    fn decode(&self, token: &str) -> Result<Build, CodecError>;
}

/// Reference codec: serde_json + hex armor
#[derive(Debug, Clone, Copy, Default)]
pub struct HexJsonCodec;

impl BuildCodec for HexJsonCodec {
    fn encode(&self, build: &Build) -> Result<String, CodecError> {
        let raw = serde_json::to_vec(build).map_err(|e| CodecError::Encode(e.to_string()))?;
        Ok(hex::encode(raw))
    }

    fn decode(&self, token: &str) -> Result<Build, CodecError> {
        let raw = hex::decode(token.trim()).map_err(|e| CodecError::Decode(e.to_string()))?;
        serde_json::from_slice(&raw).map_err(|e| CodecError::Decode(e.to_string()))
    }
}

/// Encode a build and prove the token decodes back to an identical build
///
/// Every build submitted to the engine goes through this; a codec that is
/// not round-trip-exact would silently evaluate a different build than the
/// one being optimized.
///
/// # Errors
/// Propagates codec errors; returns [`CodecError::RoundTrip`] when the
/// decoded build differs from the input.
pub fn verify_round_trip(codec: &dyn BuildCodec, build: &Build) -> Result<String, CodecError> {
    let token = codec.encode(build)?;
    if codec.decode(&token)? == *build {
        Ok(token)
    } else {
        Err(CodecError::RoundTrip)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use grove_stats::{StatKey, StatSnapshot};
    use grove_tree::{AllocationSet, NodeId};
    use pretty_assertions::assert_eq;

    fn sample_build() -> Build {
        let mut allocation = AllocationSet::from_nodes([NodeId(1), NodeId(2), NodeId(9)]);
        allocation.select_mastery(NodeId(9), 4).unwrap();
        let baseline: StatSnapshot = [
            (StatKey::CombinedDps, 812_345.0),
            (StatKey::Life, 4_830.0),
        ]
        .into_iter()
        .collect();
        Build::new("3.25", 92)
            .with_allocation(allocation)
            .with_baseline(baseline)
    }

    #[test]
    fn round_trip_is_exact() {
        let codec = HexJsonCodec;
        let build = sample_build();
        let token = codec.encode(&build).unwrap();
        assert_eq!(codec.decode(&token).unwrap(), build);
    }

    #[test]
    fn extra_rides_along_unchanged() {
        let codec = HexJsonCodec;
        let mut build = sample_build();
        build.extra = serde_json::json!({"items": [{"slot": "Weapon 1", "rarity": "unique"}]});
        let back = codec.decode(&codec.encode(&build).unwrap()).unwrap();
        assert_eq!(back.extra, build.extra);
    }

    #[test]
    fn token_is_transport_safe() {
        let token = HexJsonCodec.encode(&sample_build()).unwrap();
        assert!(token.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn verify_round_trip_returns_token() {
        let build = sample_build();
        let token = verify_round_trip(&HexJsonCodec, &build).unwrap();
        assert_eq!(HexJsonCodec.decode(&token).unwrap(), build);
    }

    #[test]
    fn decode_rejects_garbage() {
        assert!(matches!(
            HexJsonCodec.decode("not hex at all"),
            Err(CodecError::Decode(_))
        ));
    }
}
