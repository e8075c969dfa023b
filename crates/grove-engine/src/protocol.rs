//! Line-oriented wire protocol
//!
//! One JSON object per line in each direction. Build tokens are hex-armored
//! by the codec, so a token can never contain the line delimiter.

use crate::error::EngineError;
use grove_stats::StatSnapshot;
use serde::{Deserialize, Serialize};

/// Request sent to a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EngineRequest {
    /// Evaluate a build token
    Eval {
        /// Transport-encoded build token
        build: String,
        /// Re-import the tree substructure before evaluating; set on the
        /// recovery pass for the engine's import defect
        #[serde(default)]
        force_reload: bool,
    },
    /// Liveness probe; does not consume an evaluation
    Ping,
    /// Graceful shutdown request
    Exit,
}

/// Response emitted by a worker
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum EngineResponse {
    /// One-time startup handshake after engine initialization
    Ready,
    /// Successful evaluation
    Stats {
        /// Derived stat record
        stats: StatSnapshot,
        /// Nodes the engine actually materialized in its tree substructure;
        /// zero for an allocated build means the import defect fired
        allocated: u64,
    },
    /// Liveness reply
    Pong,
    /// Structured failure for one request
    Failure {
        /// Failure class
        category: FailureCategory,
        /// Engine-reported detail
        message: String,
    },
}

/// Failure classes a worker may report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// The engine cannot process this build class at all
    Unsupported,
    /// Transient engine-side error
    Internal,
}

/// Encode a message as one protocol line (no trailing newline)
///
/// # Errors
/// Returns [`EngineError::Protocol`] when serialization fails.
pub fn encode_line<T: Serialize>(message: &T) -> Result<String, EngineError> {
    serde_json::to_string(message).map_err(|e| EngineError::Protocol(e.to_string()))
}

/// Decode one response line
///
/// # Errors
/// Returns [`EngineError::Protocol`] on anything that is not a well-formed
/// response object.
pub fn decode_response(line: &str) -> Result<EngineResponse, EngineError> {
    serde_json::from_str(line.trim())
        .map_err(|e| EngineError::Protocol(format!("{e}: {line:.80}")))
}

/// Decode one request line (used by scripted engines in tests)
///
/// # Errors
/// Returns [`EngineError::Protocol`] on malformed requests.
pub fn decode_request(line: &str) -> Result<EngineRequest, EngineError> {
    serde_json::from_str(line.trim())
        .map_err(|e| EngineError::Protocol(format!("{e}: {line:.80}")))
}
