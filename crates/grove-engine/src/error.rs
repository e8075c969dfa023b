//! Engine error taxonomy
//!
//! Classification drives recovery: retryable errors get bounded retries and
//! a worker restart, terminal errors are reported as-is. Getting a category
//! wrong either wastes evaluations or, worse, hides a wrong answer.

use std::time::Duration;

/// Errors raised by engine workers and the pool
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// Pipe or process failure talking to a worker
    #[error("transport: {0}")]
    Transport(String),

    /// Worker produced no response within the watchdog bound
    #[error("evaluation timed out after {0:?}")]
    Timeout(Duration),

    /// Engine reported an internal failure for this request
    #[error("engine failure: {0}")]
    Engine(String),

    /// Engine fundamentally cannot evaluate this build class
    #[error("unsupported build: {0}")]
    Unsupported(String),

    /// Response line did not parse as the protocol
    #[error("protocol: {0}")]
    Protocol(String),

    /// Worker failed to initialize within its start budget
    #[error("worker startup: {0}")]
    Startup(String),

    /// No live workers remain after bounded restart attempts
    #[error("no live engine workers remain")]
    PoolUnavailable,

    /// Run-level cancellation aborted the request
    #[error("operation cancelled")]
    Cancelled,
}

impl EngineError {
    /// Whether a retry against a (possibly different) worker can succeed
    ///
    /// `Unsupported` is terminal for the build, `PoolUnavailable` is
    /// terminal for the run, and `Cancelled` means stop asking.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::Transport(_)
                | Self::Timeout(_)
                | Self::Engine(_)
                | Self::Protocol(_)
                | Self::Startup(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_is_terminal() {
        assert!(!EngineError::Unsupported("cluster jewels".to_string()).is_retryable());
        assert!(!EngineError::PoolUnavailable.is_retryable());
        assert!(!EngineError::Cancelled.is_retryable());
    }

    #[test]
    fn transport_class_is_retryable() {
        assert!(EngineError::Transport("broken pipe".to_string()).is_retryable());
        assert!(EngineError::Timeout(Duration::from_secs(1)).is_retryable());
        assert!(EngineError::Protocol("garbage line".to_string()).is_retryable());
    }
}
