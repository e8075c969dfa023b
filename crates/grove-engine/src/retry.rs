//! Central retry policy
//!
//! One policy, applied by the pool for every request. Call sites never make
//! their own retry decisions.

use crate::error::EngineError;
use std::time::Duration;

/// Bounded retry with linear backoff
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Total attempts per request, first try included
    pub max_attempts: u32,
    /// Base delay between attempts; grows linearly per attempt
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 2,
            backoff: Duration::from_millis(200),
        }
    }
}

impl RetryPolicy {
    /// Whether this error class may be retried at all
    #[inline]
    #[must_use]
    pub fn retryable(&self, error: &EngineError) -> bool {
        error.is_retryable()
    }

    /// Delay before the attempt following `attempt` (1-based)
    #[inline]
    #[must_use]
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        self.backoff * attempt
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backoff_grows_linearly() {
        let policy = RetryPolicy {
            max_attempts: 3,
            backoff: Duration::from_millis(100),
        };
        assert_eq!(policy.backoff_for(1), Duration::from_millis(100));
        assert_eq!(policy.backoff_for(2), Duration::from_millis(200));
    }

    #[test]
    fn policy_follows_error_classification() {
        let policy = RetryPolicy::default();
        assert!(policy.retryable(&EngineError::Transport("pipe".to_string())));
        assert!(!policy.retryable(&EngineError::Unsupported("token".to_string())));
    }
}
