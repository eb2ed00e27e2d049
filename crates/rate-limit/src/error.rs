//! Error types for rate limiting.

use std::time::Duration;

/// Errors that can occur during rate limiting.
#[derive(Debug, thiserror::Error)]
pub enum RateLimitError {
    /// The limiter of the key has no capacity left.
    #[error("Rate limit exceeded for {key}")]
    LimitExceeded {
        /// The admission key that was limited.
        key: String,
        /// Time to wait before retrying. `None` when the request can never fit.
        retry_after: Option<Duration>,
    },

    /// The policy parameters cannot be turned into a limiter.
    #[error("Invalid rate limit policy: {0}")]
    InvalidPolicy(String),
}

impl RateLimitError {
    /// Get the retry-after duration if available.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::LimitExceeded { retry_after, .. } => *retry_after,
            Self::InvalidPolicy(_) => None,
        }
    }
}
