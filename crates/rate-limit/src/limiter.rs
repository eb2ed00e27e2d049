//! The limiter variants behind one admission interface.

use std::time::Duration;

use config::{RateLimitAlgorithm, RateLimitPolicy};

use crate::{AdaptiveLimiter, RateLimitError, SlidingWindow, TokenBucket};

/// Result type for rate limit checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitResult {
    /// Whether the request is allowed.
    pub allowed: bool,
    /// Time to wait before retrying if not allowed.
    pub retry_after: Option<Duration>,
}

impl RateLimitResult {
    pub(crate) fn allowed() -> Self {
        Self {
            allowed: true,
            retry_after: None,
        }
    }

    pub(crate) fn denied(retry_after: Option<Duration>) -> Self {
        Self {
            allowed: false,
            retry_after,
        }
    }
}

/// One rate limiter, as selected by a policy.
pub enum Limiter {
    /// Fixed rate token bucket.
    TokenBucket(TokenBucket),
    /// Sliding window counter.
    SlidingWindow(SlidingWindow),
    /// Error-rate driven token bucket.
    Adaptive(AdaptiveLimiter),
}

impl Limiter {
    /// Build the limiter described by the policy, with fresh state.
    pub fn from_policy(policy: &RateLimitPolicy) -> Result<Self, RateLimitError> {
        let limiter = match &policy.algorithm {
            RateLimitAlgorithm::TokenBucket(config) => Self::TokenBucket(TokenBucket::new(config.rate, config.burst)?),
            RateLimitAlgorithm::SlidingWindow(config) => Self::SlidingWindow(SlidingWindow::new(
                config.window,
                config.max_requests,
                config.sub_windows,
            )?),
            RateLimitAlgorithm::Adaptive(config) => Self::Adaptive(AdaptiveLimiter::new(config.clone())?),
        };

        Ok(limiter)
    }

    /// Take one unit of capacity if available.
    pub fn check(&self) -> RateLimitResult {
        match self {
            Limiter::TokenBucket(bucket) => bucket.check(),
            Limiter::SlidingWindow(window) => window.check(),
            Limiter::Adaptive(adaptive) => adaptive.check(),
        }
    }

    /// Feed the outcome of an admitted call back. Only the adaptive limiter listens.
    pub fn record(&self, success: bool) {
        if let Limiter::Adaptive(adaptive) = self {
            adaptive.record(success);
        }
    }

    /// The current refill rate, for limiters that have one.
    pub fn current_rate(&self) -> Option<f64> {
        match self {
            Limiter::TokenBucket(bucket) => Some(bucket.rate()),
            Limiter::SlidingWindow(_) => None,
            Limiter::Adaptive(adaptive) => Some(adaptive.current_rate()),
        }
    }
}
