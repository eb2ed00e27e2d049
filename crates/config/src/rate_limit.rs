//! Admission configuration: rate limiting policies and limiter state housekeeping.

use duration_str::deserialize_duration;
use serde::Deserialize;
use std::time::Duration;

use crate::ConfigError;

/// Rate limiting policy of one provider instance.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct RateLimitPolicy {
    /// The limiting algorithm and its parameters.
    #[serde(flatten)]
    pub algorithm: RateLimitAlgorithm,
    /// Wait for capacity (bounded by the caller's deadline) instead of rejecting.
    #[serde(default)]
    pub wait: bool,
}

impl RateLimitPolicy {
    /// A rejecting token bucket.
    pub fn token_bucket(rate: f64, burst: u32) -> Self {
        Self {
            algorithm: RateLimitAlgorithm::TokenBucket(TokenBucketConfig { rate, burst }),
            wait: false,
        }
    }

    /// A rejecting sliding window.
    pub fn sliding_window(window: Duration, max_requests: u32, sub_windows: u32) -> Self {
        Self {
            algorithm: RateLimitAlgorithm::SlidingWindow(SlidingWindowConfig {
                window,
                max_requests,
                sub_windows,
            }),
            wait: false,
        }
    }

    /// A rejecting adaptive limiter.
    pub fn adaptive(config: AdaptiveConfig) -> Self {
        Self {
            algorithm: RateLimitAlgorithm::Adaptive(config),
            wait: false,
        }
    }

    /// Enable waiting for capacity.
    pub fn waiting(mut self) -> Self {
        self.wait = true;
        self
    }

    /// Check the parameter bounds of the policy.
    pub fn validate(&self) -> Result<(), ConfigError> {
        match &self.algorithm {
            RateLimitAlgorithm::TokenBucket(bucket) => validate_bucket(bucket.rate, bucket.burst),
            RateLimitAlgorithm::SlidingWindow(window) => {
                if window.window.is_zero() {
                    return Err(invalid("sliding window size must be greater than zero"));
                }

                if window.max_requests == 0 {
                    return Err(invalid("sliding window max_requests must be at least 1"));
                }

                if window.sub_windows == 0 {
                    return Err(invalid("sliding window sub_windows must be at least 1"));
                }

                Ok(())
            }
            RateLimitAlgorithm::Adaptive(adaptive) => {
                validate_bucket(adaptive.initial_rate, adaptive.burst)?;

                if !(adaptive.min_rate > 0.0 && adaptive.min_rate <= adaptive.max_rate) {
                    return Err(invalid("adaptive limiter requires 0 < min_rate <= max_rate"));
                }

                if adaptive.initial_rate < adaptive.min_rate || adaptive.initial_rate > adaptive.max_rate {
                    return Err(invalid("adaptive initial_rate must lie between min_rate and max_rate"));
                }

                if !(adaptive.adjustment_factor > 0.0 && adaptive.adjustment_factor < 1.0) {
                    return Err(invalid("adaptive adjustment_factor must be in (0, 1)"));
                }

                if !(adaptive.error_threshold > 0.0 && adaptive.error_threshold <= 1.0) {
                    return Err(invalid("adaptive error_threshold must be in (0, 1]"));
                }

                if adaptive.adjustment_interval.is_zero() || adaptive.error_window.is_zero() {
                    return Err(invalid("adaptive intervals must be greater than zero"));
                }

                Ok(())
            }
        }
    }
}

fn validate_bucket(rate: f64, burst: u32) -> Result<(), ConfigError> {
    if !(rate.is_finite() && rate > 0.0) {
        return Err(invalid("token bucket rate must be greater than zero"));
    }

    if burst == 0 {
        return Err(invalid("token bucket burst must be at least 1"));
    }

    Ok(())
}

fn invalid(message: &str) -> ConfigError {
    ConfigError::Invalid(message.to_string())
}

/// The supported limiting algorithms.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RateLimitAlgorithm {
    /// Refill at `rate` tokens per second up to `burst`.
    TokenBucket(TokenBucketConfig),
    /// At most `max_requests` in any `window`, tracked in `sub_windows` buckets.
    SlidingWindow(SlidingWindowConfig),
    /// Token bucket whose rate follows the observed upstream error rate.
    Adaptive(AdaptiveConfig),
}

/// Token bucket parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct TokenBucketConfig {
    /// Tokens added per second.
    pub rate: f64,
    /// Bucket capacity.
    pub burst: u32,
}

/// Sliding window parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct SlidingWindowConfig {
    /// Window size.
    #[serde(deserialize_with = "deserialize_duration")]
    pub window: Duration,
    /// Requests admitted per window.
    pub max_requests: u32,
    /// Number of buckets the window is split into.
    #[serde(default = "default_sub_windows")]
    pub sub_windows: u32,
}

fn default_sub_windows() -> u32 {
    6
}

/// Adaptive limiter parameters.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AdaptiveConfig {
    /// Starting rate in requests per second.
    pub initial_rate: f64,
    /// Lower clamp of the rate.
    pub min_rate: f64,
    /// Upper clamp of the rate.
    pub max_rate: f64,
    /// Bucket capacity.
    #[serde(default = "default_adaptive_burst")]
    pub burst: u32,
    /// Error rate above which the rate is reduced.
    #[serde(default = "default_error_threshold")]
    pub error_threshold: f64,
    /// Relative step applied on each adjustment.
    #[serde(default = "default_adjustment_factor")]
    pub adjustment_factor: f64,
    /// Minimum time between two adjustments.
    #[serde(default = "default_adjustment_interval", deserialize_with = "deserialize_duration")]
    pub adjustment_interval: Duration,
    /// Rolling window over which the error rate is observed.
    #[serde(default = "default_error_window", deserialize_with = "deserialize_duration")]
    pub error_window: Duration,
}

impl AdaptiveConfig {
    /// Adaptive parameters with the default feedback tuning.
    pub fn new(initial_rate: f64, min_rate: f64, max_rate: f64) -> Self {
        Self {
            initial_rate,
            min_rate,
            max_rate,
            burst: default_adaptive_burst(),
            error_threshold: default_error_threshold(),
            adjustment_factor: default_adjustment_factor(),
            adjustment_interval: default_adjustment_interval(),
            error_window: default_error_window(),
        }
    }
}

fn default_adaptive_burst() -> u32 {
    10
}

fn default_error_threshold() -> f64 {
    0.1
}

fn default_adjustment_factor() -> f64 {
    0.1
}

fn default_adjustment_interval() -> Duration {
    Duration::from_secs(30)
}

fn default_error_window() -> Duration {
    Duration::from_secs(300)
}

/// Housekeeping of in-memory admission state.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AdmissionConfig {
    /// Limiter state idle for this long is evicted and recreated on next use.
    #[serde(deserialize_with = "deserialize_duration")]
    pub idle_eviction: Duration,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            idle_eviction: Duration::from_secs(3600),
        }
    }
}
