//! Circuit breaker configuration.

use duration_str::deserialize_duration;
use serde::Deserialize;
use std::time::Duration;

use crate::ConfigError;

/// Breaker parameters of one provider instance.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CircuitBreakerConfig {
    /// Probes admitted while half-open.
    pub max_requests: u32,
    /// Counters are cleared this often while closed. Zero never clears them.
    #[serde(deserialize_with = "deserialize_duration")]
    pub interval: Duration,
    /// Time spent open before probing.
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
    /// When a closed breaker trips.
    pub trip: TripPolicy,
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            max_requests: 1,
            interval: Duration::from_secs(60),
            timeout: Duration::from_secs(60),
            trip: TripPolicy::default(),
        }
    }
}

impl CircuitBreakerConfig {
    /// Check the parameter bounds.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_requests == 0 {
            return Err(ConfigError::Invalid(
                "circuit breaker max_requests must be at least 1".to_string(),
            ));
        }

        if self.timeout.is_zero() {
            return Err(ConfigError::Invalid(
                "circuit breaker timeout must be greater than zero".to_string(),
            ));
        }

        match self.trip {
            TripPolicy::FailureRatio { ratio, .. } if !(ratio > 0.0 && ratio <= 1.0) => Err(ConfigError::Invalid(
                "circuit breaker failure ratio must be in (0, 1]".to_string(),
            )),
            TripPolicy::ConsecutiveFailures { threshold: 0 } => Err(ConfigError::Invalid(
                "circuit breaker consecutive failure threshold must be at least 1".to_string(),
            )),
            _ => Ok(()),
        }
    }
}

/// Predicate deciding when a closed breaker opens.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TripPolicy {
    /// Trip once `min_requests` were seen and the failure share reaches `ratio`.
    FailureRatio {
        /// Minimum number of observed requests.
        min_requests: u32,
        /// Failure share in (0, 1].
        ratio: f64,
    },
    /// Trip after `threshold` failures in a row.
    ConsecutiveFailures {
        /// Consecutive failures needed.
        threshold: u32,
    },
}

impl Default for TripPolicy {
    fn default() -> Self {
        Self::FailureRatio {
            min_requests: 3,
            ratio: 0.6,
        }
    }
}
