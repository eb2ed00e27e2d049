//! Call metrics collection settings.

use duration_str::deserialize_option_duration;
use serde::Deserialize;
use std::time::Duration;

/// Settings of the in-process metrics collector.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct MetricsConfig {
    /// Number of call records kept by the summarizing sink.
    pub history_size: usize,
    /// Thresholds that raise alerts. Unset thresholds never fire.
    pub alerts: AlertThresholds,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            history_size: 1000,
            alerts: AlertThresholds::default(),
        }
    }
}

/// Alert thresholds evaluated on every recorded call.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AlertThresholds {
    /// Error share of the recent calls of one provider.
    pub error_rate: Option<f64>,
    /// Calls of a provider that must be retained before the error rate is evaluated.
    pub min_samples: usize,
    /// Single call duration.
    #[serde(deserialize_with = "deserialize_option_duration")]
    pub latency: Option<Duration>,
    /// Estimated cost of a single call.
    pub cost_per_call: Option<f64>,
    /// Local rate limit rejections of one provider within the last minute.
    pub rate_limit_hits_per_minute: Option<u32>,
}

impl Default for AlertThresholds {
    fn default() -> Self {
        Self {
            error_rate: None,
            min_samples: 10,
            latency: None,
            cost_per_call: None,
            rate_limit_hits_per_minute: None,
        }
    }
}
