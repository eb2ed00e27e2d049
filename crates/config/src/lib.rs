//! Configuration structures mapping the gateway TOML file.

#![deny(missing_docs)]

mod circuit_breaker;
mod loader;
mod metrics;
mod provider;
mod rate_limit;
mod telemetry;

use std::{collections::BTreeMap, path::Path};

pub use circuit_breaker::{CircuitBreakerConfig, TripPolicy};
pub use metrics::{AlertThresholds, MetricsConfig};
pub use provider::{
    AzureSettings, ClaudeSettings, OpenAiSettings, PricingConfig, ProviderConfig, ProviderKind, QianwenSettings,
};
pub use rate_limit::{
    AdaptiveConfig, AdmissionConfig, RateLimitAlgorithm, RateLimitPolicy, SlidingWindowConfig, TokenBucketConfig,
};
pub use telemetry::{OtlpExporterConfig, OtlpProtocol, TelemetryConfig};

use serde::Deserialize;

/// Errors found while validating configuration values.
#[derive(Debug, thiserror::Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// The API key is missing or empty.
    #[error("missing API key")]
    MissingCredential,
    /// A value is out of bounds or inconsistent with its neighbours.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Main configuration structure of the gateway.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// Named provider instances.
    #[serde(default)]
    pub providers: BTreeMap<String, ProviderConfig>,
    /// Admission state housekeeping.
    #[serde(default)]
    pub admission: AdmissionConfig,
    /// Call metrics collection.
    #[serde(default)]
    pub metrics: MetricsConfig,
    /// Telemetry export.
    #[serde(default)]
    pub telemetry: TelemetryConfig,
}

impl Config {
    /// Load configuration from a file path.
    pub fn load<P: AsRef<Path>>(path: P) -> anyhow::Result<Config> {
        loader::load(path)
    }

    /// Parse configuration from TOML text, expanding environment references.
    pub fn from_toml(content: &str) -> anyhow::Result<Config> {
        loader::parse(content)
    }

    /// Validates every configured provider.
    pub fn validate(&self) -> anyhow::Result<()> {
        loader::validate(self)
    }
}
