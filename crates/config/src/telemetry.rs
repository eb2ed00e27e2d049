//! Telemetry export settings.

use std::{collections::BTreeMap, time::Duration};

use duration_str::deserialize_duration;
use serde::Deserialize;
use url::Url;

/// Telemetry configuration for observability.
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default, deny_unknown_fields)]
pub struct TelemetryConfig {
    /// Service name reported with every metric.
    service_name: Option<String>,
    /// Custom resource attributes attached to all telemetry.
    resource_attributes: BTreeMap<String, String>,
    /// OTLP exporter settings.
    otlp: OtlpExporterConfig,
}

impl TelemetryConfig {
    /// The service name.
    pub fn service_name(&self) -> Option<&str> {
        self.service_name.as_deref()
    }

    /// The resource attributes.
    pub fn resource_attributes(&self) -> &BTreeMap<String, String> {
        &self.resource_attributes
    }

    /// The OTLP exporter settings.
    pub fn otlp(&self) -> &OtlpExporterConfig {
        &self.otlp
    }

    /// Whether metrics leave the process.
    pub fn exports_metrics(&self) -> bool {
        self.otlp.enabled
    }
}

/// OTLP exporter configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OtlpExporterConfig {
    /// Whether the exporter is enabled.
    pub enabled: bool,
    /// Collector endpoint. The exporter default is used when unset.
    pub endpoint: Option<Url>,
    /// Wire protocol.
    pub protocol: OtlpProtocol,
    /// Export request timeout.
    #[serde(deserialize_with = "deserialize_duration")]
    pub timeout: Duration,
    /// How often metrics are pushed.
    #[serde(deserialize_with = "deserialize_duration")]
    pub export_interval: Duration,
}

impl Default for OtlpExporterConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            endpoint: None,
            protocol: OtlpProtocol::default(),
            timeout: Duration::from_secs(10),
            export_interval: Duration::from_secs(60),
        }
    }
}

/// OTLP protocol selection.
#[derive(Debug, Clone, Copy, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OtlpProtocol {
    /// gRPC protocol.
    #[default]
    Grpc,
    /// HTTP/protobuf protocol.
    Http,
}
