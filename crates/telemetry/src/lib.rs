//! Telemetry library for the gateway
//!
//! Provides the OpenTelemetry meter the call metrics are recorded on, and its OTLP export.

pub mod metrics;

use config::TelemetryConfig;
use opentelemetry_sdk::metrics::SdkMeterProvider;

pub use opentelemetry::{
    KeyValue,
    metrics::{Counter, Gauge, Histogram, Meter, UpDownCounter},
};

/// Keeps the meter provider alive. Dropping it flushes pending exports and shuts the
/// exporter down, so hold it until the process exits.
pub struct TelemetryGuard {
    meter_provider: SdkMeterProvider,
    exporting: bool,
}

impl TelemetryGuard {
    /// Push every pending data point now.
    pub fn force_flush(&self) -> anyhow::Result<()> {
        self.meter_provider
            .force_flush()
            .map_err(|e| anyhow::anyhow!("Failed to flush metrics: {e}"))
    }
}

impl Drop for TelemetryGuard {
    fn drop(&mut self) {
        if self.exporting {
            log::debug!("Flushing metrics before shutdown");
        }

        if let Err(e) = self.meter_provider.shutdown() {
            log::error!("Failed to shutdown meter provider: {e}");
        }
    }
}

/// Install the global meter provider described by the configuration.
///
/// Without an enabled OTLP exporter the instruments still work, their data just stays in
/// the process.
pub fn init(config: &TelemetryConfig) -> anyhow::Result<TelemetryGuard> {
    let meter_provider = metrics::init_metrics(config)?;

    Ok(TelemetryGuard {
        meter_provider,
        exporting: config.exports_metrics(),
    })
}
