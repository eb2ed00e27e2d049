//! Metrics initialization and management

mod names;
mod recorder;

pub use names::*;
pub use recorder::Recorder;

use anyhow::Context;
use config::{OtlpProtocol, TelemetryConfig};
use opentelemetry::metrics::Meter;
use opentelemetry_otlp::{MetricExporter, WithExportConfig};
use opentelemetry_sdk::{
    Resource,
    metrics::{PeriodicReader, SdkMeterProvider},
};

const METER_NAME: &str = "llm-gateway";

/// Get the global meter for recording metrics
pub fn meter() -> Meter {
    opentelemetry::global::meter(METER_NAME)
}

/// Initialize the metrics subsystem
pub(crate) fn init_metrics(config: &TelemetryConfig) -> anyhow::Result<SdkMeterProvider> {
    let meter_provider = create_meter_provider(config)?;

    opentelemetry::global::set_meter_provider(meter_provider.clone());

    log::info!(
        "Telemetry metrics initialized for service '{}'",
        config.service_name().unwrap_or(METER_NAME)
    );

    Ok(meter_provider)
}

fn create_meter_provider(config: &TelemetryConfig) -> anyhow::Result<SdkMeterProvider> {
    if !config.exports_metrics() {
        log::debug!("OTLP exporter disabled, metrics will be recorded but not exported");
        return Ok(SdkMeterProvider::builder().with_resource(resource(config)).build());
    }

    let otlp = config.otlp();

    let exporter = match otlp.protocol {
        OtlpProtocol::Grpc => {
            let mut builder = MetricExporter::builder().with_tonic().with_timeout(otlp.timeout);

            if let Some(endpoint) = &otlp.endpoint {
                builder = builder.with_endpoint(endpoint.as_str());
            }

            builder.build().context("Failed to create gRPC OTLP metric exporter")?
        }
        OtlpProtocol::Http => {
            let mut builder = MetricExporter::builder().with_http().with_timeout(otlp.timeout);

            if let Some(endpoint) = &otlp.endpoint {
                builder = builder.with_endpoint(endpoint.as_str());
            }

            builder.build().context("Failed to create HTTP OTLP metric exporter")?
        }
    };

    let reader = PeriodicReader::builder(exporter)
        .with_interval(otlp.export_interval)
        .build();

    let provider = SdkMeterProvider::builder()
        .with_resource(resource(config))
        .with_reader(reader)
        .build();

    log::info!(
        "OTLP metrics exporter initialized via {:?}, exporting every {:?}",
        otlp.protocol,
        otlp.export_interval
    );

    Ok(provider)
}

fn resource(config: &TelemetryConfig) -> Resource {
    use opentelemetry::{Key, KeyValue, Value};

    let mut builder = Resource::builder().with_service_name(config.service_name().unwrap_or(METER_NAME).to_string());

    for (key, value) in config.resource_attributes() {
        builder = builder.with_attribute(KeyValue::new(Key::from(key.clone()), Value::from(value.clone())));
    }

    builder.build()
}

#[cfg(test)]
mod tests {
    use config::TelemetryConfig;

    #[tokio::test]
    async fn disabled_exporter_still_provides_instruments() {
        let guard = crate::init(&TelemetryConfig::default()).unwrap();

        let counter = super::meter().u64_counter(super::REQUESTS_TOTAL).build();
        counter.add(1, &[]);

        guard.force_flush().unwrap();
    }
}
