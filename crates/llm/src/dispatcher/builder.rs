use std::sync::{Arc, RwLock};

use circuit_breaker::{BreakerRegistry, BreakerState};
use config::{AdmissionConfig, MetricsConfig};
use rate_limit::RateLimitManager;

use super::Dispatcher;
use crate::{
    cancellation::CancellationRegistry,
    metrics::{AlertSink, LoggingAlertSink, MetricsCollector, MetricsSink, OtelSink},
};

/// Assembles a [`Dispatcher`] with its admission settings and metric sinks.
#[derive(Default)]
pub struct DispatcherBuilder {
    admission: AdmissionConfig,
    metrics: MetricsConfig,
    sinks: Vec<Arc<dyn MetricsSink>>,
    alert_sinks: Vec<Arc<dyn AlertSink>>,
}

impl DispatcherBuilder {
    pub fn admission(mut self, admission: AdmissionConfig) -> Self {
        self.admission = admission;
        self
    }

    pub fn metrics(mut self, metrics: MetricsConfig) -> Self {
        self.metrics = metrics;
        self
    }

    /// Push every call record to `sink` in addition to the built-in summary.
    pub fn with_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Export call records through the global OpenTelemetry meter.
    pub fn with_otel_sink(self) -> Self {
        self.with_sink(Arc::new(OtelSink::new()))
    }

    pub fn with_alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alert_sinks.push(sink);
        self
    }

    /// Write alerts to the log.
    pub fn with_logging_alerts(self) -> Self {
        self.with_alert_sink(Arc::new(LoggingAlertSink))
    }

    pub fn build(self) -> Dispatcher {
        let mut collector = MetricsCollector::new(&self.metrics);

        for sink in self.sinks {
            collector = collector.with_sink(sink);
        }

        for sink in self.alert_sinks {
            collector = collector.with_alert_sink(sink);
        }

        let metrics = Arc::new(collector);

        let hook_metrics = metrics.clone();
        let breakers = BreakerRegistry::with_state_change_hook(Arc::new(
            move |name: &str, from: BreakerState, to: BreakerState| {
                hook_metrics.breaker_state_changed(name, from, to);
            },
        ));

        Dispatcher {
            registrations: RwLock::default(),
            rate_limits: Arc::new(RateLimitManager::new(self.admission.idle_eviction)),
            breakers,
            cancellations: Arc::new(CancellationRegistry::new()),
            metrics,
        }
    }
}
