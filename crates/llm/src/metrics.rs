//! Call records, cost estimation and their distribution to sinks.
//!
//! Every call the dispatcher finishes becomes one [`CallMetric`]. The collector prices it,
//! pushes it to every registered [`MetricsSink`] and checks the alert thresholds. The
//! built-in [`SummarySink`] keeps the latest records for [`MetricsCollector::snapshot`].

mod alert;
mod call;
mod pricing;
mod sink;
mod summary;

use std::{
    panic::{AssertUnwindSafe, catch_unwind},
    sync::Arc,
};

use circuit_breaker::BreakerState;
use config::MetricsConfig;

pub use alert::{Alert, AlertKind, AlertSink, LoggingAlertSink};
pub use call::CallMetric;
pub(crate) use call::CallTimer;
pub use pricing::{PricingTable, cost};
pub use sink::{MetricsSink, OtelSink};
pub use summary::{Aggregate, MetricsSnapshot, SummarySink};

use alert::AlertEvaluator;

/// Fans call records out to the sinks and evaluates alerts.
pub struct MetricsCollector {
    pricing: PricingTable,
    summary: Arc<SummarySink>,
    sinks: Vec<Arc<dyn MetricsSink>>,
    alert_sinks: Vec<Arc<dyn AlertSink>>,
    alerts: AlertEvaluator,
}

impl Default for MetricsCollector {
    fn default() -> Self {
        Self::new(&MetricsConfig::default())
    }
}

impl MetricsCollector {
    /// A collector with only the summarizing sink.
    pub fn new(config: &MetricsConfig) -> Self {
        let summary = Arc::new(SummarySink::new(config.history_size));

        Self {
            pricing: PricingTable::new(),
            sinks: vec![summary.clone()],
            summary,
            alert_sinks: Vec::new(),
            alerts: AlertEvaluator::new(config.alerts.clone()),
        }
    }

    pub fn with_sink(mut self, sink: Arc<dyn MetricsSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn with_alert_sink(mut self, sink: Arc<dyn AlertSink>) -> Self {
        self.alert_sinks.push(sink);
        self
    }

    pub fn pricing(&self) -> &PricingTable {
        &self.pricing
    }

    /// Aggregates of the retained records.
    pub fn snapshot(&self) -> MetricsSnapshot {
        self.summary.snapshot()
    }

    /// Price the record and push it to every sink.
    pub fn record(&self, mut metric: CallMetric) -> CallMetric {
        let (cost, currency) = self.pricing.cost(metric.kind, &metric.model, &metric.usage);
        metric.cost = cost;
        metric.currency = currency;

        self.each_sink("record", |sink| sink.record(&metric));

        let error_rate = self.summary.error_rate(&metric.provider);

        for alert in self.alerts.on_call(&metric, error_rate) {
            self.alert(&alert);
        }

        metric
    }

    pub(crate) fn call_started(&self, provider: &str, model: &str) {
        self.each_sink("call_started", |sink| sink.call_started(provider, model));
    }

    pub(crate) fn call_ended(&self, provider: &str, model: &str) {
        self.each_sink("call_ended", |sink| sink.call_ended(provider, model));
    }

    pub(crate) fn rate_limited(&self, provider: &str) {
        self.each_sink("rate_limited", |sink| sink.rate_limited(provider));

        if let Some(alert) = self.alerts.on_rate_limited(provider) {
            self.alert(&alert);
        }
    }

    pub(crate) fn breaker_state_changed(&self, provider: &str, from: BreakerState, to: BreakerState) {
        self.each_sink("breaker_state_changed", |sink| sink.breaker_state_changed(provider, from, to));
    }

    fn each_sink(&self, event: &str, f: impl Fn(&dyn MetricsSink)) {
        for sink in &self.sinks {
            if catch_unwind(AssertUnwindSafe(|| f(sink.as_ref()))).is_err() {
                log::error!("metrics sink panicked while handling {event}");
            }
        }
    }

    fn alert(&self, alert: &Alert) {
        for sink in &self.alert_sinks {
            if catch_unwind(AssertUnwindSafe(|| sink.alert(alert))).is_err() {
                log::error!("alert sink panicked while handling a {:?} alert", alert.kind);
            }
        }
    }
}
