use circuit_breaker::BreakerState;
use telemetry::{
    Counter, Gauge, Histogram, KeyValue, UpDownCounter,
    metrics::{
        ACTIVE_REQUESTS, BREAKER_STATE, COST_TOTAL, ERRORS_TOTAL, RATE_LIMIT_HITS_TOTAL, REQUEST_DURATION_SECONDS,
        REQUESTS_TOTAL, TIME_TO_FIRST_TOKEN_SECONDS, TOKENS_TOTAL,
    },
};

use super::CallMetric;

/// Receives every call record and the admission events of the dispatcher.
///
/// Sinks are invoked synchronously on the calling task. A panicking sink is isolated
/// from the call and from the other sinks.
pub trait MetricsSink: Send + Sync {
    /// A call completed, successfully or not.
    fn record(&self, metric: &CallMetric);

    /// An admitted call reached its adapter.
    fn call_started(&self, _provider: &str, _model: &str) {}

    /// An admitted call completed. Paired with exactly one [`MetricsSink::call_started`].
    fn call_ended(&self, _provider: &str, _model: &str) {}

    /// A call was rejected by the local rate limiter.
    fn rate_limited(&self, _provider: &str) {}

    /// A circuit breaker moved between states.
    fn breaker_state_changed(&self, _provider: &str, _from: BreakerState, _to: BreakerState) {}
}

/// Exports call records to the OpenTelemetry meter.
pub struct OtelSink {
    requests: Counter<u64>,
    duration: Histogram<f64>,
    time_to_first_token: Histogram<f64>,
    tokens: Counter<u64>,
    cost: Counter<f64>,
    errors: Counter<u64>,
    active: UpDownCounter<i64>,
    rate_limit_hits: Counter<u64>,
    breaker_state: Gauge<i64>,
}

impl Default for OtelSink {
    fn default() -> Self {
        Self::new()
    }
}

impl OtelSink {
    pub fn new() -> Self {
        let meter = telemetry::metrics::meter();

        Self {
            requests: meter.u64_counter(REQUESTS_TOTAL).build(),
            duration: meter.f64_histogram(REQUEST_DURATION_SECONDS).with_unit("s").build(),
            time_to_first_token: meter.f64_histogram(TIME_TO_FIRST_TOKEN_SECONDS).with_unit("s").build(),
            tokens: meter.u64_counter(TOKENS_TOTAL).build(),
            cost: meter.f64_counter(COST_TOTAL).build(),
            errors: meter.u64_counter(ERRORS_TOTAL).build(),
            active: meter.i64_up_down_counter(ACTIVE_REQUESTS).build(),
            rate_limit_hits: meter.u64_counter(RATE_LIMIT_HITS_TOTAL).build(),
            breaker_state: meter.i64_gauge(BREAKER_STATE).build(),
        }
    }
}

fn call_attributes(provider: &str, model: &str) -> Vec<KeyValue> {
    vec![
        KeyValue::new("provider", provider.to_string()),
        KeyValue::new("model", model.to_string()),
    ]
}

fn with_attribute(mut attributes: Vec<KeyValue>, key: &'static str, value: impl Into<String>) -> Vec<KeyValue> {
    attributes.push(KeyValue::new(key, value.into()));
    attributes
}

impl MetricsSink for OtelSink {
    fn record(&self, metric: &CallMetric) {
        let attributes = call_attributes(&metric.provider, &metric.model);
        let status = if metric.success { "success" } else { "error" };

        self.requests
            .add(1, &with_attribute(attributes.clone(), "status", status));

        self.duration.record(metric.duration.as_secs_f64(), &attributes);

        if let Some(ttft) = metric.time_to_first_token {
            self.time_to_first_token.record(ttft.as_secs_f64(), &attributes);
        }

        let usage = &metric.usage;

        for (kind, count) in [
            ("prompt", usage.prompt_tokens),
            ("completion", usage.completion_tokens),
            ("total", usage.total_tokens),
        ] {
            if count > 0 {
                self.tokens
                    .add(u64::from(count), &with_attribute(attributes.clone(), "type", kind));
            }
        }

        if metric.cost > 0.0
            && let Some(currency) = &metric.currency
        {
            self.cost
                .add(metric.cost, &with_attribute(attributes.clone(), "currency", currency.clone()));
        }

        if let Some(kind) = metric.error_kind {
            self.errors
                .add(1, &with_attribute(attributes, "error_kind", kind.as_str()));
        }
    }

    fn call_started(&self, provider: &str, model: &str) {
        self.active.add(1, &call_attributes(provider, model));
    }

    fn call_ended(&self, provider: &str, model: &str) {
        self.active.add(-1, &call_attributes(provider, model));
    }

    fn rate_limited(&self, provider: &str) {
        self.rate_limit_hits
            .add(1, &[KeyValue::new("provider", provider.to_string())]);
    }

    fn breaker_state_changed(&self, provider: &str, _from: BreakerState, to: BreakerState) {
        self.breaker_state
            .record(to.gauge_value(), &[KeyValue::new("provider", provider.to_string())]);
    }
}
