use std::time::Instant;

use opentelemetry::{KeyValue, metrics::Histogram};

/// Times one operation of a provider instance and records it, in seconds, with its outcome.
///
/// ```rust,no_run
/// use telemetry::metrics::{HEALTH_CHECK_DURATION_SECONDS, Recorder};
///
/// let probe: Result<(), String> = Ok(());
///
/// Recorder::start(HEALTH_CHECK_DURATION_SECONDS, "primary").record_result(&probe);
/// ```
pub struct Recorder {
    started_at: Instant,
    histogram: Histogram<f64>,
    attributes: Vec<KeyValue>,
}

impl Recorder {
    /// Start timing an operation of `provider`.
    pub fn start(name: &'static str, provider: impl Into<String>) -> Self {
        Self {
            started_at: Instant::now(),
            histogram: super::meter().f64_histogram(name).with_unit("s").build(),
            attributes: vec![KeyValue::new("provider", provider.into())],
        }
    }

    /// Record the elapsed time with a `status` attribute.
    pub fn record(mut self, status: &'static str) {
        self.attributes.push(KeyValue::new("status", status));
        self.histogram
            .record(self.started_at.elapsed().as_secs_f64(), &self.attributes);
    }

    /// Record the elapsed time, `ok` or `error` depending on the result.
    pub fn record_result<T, E>(self, result: &Result<T, E>) {
        self.record(if result.is_ok() { "ok" } else { "error" });
    }
}
