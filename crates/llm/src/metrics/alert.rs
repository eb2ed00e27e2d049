use std::{
    collections::{HashMap, VecDeque},
    sync::{Mutex, PoisonError},
    time::Duration,
};

use config::AlertThresholds;
use serde::Serialize;
use tokio::time::Instant;

use super::CallMetric;

const RATE_LIMIT_WINDOW: Duration = Duration::from_secs(60);

/// The condition an alert reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    ErrorRate,
    Latency,
    CostPerCall,
    RateLimitHits,
}

/// A threshold breach observed by the collector.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    /// Provider instance name.
    pub provider: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
    pub observed: f64,
    pub threshold: f64,
    pub message: String,
}

/// Receives alerts. Policy on what to do with them lives outside the core.
pub trait AlertSink: Send + Sync {
    fn alert(&self, alert: &Alert);
}

/// Writes alerts to the log as warnings.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingAlertSink;

impl AlertSink for LoggingAlertSink {
    fn alert(&self, alert: &Alert) {
        log::warn!("alert for provider '{}': {}", alert.provider, alert.message);
    }
}

/// Evaluates the configured thresholds.
pub(crate) struct AlertEvaluator {
    thresholds: AlertThresholds,
    rate_limit_hits: Mutex<HashMap<String, VecDeque<Instant>>>,
}

impl AlertEvaluator {
    pub fn new(thresholds: AlertThresholds) -> Self {
        Self {
            thresholds,
            rate_limit_hits: Mutex::new(HashMap::new()),
        }
    }

    /// Alerts raised by one call. `error_rate` is the retained sample count and failure
    /// share of the call's provider.
    pub fn on_call(&self, metric: &CallMetric, error_rate: (usize, f64)) -> Vec<Alert> {
        let mut alerts = Vec::new();
        let thresholds = &self.thresholds;

        if let Some(latency) = thresholds.latency
            && metric.duration > latency
        {
            alerts.push(Alert {
                kind: AlertKind::Latency,
                provider: metric.provider.clone(),
                model: Some(metric.model.clone()),
                observed: metric.duration.as_secs_f64(),
                threshold: latency.as_secs_f64(),
                message: format!(
                    "call to {} took {:?}, above the {:?} threshold",
                    metric.model, metric.duration, latency
                ),
            });
        }

        if let Some(limit) = thresholds.cost_per_call
            && metric.cost > limit
        {
            alerts.push(Alert {
                kind: AlertKind::CostPerCall,
                provider: metric.provider.clone(),
                model: Some(metric.model.clone()),
                observed: metric.cost,
                threshold: limit,
                message: format!(
                    "call to {} cost {:.6} {}, above the {limit} threshold",
                    metric.model,
                    metric.cost,
                    metric.currency.as_deref().unwrap_or_default()
                ),
            });
        }

        let (samples, rate) = error_rate;

        if let Some(limit) = thresholds.error_rate
            && !metric.success
            && samples >= thresholds.min_samples
            && rate > limit
        {
            alerts.push(Alert {
                kind: AlertKind::ErrorRate,
                provider: metric.provider.clone(),
                model: None,
                observed: rate,
                threshold: limit,
                message: format!("error rate {:.1}% over the last {samples} calls", rate * 100.0),
            });
        }

        alerts
    }

    /// Count a local rate limit rejection. Alerts when the hits of the last minute first
    /// exceed the threshold.
    pub fn on_rate_limited(&self, provider: &str) -> Option<Alert> {
        let limit = self.thresholds.rate_limit_hits_per_minute?;
        let now = Instant::now();

        let mut hits = self.rate_limit_hits.lock().unwrap_or_else(PoisonError::into_inner);
        let window = hits.entry(provider.to_string()).or_default();

        while window
            .front()
            .is_some_and(|hit| *hit + RATE_LIMIT_WINDOW <= now)
        {
            window.pop_front();
        }

        window.push_back(now);

        let count = window.len();

        (count == limit as usize + 1).then(|| Alert {
            kind: AlertKind::RateLimitHits,
            provider: provider.to_string(),
            model: None,
            observed: count as f64,
            threshold: f64::from(limit),
            message: format!("{count} local rate limit rejections within a minute"),
        })
    }
}
