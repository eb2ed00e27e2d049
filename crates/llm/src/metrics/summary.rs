use std::{
    collections::{BTreeMap, VecDeque},
    sync::{Mutex, PoisonError},
};

use serde::Serialize;

use super::{CallMetric, MetricsSink};
use crate::error::ErrorKind;

/// Keeps the most recent call records and summarizes them on demand.
pub struct SummarySink {
    capacity: usize,
    records: Mutex<VecDeque<CallMetric>>,
}

impl SummarySink {
    /// A ring holding at most `capacity` records. The oldest record is dropped first.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);

        Self {
            capacity,
            records: Mutex::new(VecDeque::with_capacity(capacity)),
        }
    }

    /// Aggregates of the retained records, overall and per provider and model.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);
        let mut snapshot = MetricsSnapshot::default();

        for record in records.iter() {
            snapshot.total.add(record);
            snapshot.providers.entry(record.provider.clone()).or_default().add(record);
            snapshot.models.entry(record.model.clone()).or_default().add(record);
        }

        snapshot.records = records.len();
        snapshot.total.finish();
        snapshot.providers.values_mut().for_each(Aggregate::finish);
        snapshot.models.values_mut().for_each(Aggregate::finish);

        snapshot
    }

    /// Retained records of a provider and the share of them that failed.
    pub fn error_rate(&self, provider: &str) -> (usize, f64) {
        let records = self.records.lock().unwrap_or_else(PoisonError::into_inner);

        let (calls, failures) = records
            .iter()
            .filter(|record| record.provider == provider)
            .fold((0usize, 0usize), |(calls, failures), record| {
                (calls + 1, failures + usize::from(!record.success))
            });

        if calls == 0 {
            return (0, 0.0);
        }

        (calls, failures as f64 / calls as f64)
    }
}

impl MetricsSink for SummarySink {
    fn record(&self, metric: &CallMetric) {
        let mut records = self.records.lock().unwrap_or_else(PoisonError::into_inner);

        if records.len() == self.capacity {
            records.pop_front();
        }

        records.push_back(metric.clone());
    }
}

/// Summary of the retained call records.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MetricsSnapshot {
    /// Number of records the summary covers.
    pub records: usize,
    pub total: Aggregate,
    /// Aggregates by provider instance name.
    pub providers: BTreeMap<String, Aggregate>,
    /// Aggregates by model id.
    pub models: BTreeMap<String, Aggregate>,
}

/// Aggregated figures of a set of calls.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Aggregate {
    pub calls: u64,
    pub successes: u64,
    pub failures: u64,
    /// Calls rejected before reaching the adapter.
    pub rejected: u64,
    pub streamed: u64,
    pub error_rate: f64,
    pub avg_duration_ms: f64,
    pub max_duration_ms: f64,
    /// Average time to first token over the streams that produced one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avg_time_to_first_token_ms: Option<f64>,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// Estimated spend by currency.
    pub cost: BTreeMap<String, f64>,
    pub errors: BTreeMap<ErrorKind, u64>,
    #[serde(skip)]
    total_duration_ms: f64,
    #[serde(skip)]
    total_ttft_ms: f64,
    #[serde(skip)]
    ttft_samples: u64,
}

impl Aggregate {
    fn add(&mut self, record: &CallMetric) {
        self.calls += 1;

        if record.success {
            self.successes += 1;
        } else {
            self.failures += 1;
        }

        if !record.admitted {
            self.rejected += 1;
        }

        if record.streamed {
            self.streamed += 1;
        }

        let duration = record.duration.as_secs_f64() * 1000.0;
        self.total_duration_ms += duration;
        self.max_duration_ms = self.max_duration_ms.max(duration);

        if let Some(ttft) = record.time_to_first_token {
            self.total_ttft_ms += ttft.as_secs_f64() * 1000.0;
            self.ttft_samples += 1;
        }

        self.prompt_tokens += u64::from(record.usage.prompt_tokens);
        self.completion_tokens += u64::from(record.usage.completion_tokens);
        self.total_tokens += u64::from(record.usage.total_tokens);

        if let Some(currency) = &record.currency {
            *self.cost.entry(currency.clone()).or_default() += record.cost;
        }

        if let Some(kind) = record.error_kind {
            *self.errors.entry(kind).or_default() += 1;
        }
    }

    fn finish(&mut self) {
        if self.calls > 0 {
            self.error_rate = self.failures as f64 / self.calls as f64;
            self.avg_duration_ms = self.total_duration_ms / self.calls as f64;
        }

        if self.ttft_samples > 0 {
            self.avg_time_to_first_token_ms = Some(self.total_ttft_ms / self.ttft_samples as f64);
        }
    }
}
