use std::sync::{Arc, Mutex};

use config::{AlertThresholds, MetricsConfig, ProviderKind, RateLimitPolicy};
use integration_tests::{MockVendor, Reply, hello, init_logger, payloads::openai, provider};
use llm::{
    BreakerState, Dispatcher, RequestContext,
    metrics::{Alert, AlertKind, AlertSink, CallMetric, MetricsSink},
};

#[derive(Default)]
struct Recording {
    metrics: Mutex<Vec<CallMetric>>,
    transitions: Mutex<Vec<(String, BreakerState, BreakerState)>>,
    alerts: Mutex<Vec<Alert>>,
}

impl MetricsSink for Recording {
    fn record(&self, metric: &CallMetric) {
        self.metrics.lock().unwrap().push(metric.clone());
    }

    fn breaker_state_changed(&self, provider: &str, from: BreakerState, to: BreakerState) {
        self.transitions.lock().unwrap().push((provider.to_string(), from, to));
    }
}

impl AlertSink for Recording {
    fn alert(&self, alert: &Alert) {
        self.alerts.lock().unwrap().push(alert.clone());
    }
}

#[tokio::test]
async fn every_call_reaches_custom_sinks_once() {
    init_logger();

    let vendor = MockVendor::new()
        .post("/v1/chat/completions", Reply::json(openai::completion("gpt-4o-mini", "hello", (1, 1, 2))))
        .start()
        .await
        .unwrap();

    let recording = Arc::new(Recording::default());
    let dispatcher = Dispatcher::builder().with_sink(recording.clone()).build();

    dispatcher
        .register("p1", &provider(ProviderKind::Openai, &vendor, "/v1"))
        .unwrap();

    let context = RequestContext::new().with_correlation_key("trace-1");
    dispatcher.generate(&context, "p1", hello("gpt-4o-mini")).await.unwrap();

    let metrics = recording.metrics.lock().unwrap().clone();
    assert_eq!(metrics.len(), 1);

    let metric = &metrics[0];
    assert_eq!(metric.correlation_id, "trace-1");
    assert_eq!(metric.provider, "p1");
    assert_eq!(metric.kind, ProviderKind::Openai);
    assert_eq!(metric.model, "gpt-4o-mini");
    assert!(metric.success);
    assert!(metric.admitted);
    assert!(!metric.streamed);
    assert_eq!(metric.currency.as_deref(), Some("USD"));
    assert!(metric.ended_at >= metric.started_at);
}

#[tokio::test]
async fn breaker_transitions_and_rate_limit_alerts() {
    init_logger();

    let vendor = MockVendor::new()
        .post(
            "/v1/chat/completions",
            Reply::error(503, serde_json::json!({"error": {"message": "down"}})),
        )
        .start()
        .await
        .unwrap();

    let recording = Arc::new(Recording::default());

    let metrics = MetricsConfig {
        alerts: AlertThresholds {
            rate_limit_hits_per_minute: Some(1),
            ..Default::default()
        },
        ..Default::default()
    };

    let dispatcher = Dispatcher::builder()
        .metrics(metrics)
        .with_sink(recording.clone())
        .with_alert_sink(recording.clone())
        .build();

    let config = provider(ProviderKind::Openai, &vendor, "/v1")
        .with_rate_limit(RateLimitPolicy::token_bucket(0.01, 1))
        .with_circuit_breaker(config::CircuitBreakerConfig {
            trip: config::TripPolicy::ConsecutiveFailures { threshold: 1 },
            ..Default::default()
        });

    dispatcher.register("p1", &config).unwrap();

    for _ in 0..3 {
        dispatcher
            .generate(&RequestContext::new(), "p1", hello("gpt-4o-mini"))
            .await
            .unwrap_err();
    }

    let transitions = recording.transitions.lock().unwrap().clone();
    assert_eq!(
        transitions,
        vec![("p1".to_string(), BreakerState::Closed, BreakerState::Open)]
    );

    let alerts = recording.alerts.lock().unwrap().clone();
    assert_eq!(alerts.len(), 1);
    assert_eq!(alerts[0].kind, AlertKind::RateLimitHits);
    assert_eq!(alerts[0].provider, "p1");

    assert_eq!(recording.metrics.lock().unwrap().len(), 3);
}
