use std::{sync::Arc, time::Duration};

use config::{CircuitBreakerConfig, ProviderKind, RateLimitPolicy, TripPolicy};
use integration_tests::{MockVendor, Reply, dispatcher, hello, payloads::openai, provider};
use llm::{BreakerState, Counts, ErrorKind, RequestContext, TripPredicate};

const CHAT: &str = "/v1/chat/completions";

fn overloaded() -> Reply {
    Reply::error(503, serde_json::json!({"error": {"message": "The server is overloaded"}}))
}

fn breaker() -> CircuitBreakerConfig {
    CircuitBreakerConfig {
        max_requests: 1,
        interval: Duration::ZERO,
        timeout: Duration::from_millis(100),
        trip: TripPolicy::ConsecutiveFailures { threshold: 3 },
    }
}

#[tokio::test]
async fn breaker_opens_then_recovers() {
    let vendor = MockVendor::new()
        .post(CHAT, overloaded())
        .post(CHAT, overloaded())
        .post(CHAT, overloaded())
        .post(CHAT, Reply::json(openai::completion("gpt-4o-mini", "back", (1, 1, 2))))
        .start()
        .await
        .unwrap();

    let dispatcher = dispatcher();
    let config = provider(ProviderKind::Openai, &vendor, "/v1").with_circuit_breaker(breaker());
    dispatcher.register("p1", &config).unwrap();

    for _ in 0..3 {
        let error = dispatcher
            .generate(&RequestContext::new(), "p1", hello("gpt-4o-mini"))
            .await
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::UpstreamUnavailable);
    }

    assert_eq!(dispatcher.breaker_states()["p1"], BreakerState::Open);

    let error = dispatcher
        .generate(&RequestContext::new(), "p1", hello("gpt-4o-mini"))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::AdmissionDenied);
    assert_eq!(vendor.hits(CHAT), 3);

    tokio::time::sleep(Duration::from_millis(150)).await;

    let result = dispatcher
        .generate(&RequestContext::new(), "p1", hello("gpt-4o-mini"))
        .await
        .unwrap();

    assert_eq!(result.text(), Some("back"));
    assert_eq!(dispatcher.breaker_states()["p1"], BreakerState::Closed);
    assert_eq!(vendor.hits(CHAT), 4);

    let aggregate = &dispatcher.metrics_snapshot().providers["p1"];
    assert_eq!(aggregate.calls, 5);
    assert_eq!(aggregate.rejected, 1);
    assert_eq!(aggregate.errors.get(&ErrorKind::AdmissionDenied), Some(&1));
}

#[tokio::test]
async fn custom_trip_predicate() {
    let vendor = MockVendor::new().post(CHAT, overloaded()).start().await.unwrap();

    let predicate: TripPredicate = Arc::new(|counts: &Counts| counts.total_failures >= 1);

    let dispatcher = dispatcher();
    let config = provider(ProviderKind::Openai, &vendor, "/v1").with_circuit_breaker(breaker());
    dispatcher.register_with_trip_predicate("p1", &config, predicate).unwrap();

    dispatcher
        .generate(&RequestContext::new(), "p1", hello("gpt-4o-mini"))
        .await
        .unwrap_err();

    assert_eq!(dispatcher.breaker_states()["p1"], BreakerState::Open);
}

#[tokio::test]
async fn client_errors_count_as_breaker_failures() {
    let vendor = MockVendor::new()
        .post(
            CHAT,
            Reply::error(
                400,
                openai::error("invalid_request_error", "context_length_exceeded", "too long"),
            ),
        )
        .start()
        .await
        .unwrap();

    let dispatcher = dispatcher();
    let config = provider(ProviderKind::Openai, &vendor, "/v1").with_circuit_breaker(breaker());
    dispatcher.register("p1", &config).unwrap();

    for _ in 0..3 {
        let error = dispatcher
            .generate(&RequestContext::new(), "p1", hello("gpt-4o-mini"))
            .await
            .unwrap_err();

        assert_eq!(error.kind(), ErrorKind::InvalidRequest);
    }

    assert_eq!(dispatcher.breaker_states()["p1"], BreakerState::Open);
}

#[tokio::test]
async fn rate_limit_rejects_before_the_upstream() {
    let vendor = MockVendor::new()
        .post(CHAT, Reply::json(openai::completion("gpt-4o-mini", "hello", (1, 1, 2))))
        .start()
        .await
        .unwrap();

    let dispatcher = dispatcher();
    let config = provider(ProviderKind::Openai, &vendor, "/v1").with_rate_limit(RateLimitPolicy::token_bucket(1.0, 1));
    dispatcher.register("p1", &config).unwrap();

    dispatcher
        .generate(&RequestContext::new(), "p1", hello("gpt-4o-mini"))
        .await
        .unwrap();

    let error = dispatcher
        .generate(&RequestContext::new(), "p1", hello("gpt-4o-mini"))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::AdmissionDenied);
    assert!(error.details().contains_key("retry_after_ms"));
    assert_eq!(vendor.hits(CHAT), 1);

    let aggregate = &dispatcher.metrics_snapshot().providers["p1"];
    assert_eq!(aggregate.successes, 1);
    assert_eq!(aggregate.rejected, 1);
}

#[tokio::test]
async fn waiting_policy_delays_instead_of_rejecting() {
    let vendor = MockVendor::new()
        .post(CHAT, Reply::json(openai::completion("gpt-4o-mini", "hello", (1, 1, 2))))
        .start()
        .await
        .unwrap();

    let dispatcher = dispatcher();
    let policy = RateLimitPolicy::token_bucket(20.0, 1).waiting();
    let config = provider(ProviderKind::Openai, &vendor, "/v1").with_rate_limit(policy);
    dispatcher.register("p1", &config).unwrap();

    for _ in 0..3 {
        dispatcher
            .generate(&RequestContext::new().with_timeout(Duration::from_secs(5)), "p1", hello("gpt-4o-mini"))
            .await
            .unwrap();
    }

    assert_eq!(vendor.hits(CHAT), 3);
}

#[tokio::test]
async fn unknown_instance_is_not_found() {
    let dispatcher = dispatcher();

    let error = dispatcher
        .generate(&RequestContext::new(), "missing", hello("gpt-4o-mini"))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::ProviderNotFound);
    assert_eq!(dispatcher.metrics_snapshot().total.calls, 0);
}
