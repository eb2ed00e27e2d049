use config::ProviderKind;
use futures::StreamExt;
use integration_tests::{MockVendor, Reply, dispatcher, hello, payloads::openai, provider};
use llm::{ErrorKind, RequestContext, StreamEvent, Usage};

const CHAT: &str = "/v1/chat/completions";

#[tokio::test]
async fn generate_returns_text_and_records_cost() {
    let vendor = MockVendor::new()
        .post(CHAT, Reply::json(openai::completion("gpt-4o-mini", "hello", (1, 1, 2))))
        .start()
        .await
        .unwrap();

    let dispatcher = dispatcher();
    dispatcher
        .register("p1", &provider(ProviderKind::Openai, &vendor, "/v1"))
        .unwrap();

    let result = dispatcher
        .generate(&RequestContext::new(), "p1", hello("gpt-4o-mini"))
        .await
        .unwrap();

    assert_eq!(result.text(), Some("hello"));
    assert_eq!(result.usage, Usage::new(1, 1, Some(2)));

    let request = vendor.last_request();
    assert_eq!(request.header("authorization"), Some("Bearer k"));

    let body = request.body.unwrap();
    assert_eq!(body["model"], "gpt-4o-mini");
    assert_eq!(body["messages"][0]["role"], "user");
    assert_eq!(body["messages"][0]["content"], "hi");
    assert!(body.get("stream").is_none());

    let snapshot = dispatcher.metrics_snapshot();
    let aggregate = &snapshot.providers["p1"];

    assert_eq!(aggregate.successes, 1);
    assert_eq!(aggregate.total_tokens, 2);

    let expected = 1.0 / 1000.0 * 0.00015 + 1.0 / 1000.0 * 0.0006;
    assert!((aggregate.cost["USD"] - expected).abs() < 1e-15);
    assert!((expected - 7.5e-7).abs() < 1e-15);
}

#[tokio::test]
async fn stream_forwards_increments_then_done() {
    let vendor = MockVendor::new()
        .post(
            CHAT,
            Reply::sse([
                openai::delta("he"),
                openai::delta("llo"),
                openai::finish("stop"),
                openai::usage(1, 2),
                "[DONE]".to_string(),
            ]),
        )
        .start()
        .await
        .unwrap();

    let dispatcher = dispatcher();
    dispatcher
        .register("p1", &provider(ProviderKind::Openai, &vendor, "/v1"))
        .unwrap();

    let stream = dispatcher
        .generate_stream(&RequestContext::new(), "p1", hello("gpt-4o-mini"))
        .await
        .unwrap();

    let events: Vec<_> = stream.collect().await;

    insta::assert_json_snapshot!(events, @r#"
    [
      {
        "type": "delta",
        "index": 0,
        "content": "he"
      },
      {
        "type": "delta",
        "index": 0,
        "content": "llo"
      },
      {
        "type": "done",
        "finish_reason": "stop",
        "usage": {
          "prompt_tokens": 1,
          "completion_tokens": 2,
          "total_tokens": 3
        }
      }
    ]
    "#);

    let body = vendor.last_request().body.unwrap();
    assert_eq!(body["stream"], true);
    assert_eq!(body["stream_options"]["include_usage"], true);

    let aggregate = &dispatcher.metrics_snapshot().providers["p1"];
    assert_eq!(aggregate.streamed, 1);
    assert_eq!(aggregate.successes, 1);
    assert_eq!(aggregate.completion_tokens, 2);
}

#[tokio::test]
async fn stream_without_terminal_gets_one() {
    let vendor = MockVendor::new()
        .post(CHAT, Reply::sse([openai::delta("partial")]))
        .start()
        .await
        .unwrap();

    let dispatcher = dispatcher();
    dispatcher
        .register("p1", &provider(ProviderKind::Openai, &vendor, "/v1"))
        .unwrap();

    let events: Vec<_> = dispatcher
        .generate_stream(&RequestContext::new(), "p1", hello("gpt-4o-mini"))
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(events.len(), 2);
    assert_eq!(events.iter().filter(|event| event.is_terminal()).count(), 1);
    assert!(matches!(events[1], StreamEvent::Done { .. }));
}

async fn error_kind(status: u16, body: serde_json::Value) -> ErrorKind {
    let vendor = MockVendor::new().post(CHAT, Reply::error(status, body)).start().await.unwrap();

    let dispatcher = dispatcher();
    dispatcher
        .register("p1", &provider(ProviderKind::Openai, &vendor, "/v1"))
        .unwrap();

    let error = dispatcher
        .generate(&RequestContext::new(), "p1", hello("gpt-4o-mini"))
        .await
        .unwrap_err();

    assert_eq!(error.provider(), Some(ProviderKind::Openai));
    assert_eq!(error.model(), Some("gpt-4o-mini"));

    error.kind()
}

#[tokio::test]
async fn upstream_errors_are_mapped() {
    let unauthorized = openai::error("invalid_request_error", "invalid_api_key", "Incorrect API key provided");
    assert_eq!(error_kind(401, unauthorized).await, ErrorKind::Unauthorized);

    let throttled = openai::error("requests", "rate_limit_exceeded", "Rate limit reached");
    assert_eq!(error_kind(429, throttled).await, ErrorKind::RateLimitedUpstream);

    let quota = openai::error("insufficient_quota", "insufficient_quota", "You exceeded your current quota");
    assert_eq!(error_kind(429, quota).await, ErrorKind::QuotaExceeded);

    let overloaded = serde_json::json!({"error": {"message": "The server is overloaded"}});
    assert_eq!(error_kind(503, overloaded).await, ErrorKind::UpstreamUnavailable);

    let missing = openai::error("invalid_request_error", "model_not_found", "The model does not exist");
    assert_eq!(error_kind(404, missing).await, ErrorKind::ModelUnavailable);
}

#[tokio::test]
async fn models_are_listed_live_and_priced() {
    let vendor = MockVendor::new()
        .get(
            "/v1/models",
            Reply::json(openai::models(&["gpt-4o-mini", "text-embedding-3-small", "whisper-1"])),
        )
        .start()
        .await
        .unwrap();

    let dispatcher = dispatcher();
    dispatcher
        .register("p1", &provider(ProviderKind::Openai, &vendor, "/v1"))
        .unwrap();

    let models = dispatcher.list_models(&RequestContext::new(), "p1").await.unwrap();

    assert_eq!(models.len(), 1);
    assert_eq!(models[0].id, "gpt-4o-mini");
    assert_eq!(models[0].pricing.as_ref().map(|pricing| pricing.input), Some(0.00015));

    let health = dispatcher.health_check_all(&RequestContext::new()).await;
    assert!(health["p1"].is_ok());
    assert_eq!(vendor.hits("/v1/models"), 2);
}
