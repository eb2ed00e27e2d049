use config::ProviderKind;
use futures::StreamExt;
use integration_tests::{MockVendor, Reply, dispatcher, hello, payloads::claude, provider};
use llm::{ErrorKind, RequestContext, StreamEvent, Usage};

const MESSAGES: &str = "/v1/messages";

#[tokio::test]
async fn default_max_tokens_and_headers_are_sent() {
    let vendor = MockVendor::new()
        .post(MESSAGES, Reply::json(claude::message("claude-3-5-sonnet-20241022", "hello", (3, 1))))
        .start()
        .await
        .unwrap();

    let dispatcher = dispatcher();
    dispatcher
        .register("anthropic", &provider(ProviderKind::Claude, &vendor, ""))
        .unwrap();

    let result = dispatcher
        .generate(&RequestContext::new(), "anthropic", hello("claude-3-5-sonnet-20241022"))
        .await
        .unwrap();

    assert_eq!(result.text(), Some("hello"));
    assert_eq!(result.usage, Usage::new(3, 1, None));
    assert_eq!(result.choices[0].finish_reason.as_deref(), Some("end_turn"));

    let request = vendor.last_request();
    assert_eq!(request.header("x-api-key"), Some("k"));
    assert_eq!(request.header("anthropic-version"), Some("2023-06-01"));
    assert_eq!(request.header("authorization"), None);

    let body = request.body.unwrap();
    assert_eq!(body["max_tokens"], 4096);
    assert_eq!(body["messages"][0]["content"], "hi");
}

#[tokio::test]
async fn system_turns_move_to_the_top_level() {
    let vendor = MockVendor::new()
        .post(MESSAGES, Reply::json(claude::message("claude-3-5-haiku-20241022", "ok", (5, 1))))
        .start()
        .await
        .unwrap();

    let dispatcher = dispatcher();
    dispatcher
        .register("anthropic", &provider(ProviderKind::Claude, &vendor, ""))
        .unwrap();

    let mut request = hello("claude-3-5-haiku-20241022");
    request.messages.insert(0, llm::Message::system("be brief"));
    request.max_tokens = Some(64);

    dispatcher
        .generate(&RequestContext::new(), "anthropic", request)
        .await
        .unwrap();

    let body = vendor.last_request().body.unwrap();
    assert_eq!(body["system"], "be brief");
    assert_eq!(body["max_tokens"], 64);
    assert_eq!(body["messages"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn named_events_stream_in_order() {
    let events = claude::stream("claude-3-5-sonnet-20241022", &["he", "llo"], (3, 2));

    let vendor = MockVendor::new()
        .post(MESSAGES, Reply::events(events))
        .start()
        .await
        .unwrap();

    let dispatcher = dispatcher();
    dispatcher
        .register("anthropic", &provider(ProviderKind::Claude, &vendor, ""))
        .unwrap();

    let events: Vec<_> = dispatcher
        .generate_stream(&RequestContext::new(), "anthropic", hello("claude-3-5-sonnet-20241022"))
        .await
        .unwrap()
        .collect()
        .await;

    let text: String = events
        .iter()
        .filter_map(|event| match event {
            StreamEvent::Delta { content, .. } => Some(content.as_str()),
            _ => None,
        })
        .collect();

    assert_eq!(text, "hello");

    let Some(StreamEvent::Done { finish_reason, usage }) = events.last() else {
        unreachable!("the stream must end with done, got {events:?}");
    };

    assert_eq!(finish_reason.as_deref(), Some("end_turn"));
    assert_eq!(*usage, Some(Usage::new(3, 2, None)));
    assert_eq!(events.iter().filter(|event| event.is_terminal()).count(), 1);
}

#[tokio::test]
async fn overloaded_is_upstream_unavailable() {
    let vendor = MockVendor::new()
        .post(MESSAGES, Reply::error(529, claude::error("overloaded_error", "Overloaded")))
        .start()
        .await
        .unwrap();

    let dispatcher = dispatcher();
    dispatcher
        .register("anthropic", &provider(ProviderKind::Claude, &vendor, ""))
        .unwrap();

    let error = dispatcher
        .generate(&RequestContext::new(), "anthropic", hello("claude-3-5-sonnet-20241022"))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::UpstreamUnavailable);
    assert_eq!(error.message(), "Overloaded");
    assert!(error.retryable());
}

#[tokio::test]
async fn health_lists_one_model() {
    let vendor = MockVendor::new()
        .get("/v1/models", Reply::json(serde_json::json!({"data": [], "has_more": false})))
        .start()
        .await
        .unwrap();

    let dispatcher = dispatcher();
    dispatcher
        .register("anthropic", &provider(ProviderKind::Claude, &vendor, ""))
        .unwrap();

    let health = dispatcher.health_check_all(&RequestContext::new()).await;
    assert!(health["anthropic"].is_ok());

    let request = vendor.last_request();
    assert_eq!(request.path, "/v1/models");
    assert_eq!(request.query.as_deref(), Some("limit=1"));
    assert_eq!(vendor.hits(MESSAGES), 0);
}
