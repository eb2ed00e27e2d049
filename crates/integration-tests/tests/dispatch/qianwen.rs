use config::ProviderKind;
use futures::StreamExt;
use integration_tests::{MockVendor, Reply, dispatcher, hello, payloads::qianwen, provider};
use llm::{ErrorKind, RequestContext, StreamEvent, Usage};

const GENERATION: &str = "/api/v1/services/aigc/text-generation/generation";

#[tokio::test]
async fn generation_uses_the_dashscope_envelope() {
    let vendor = MockVendor::new()
        .post(GENERATION, Reply::json(qianwen::generation("你好", (4, 2))))
        .start()
        .await
        .unwrap();

    let dispatcher = dispatcher();
    dispatcher
        .register("dashscope", &provider(ProviderKind::Qianwen, &vendor, "/api/v1"))
        .unwrap();

    let result = dispatcher
        .generate(&RequestContext::new(), "dashscope", hello("qwen-turbo"))
        .await
        .unwrap();

    assert_eq!(result.text(), Some("你好"));
    assert_eq!(result.usage, Usage::new(4, 2, Some(6)));

    let request = vendor.last_request();
    assert_eq!(request.header("authorization"), Some("Bearer k"));

    let body = request.body.unwrap();
    assert_eq!(body["model"], "qwen-turbo");
    assert_eq!(body["input"]["messages"][0]["content"], "hi");
}

#[tokio::test]
async fn allocation_quota_is_quota_exceeded() {
    let vendor = MockVendor::new()
        .post(
            GENERATION,
            Reply::error(
                429,
                qianwen::error("Throttling.AllocationQuota", "Allocated quota exceeded"),
            ),
        )
        .start()
        .await
        .unwrap();

    let dispatcher = dispatcher();
    dispatcher
        .register("dashscope", &provider(ProviderKind::Qianwen, &vendor, "/api/v1"))
        .unwrap();

    let error = dispatcher
        .generate(&RequestContext::new(), "dashscope", hello("qwen-turbo"))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::QuotaExceeded);
    assert_eq!(error.provider(), Some(ProviderKind::Qianwen));
    assert_eq!(error.model(), Some("qwen-turbo"));
    assert_eq!(error.details().get("code").map(String::as_str), Some("Throttling.AllocationQuota"));
    assert!(!error.retryable());

    let aggregate = &dispatcher.metrics_snapshot().providers["dashscope"];
    assert_eq!(aggregate.errors.get(&ErrorKind::QuotaExceeded), Some(&1));
}

#[tokio::test]
async fn incremental_stream() {
    let vendor = MockVendor::new()
        .post(
            GENERATION,
            Reply::sse([
                qianwen::increment("he", None, (4, 1)),
                qianwen::increment("llo", Some("stop"), (4, 2)),
            ]),
        )
        .start()
        .await
        .unwrap();

    let dispatcher = dispatcher();
    dispatcher
        .register("dashscope", &provider(ProviderKind::Qianwen, &vendor, "/api/v1"))
        .unwrap();

    let events: Vec<_> = dispatcher
        .generate_stream(&RequestContext::new(), "dashscope", hello("qwen-turbo"))
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

    assert_eq!(finish_reason.as_deref(), Some("stop"));
    assert_eq!(*usage, Some(Usage::new(4, 2, Some(6))));

    let request = vendor.last_request();
    assert_eq!(request.header("x-dashscope-sse"), Some("enable"));
    assert_eq!(request.body.unwrap()["parameters"]["incremental_output"], true);
}
