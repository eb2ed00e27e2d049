use config::ProviderKind;
use integration_tests::{MockVendor, Reply, dispatcher, hello, payloads::openai, provider};
use llm::{ErrorKind, RequestContext};

#[tokio::test]
async fn baichuan_speaks_chat_completions() {
    let vendor = MockVendor::new()
        .post("/v1/chat/completions", Reply::json(openai::completion("Baichuan4", "你好", (10, 10, 20))))
        .start()
        .await
        .unwrap();

    let dispatcher = dispatcher();
    dispatcher
        .register("baichuan", &provider(ProviderKind::Baichuan, &vendor, "/v1"))
        .unwrap();

    let result = dispatcher
        .generate(&RequestContext::new(), "baichuan", hello("Baichuan4"))
        .await
        .unwrap();

    assert_eq!(result.text(), Some("你好"));
    assert_eq!(vendor.last_request().header("authorization"), Some("Bearer k"));

    // Baichuan4 is priced at 0.1 CNY per 1,000 tokens in both directions.
    let aggregate = &dispatcher.metrics_snapshot().providers["baichuan"];
    assert!((aggregate.cost["CNY"] - 0.002).abs() < 1e-12);
}

#[tokio::test]
async fn chatglm_business_codes_are_mapped() {
    let vendor = MockVendor::new()
        .post(
            "/api/paas/v4/chat/completions",
            Reply::error(
                429,
                serde_json::json!({"error": {"code": "1113", "message": "您的账户已欠费"}}),
            ),
        )
        .start()
        .await
        .unwrap();

    let dispatcher = dispatcher();
    dispatcher
        .register("glm", &provider(ProviderKind::Chatglm, &vendor, "/api/paas/v4"))
        .unwrap();

    let error = dispatcher
        .generate(&RequestContext::new(), "glm", hello("glm-4-flash"))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::QuotaExceeded);
    assert_eq!(error.provider(), Some(ProviderKind::Chatglm));
}

#[tokio::test]
async fn health_probe_is_a_one_token_generation() {
    let vendor = MockVendor::new()
        .post("/v1/chat/completions", Reply::json(openai::completion("glm-4-flash", "h", (1, 1, 2))))
        .start()
        .await
        .unwrap();

    let dispatcher = dispatcher();
    dispatcher
        .register("glm", &provider(ProviderKind::Chatglm, &vendor, "/v1"))
        .unwrap();

    let health = dispatcher.health_check_all(&RequestContext::new()).await;
    assert!(health["glm"].is_ok());

    let body = vendor.last_request().body.unwrap();
    assert_eq!(body["max_tokens"], 1);

    // Probes bypass admission and metrics.
    assert_eq!(dispatcher.metrics_snapshot().total.calls, 0);
}
