use config::{AzureSettings, ProviderKind};
use integration_tests::{MockVendor, Reply, dispatcher, hello, payloads::openai, provider};
use llm::RequestContext;

#[tokio::test]
async fn deployment_path_version_and_key_header() {
    let vendor = MockVendor::new()
        .post(
            "/openai/deployments/chat-prod/chat/completions",
            Reply::json(openai::completion("gpt-4o", "hello", (2, 1, 3))),
        )
        .start()
        .await
        .unwrap();

    let mut config = provider(ProviderKind::AzureOpenai, &vendor, "");
    config.azure = Some(AzureSettings {
        resource: None,
        deployment: "chat-prod".to_string(),
        api_version: None,
        use_bearer_auth: false,
    });

    let dispatcher = dispatcher();
    dispatcher.register("azure", &config).unwrap();

    let result = dispatcher
        .generate(&RequestContext::new(), "azure", hello("gpt-4o"))
        .await
        .unwrap();

    assert_eq!(result.text(), Some("hello"));

    let request = vendor.last_request();
    assert_eq!(request.query.as_deref(), Some("api-version=2024-02-15-preview"));
    assert_eq!(request.header("api-key"), Some("k"));
    assert_eq!(request.header("authorization"), None);

    // Models come from the catalog, not from the deployment.
    let models = dispatcher.list_models(&RequestContext::new(), "azure").await.unwrap();
    assert!(models.iter().any(|model| model.id == "gpt-4o"));
    assert_eq!(vendor.requests().len(), 1);
}

#[tokio::test]
async fn missing_deployment_is_rejected_at_registration() {
    let vendor = MockVendor::new().start().await.unwrap();

    let dispatcher = dispatcher();
    let error = dispatcher
        .register("azure", &provider(ProviderKind::AzureOpenai, &vendor, ""))
        .unwrap_err();

    assert_eq!(error.kind(), llm::ErrorKind::InvalidConfig);
    assert!(dispatcher.list().is_empty());
}
