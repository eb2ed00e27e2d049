use config::Config;
use indoc::formatdoc;
use integration_tests::{MockVendor, Reply, init_logger, payloads::openai};
use llm::{Dispatcher, ErrorKind, RequestContext};

#[tokio::test]
async fn dispatcher_from_toml() {
    init_logger();

    let vendor = MockVendor::new()
        .post("/v1/chat/completions", Reply::json(openai::completion("house-model", "hello", (1000, 1000, 2000))))
        .start()
        .await
        .unwrap();

    let config = Config::from_toml(&formatdoc! {r#"
        [metrics]
        history_size = 10

        [providers.primary]
        type = "openai"
        api_key = "k"
        base_url = "{base_url}"
        timeout = "5s"

        [providers.primary.rate_limit]
        type = "token_bucket"
        rate = 100.0
        burst = 10

        [providers.primary.circuit_breaker]
        timeout = "30s"

        [providers.primary.pricing.house-model]
        input = 0.5
        output = 1.5
        currency = "EUR"

        [providers.backup]
        type = "chatglm"
        api_key = "k"
        base_url = "{base_url}"
    "#, base_url = vendor.url("/v1")})
    .unwrap();

    let dispatcher = Dispatcher::from_config(&config).unwrap();
    assert_eq!(dispatcher.list(), vec!["backup".to_string(), "primary".to_string()]);

    dispatcher
        .generate(&RequestContext::new(), "primary", integration_tests::hello("house-model"))
        .await
        .unwrap();

    let snapshot = dispatcher.metrics_snapshot();
    let aggregate = &snapshot.providers["primary"];

    assert!((aggregate.cost["EUR"] - 2.0).abs() < 1e-12);
    assert_eq!(snapshot.models["house-model"].calls, 1);
}

#[test]
fn invalid_policy_is_refused() {
    let error = Config::from_toml(indoc::indoc! {r#"
        [providers.primary]
        type = "openai"
        api_key = "k"

        [providers.primary.rate_limit]
        type = "token_bucket"
        rate = 0.0
        burst = 10
    "#})
    .unwrap_err();

    insta::assert_snapshot!(format!("{error:#}"), @"provider 'primary' is misconfigured: invalid configuration: token bucket rate must be greater than zero");
}

#[test]
fn registration_validates_too() {
    init_logger();

    let config = config::ProviderConfig::new(config::ProviderKind::Openai, "  ");

    let error = integration_tests::dispatcher().register("primary", &config).unwrap_err();
    assert_eq!(error.kind(), ErrorKind::MissingCredential);
}
