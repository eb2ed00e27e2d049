use std::{sync::Arc, time::Duration};

use config::ProviderKind;
use futures::StreamExt;
use integration_tests::{MockVendor, Reply, dispatcher, hello, payloads::openai, provider};
use llm::{Dispatcher, ErrorKind, RequestContext, StreamEvent};
use tokio_util::sync::CancellationToken;

const CHAT: &str = "/v1/chat/completions";

async fn registered(reply: Reply) -> (Arc<Dispatcher>, integration_tests::TestVendor) {
    let vendor = MockVendor::new().post(CHAT, reply).start().await.unwrap();

    let dispatcher = dispatcher();
    dispatcher
        .register("p1", &provider(ProviderKind::Openai, &vendor, "/v1"))
        .unwrap();

    (Arc::new(dispatcher), vendor)
}

async fn wait_in_flight(dispatcher: &Dispatcher, key: &str) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !dispatcher.in_flight().iter().any(|k| k == key) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
async fn abort_during_stream() {
    let (dispatcher, vendor) = registered(Reply::sse([openai::delta("he")]).then_hang()).await;

    let context = RequestContext::new().with_correlation_key("chat-1");
    let mut stream = dispatcher.generate_stream(&context, "p1", hello("gpt-4o-mini")).await.unwrap();

    let first = stream.next().await.unwrap();
    assert_eq!(first.usage(), None);
    assert!(matches!(first, StreamEvent::Delta { ref content, .. } if content == "he"));

    assert_eq!(dispatcher.in_flight(), vec!["chat-1".to_string()]);
    dispatcher.abort("chat-1").unwrap();

    let Some(StreamEvent::Error { kind, .. }) = stream.next().await else {
        unreachable!("an aborted stream ends with an error event");
    };

    assert_eq!(kind, ErrorKind::Cancelled);
    assert!(stream.next().await.is_none());

    let error = dispatcher.abort("chat-1").unwrap_err();
    assert_eq!(error.kind(), ErrorKind::NotFound);
    assert!(dispatcher.in_flight().is_empty());

    let aggregate = &dispatcher.metrics_snapshot().providers["p1"];
    assert_eq!(aggregate.errors.get(&ErrorKind::Cancelled), Some(&1));
    assert_eq!(vendor.hits(CHAT), 1);

    // Cancellations say nothing about the upstream's health.
    assert_eq!(dispatcher.breaker_states()["p1"], llm::BreakerState::Closed);
}

#[tokio::test]
async fn abort_during_generate() {
    let (dispatcher, _vendor) = registered(Reply::Hang).await;

    let call = tokio::spawn({
        let dispatcher = dispatcher.clone();

        async move {
            let context = RequestContext::new().with_correlation_key("chat-2");
            dispatcher.generate(&context, "p1", hello("gpt-4o-mini")).await
        }
    });

    wait_in_flight(&dispatcher, "chat-2").await;
    dispatcher.abort("chat-2").unwrap();

    let error = call.await.unwrap().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Cancelled);
    assert!(dispatcher.in_flight().is_empty());
}

#[tokio::test]
async fn caller_token_cancels() {
    let (dispatcher, _vendor) = registered(Reply::Hang).await;
    let token = CancellationToken::new();

    let call = tokio::spawn({
        let dispatcher = dispatcher.clone();
        let token = token.clone();

        async move {
            let context = RequestContext::new().with_cancellation(token);
            dispatcher.generate(&context, "p1", hello("gpt-4o-mini")).await
        }
    });

    tokio::time::sleep(Duration::from_millis(50)).await;
    token.cancel();

    let error = call.await.unwrap().unwrap_err();
    assert_eq!(error.kind(), ErrorKind::Cancelled);
}

#[tokio::test]
async fn deadline_bounds_the_call() {
    let (dispatcher, _vendor) = registered(Reply::Hang).await;

    let context = RequestContext::new().with_timeout(Duration::from_millis(100));

    let error = dispatcher
        .generate(&context, "p1", hello("gpt-4o-mini"))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::Timeout);
}

#[tokio::test]
async fn deadline_bounds_a_stream() {
    let (dispatcher, _vendor) = registered(Reply::sse([openai::delta("he")]).then_hang()).await;

    let context = RequestContext::new().with_timeout(Duration::from_millis(200));
    let events: Vec<_> = dispatcher
        .generate_stream(&context, "p1", hello("gpt-4o-mini"))
        .await
        .unwrap()
        .collect()
        .await;

    assert_eq!(events.len(), 2);
    assert!(matches!(events[1], StreamEvent::Error { kind: ErrorKind::Timeout, .. }));
}

#[tokio::test]
async fn correlation_keys_are_unique_while_in_flight() {
    let (dispatcher, _vendor) = registered(Reply::Hang).await;

    let call = tokio::spawn({
        let dispatcher = dispatcher.clone();

        async move {
            let context = RequestContext::new().with_correlation_key("chat-3");
            dispatcher.generate(&context, "p1", hello("gpt-4o-mini")).await
        }
    });

    wait_in_flight(&dispatcher, "chat-3").await;

    let context = RequestContext::new().with_correlation_key("chat-3");
    let error = dispatcher
        .generate(&context, "p1", hello("gpt-4o-mini"))
        .await
        .unwrap_err();

    assert_eq!(error.kind(), ErrorKind::InvalidRequest);

    dispatcher.abort("chat-3").unwrap();
    assert_eq!(call.await.unwrap().unwrap_err().kind(), ErrorKind::Cancelled);
}

#[tokio::test]
async fn dropping_a_stream_releases_its_key() {
    let (dispatcher, _vendor) = registered(Reply::sse([openai::delta("he")]).then_hang()).await;

    let context = RequestContext::new().with_correlation_key("chat-4");
    let mut stream = dispatcher.generate_stream(&context, "p1", hello("gpt-4o-mini")).await.unwrap();

    stream.next().await.unwrap();
    drop(stream);

    assert!(dispatcher.in_flight().is_empty());

    let aggregate = &dispatcher.metrics_snapshot().providers["p1"];
    assert_eq!(aggregate.errors.get(&ErrorKind::Cancelled), Some(&1));
}
