use std::{
    io::{self, Write},
    sync::Arc,
    time::Duration,
};

use anyhow::bail;
use args::{Args, Command};
use clap::Parser;
use futures::StreamExt;
use llm::{ChatRequest, Dispatcher, Message, RequestContext, StreamEvent};

mod args;
mod logger;

const PROBE_TIMEOUT: Duration = Duration::from_secs(30);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    logger::init(&args)?;

    let config = args.config()?;
    let _telemetry = telemetry::init(&config.telemetry)?;

    let dispatcher = Arc::new(Dispatcher::from_config(&config)?);

    match args.command {
        Command::Check => check(&dispatcher).await,
        Command::Models { provider } => models(&dispatcher, &provider).await,
        Command::Chat {
            provider,
            model,
            prompt,
            stream,
            system,
            timeout,
        } => {
            let mut messages = Vec::new();

            if let Some(system) = system {
                messages.push(Message::system(system));
            }

            messages.push(Message::user(prompt));

            let request = ChatRequest::new(model, messages);
            let result = chat(dispatcher.clone(), &provider, request, stream, timeout).await;

            let summary = dispatcher.metrics_snapshot();
            log::info!("Call summary: {}", serde_json::to_string(&summary.total)?);

            result
        }
    }
}

async fn check(dispatcher: &Dispatcher) -> anyhow::Result<()> {
    let context = RequestContext::new().with_timeout(PROBE_TIMEOUT);
    let results = dispatcher.health_check_all(&context).await;

    let mut failed = 0;

    for (name, result) in &results {
        match result {
            Ok(()) => println!("{name}: ok"),
            Err(e) => {
                failed += 1;
                println!("{name}: {e}");
            }
        }
    }

    if failed > 0 {
        bail!("{failed} of {} providers failed their health check", results.len());
    }

    Ok(())
}

async fn models(dispatcher: &Dispatcher, provider: &str) -> anyhow::Result<()> {
    let context = RequestContext::new().with_timeout(PROBE_TIMEOUT);

    for model in dispatcher.list_models(&context, provider).await? {
        let price = model
            .pricing
            .map(|p| format!("{} / {} {} per 1k tokens", p.input, p.output, p.currency))
            .unwrap_or_else(|| "unpriced".to_string());

        println!("{}\t{}\t{price}", model.id, model.display_name);
    }

    Ok(())
}

/// Run one generation. Ctrl-C aborts it through its correlation key.
async fn chat(
    dispatcher: Arc<Dispatcher>,
    provider: &str,
    request: ChatRequest,
    stream: bool,
    timeout: Option<Duration>,
) -> anyhow::Result<()> {
    let key = uuid::Uuid::new_v4().to_string();

    let mut context = RequestContext::new().with_correlation_key(key.clone());

    if let Some(timeout) = timeout {
        context = context.with_timeout(timeout);
    }

    let interrupt = tokio::spawn({
        let dispatcher = dispatcher.clone();

        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                log::info!("Interrupted, aborting generation {key}");

                if let Err(e) = dispatcher.abort(&key) {
                    log::debug!("Nothing to abort: {e}");
                }
            }
        }
    });

    let result = if stream {
        stream_answer(&dispatcher, &context, provider, request).await
    } else {
        answer(&dispatcher, &context, provider, request).await
    };

    interrupt.abort();

    result
}

async fn answer(
    dispatcher: &Dispatcher,
    context: &RequestContext,
    provider: &str,
    request: ChatRequest,
) -> anyhow::Result<()> {
    let result = dispatcher.generate(context, provider, request).await?;

    println!("{}", result.text().unwrap_or_default());

    log::info!(
        "Used {} prompt and {} completion tokens",
        result.usage.prompt_tokens,
        result.usage.completion_tokens
    );

    Ok(())
}

async fn stream_answer(
    dispatcher: &Dispatcher,
    context: &RequestContext,
    provider: &str,
    request: ChatRequest,
) -> anyhow::Result<()> {
    let mut events = dispatcher.generate_stream(context, provider, request).await?;
    let mut stdout = io::stdout();

    while let Some(event) = events.next().await {
        match event {
            StreamEvent::Delta { content, .. } => {
                write!(stdout, "{content}")?;
                stdout.flush()?;
            }
            StreamEvent::Done { finish_reason, usage } => {
                writeln!(stdout)?;

                log::info!(
                    "Finished ({}), usage: {usage:?}",
                    finish_reason.as_deref().unwrap_or("no reason given")
                );
            }
            StreamEvent::Error { kind, message } => {
                writeln!(stdout)?;
                bail!("generation failed ({kind}): {message}");
            }
        }
    }

    Ok(())
}
