//! The dispatch core: registration, admission, execution and accounting of calls.

mod admitted;
mod builder;
mod stream;

use std::{
    collections::BTreeMap,
    future::Future,
    sync::{Arc, PoisonError, RwLock},
};

use circuit_breaker::{BreakerRegistry, BreakerState, CircuitBreaker, TripPredicate};
use config::{Config, ProviderConfig, ProviderKind};
use futures::stream::{FuturesUnordered, StreamExt};
use rate_limit::RateLimitManager;
use telemetry::metrics::{HEALTH_CHECK_DURATION_SECONDS, Recorder};
use tokio::time::Instant;

use crate::{
    cancellation::CancellationRegistry,
    error::{ErrorKind, LlmError},
    factory,
    messages::{ChatRequest, ChatResult, ModelInfo, Pricing},
    metrics::{CallTimer, MetricsCollector, MetricsSnapshot},
    provider::{EventStream, Provider},
    request::RequestContext,
};

use admitted::Admitted;
pub use builder::DispatcherBuilder;
use stream::MeteredStream;

struct Registration {
    provider: Arc<dyn Provider>,
    breaker: Arc<CircuitBreaker>,
}

/// Routes calls to named provider instances through their rate limiter and breaker,
/// and records one [`CallMetric`](crate::metrics::CallMetric) per call.
///
/// ```rust,no_run
/// # async fn run() -> llm::Result<()> {
/// use config::{ProviderConfig, ProviderKind};
/// use llm::{ChatRequest, Dispatcher, Message, RequestContext};
///
/// let dispatcher = Dispatcher::builder().build();
/// dispatcher.register("primary", &ProviderConfig::new(ProviderKind::Openai, "sk-..."))?;
///
/// let request = ChatRequest::new("gpt-4o-mini", vec![Message::user("hi")]);
/// let result = dispatcher.generate(&RequestContext::new(), "primary", request).await?;
///
/// println!("{}", result.text().unwrap_or_default());
/// # Ok(())
/// # }
/// ```
pub struct Dispatcher {
    registrations: RwLock<BTreeMap<String, Registration>>,
    rate_limits: Arc<RateLimitManager>,
    breakers: BreakerRegistry,
    cancellations: Arc<CancellationRegistry>,
    metrics: Arc<MetricsCollector>,
}

impl Default for Dispatcher {
    fn default() -> Self {
        Self::builder().build()
    }
}

impl Dispatcher {
    pub fn builder() -> DispatcherBuilder {
        DispatcherBuilder::default()
    }

    /// A dispatcher exporting to OpenTelemetry and logging alerts, with every configured
    /// provider registered.
    pub fn from_config(config: &Config) -> crate::Result<Self> {
        let dispatcher = Self::builder()
            .admission(config.admission.clone())
            .metrics(config.metrics.clone())
            .with_otel_sink()
            .with_logging_alerts()
            .build();

        for (name, provider) in &config.providers {
            dispatcher.register(name, provider)?;
        }

        Ok(dispatcher)
    }

    /// Validate the configuration, build its adapter and register it under `name`.
    ///
    /// A name already in use is refused; replacing an instance requires [`Dispatcher::remove`].
    pub fn register(&self, name: &str, config: &ProviderConfig) -> crate::Result<()> {
        let provider = factory::create_provider(name, config)?;
        self.insert(name, provider, config, None)
    }

    /// Like [`Dispatcher::register`], with a vendor-specific predicate deciding when the
    /// breaker of the instance trips.
    pub fn register_with_trip_predicate(
        &self,
        name: &str,
        config: &ProviderConfig,
        trip: TripPredicate,
    ) -> crate::Result<()> {
        let provider = factory::create_provider(name, config)?;
        self.insert(name, provider, config, Some(trip))
    }

    /// Register an already built adapter. Admission and pricing settings are taken from
    /// `config`.
    pub fn register_provider(
        &self,
        name: &str,
        provider: Arc<dyn Provider>,
        config: &ProviderConfig,
    ) -> crate::Result<()> {
        config
            .validate()
            .map_err(|e| LlmError::from(e).with_provider(config.kind))?;

        self.insert(name, provider, config, None)
    }

    fn insert(
        &self,
        name: &str,
        provider: Arc<dyn Provider>,
        config: &ProviderConfig,
        trip: Option<TripPredicate>,
    ) -> crate::Result<()> {
        let mut registrations = self.registrations.write().unwrap_or_else(PoisonError::into_inner);

        if registrations.contains_key(name) {
            return Err(LlmError::new(
                ErrorKind::InvalidConfig,
                format!("provider '{name}' is already registered"),
            ));
        }

        self.rate_limits
            .configure(name, config.rate_limit.clone())
            .map_err(|e| LlmError::from(e).with_provider(config.kind))?;

        let breaker = self.breakers.insert(name, &config.circuit_breaker, trip);

        let kind = provider.kind();
        let pricing = self.metrics.pricing();

        pricing.extend(kind, provider.pricing());
        pricing.extend(
            kind,
            config
                .pricing
                .iter()
                .map(|(model, price)| (model.clone(), Pricing::from(price))),
        );

        registrations.insert(name.to_string(), Registration { provider, breaker });

        log::info!("Registered {kind} provider '{name}'");

        Ok(())
    }

    /// Forget a provider instance and its admission state. Unknown names are ignored.
    pub fn remove(&self, name: &str) {
        let removed = self
            .registrations
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(name);

        self.rate_limits.remove(name);
        self.breakers.remove(name);

        if removed.is_some() {
            log::info!("Removed provider '{name}'");
        }
    }

    /// Names of the registered instances, sorted.
    pub fn list(&self) -> Vec<String> {
        self.registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect()
    }

    /// The adapter registered under `name`.
    pub fn get(&self, name: &str) -> crate::Result<Arc<dyn Provider>> {
        self.resolve(name).map(|(provider, _)| provider)
    }

    fn resolve(&self, name: &str) -> crate::Result<(Arc<dyn Provider>, Arc<CircuitBreaker>)> {
        self.registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(name)
            .map(|registration| (registration.provider.clone(), registration.breaker.clone()))
            .ok_or_else(|| LlmError::provider_not_found(name))
    }

    /// Run a synchronous completion on the named instance.
    pub async fn generate(
        &self,
        context: &RequestContext,
        name: &str,
        request: ChatRequest,
    ) -> crate::Result<ChatResult> {
        let (provider, breaker) = self.resolve(name)?;
        let kind = provider.kind();
        let model = request.model.clone();

        let timer = CallTimer::start(context, name, kind, &model, false);
        let (mut admitted, call_context) = self.admit(context, timer, &breaker, &request).await?;

        let result = until_cancelled(&call_context, provider.generate(request, &call_context)).await;

        match result {
            Ok(result) => {
                admitted.succeed(result.usage);
                Ok(result)
            }
            Err(error) => {
                let error = error.with_provider(kind).with_model(&model);
                admitted.fail(error.kind(), error.message(), Default::default());

                Err(error)
            }
        }
    }

    /// Open a streamed completion on the named instance.
    ///
    /// The returned stream forwards the adapter's events in order and ends with exactly
    /// one terminal event. Dropping it early cancels the call.
    pub async fn generate_stream(
        &self,
        context: &RequestContext,
        name: &str,
        mut request: ChatRequest,
    ) -> crate::Result<EventStream> {
        let (provider, breaker) = self.resolve(name)?;
        let kind = provider.kind();
        let model = request.model.clone();

        request.stream = true;

        let timer = CallTimer::start(context, name, kind, &model, true);
        let (mut admitted, call_context) = self.admit(context, timer, &breaker, &request).await?;

        let stream = until_cancelled(&call_context, provider.generate_stream(request, &call_context)).await;

        match stream {
            Ok(stream) => Ok(Box::pin(MeteredStream::new(stream, admitted, &call_context))),
            Err(error) => {
                let error = error.with_provider(kind).with_model(&model);
                admitted.fail(error.kind(), error.message(), Default::default());

                Err(error)
            }
        }
    }

    /// Validate the request, pass it through the rate limiter and the breaker, and make
    /// it abortable. Rejections are recorded before they are returned.
    async fn admit(
        &self,
        context: &RequestContext,
        mut timer: CallTimer,
        breaker: &Arc<CircuitBreaker>,
        request: &ChatRequest,
    ) -> crate::Result<(Admitted, RequestContext)> {
        let kind = timer.kind();
        let reject = |timer: &CallTimer, error: LlmError| {
            let error = error.with_provider(kind).with_model(&request.model);
            self.metrics
                .record(timer.failure(error.kind(), error.message(), Default::default()));

            error
        };

        if let Err(error) = request.validate() {
            return Err(reject(&timer, error));
        }

        let name = timer.provider().to_string();

        if let Err(error) = self.check_rate_limit(context, &name).await {
            return Err(reject(&timer, error));
        }

        let permit = match breaker.acquire() {
            Ok(permit) => permit,
            Err(error) => {
                log::debug!("Breaker of '{name}' refused a call: {error}");
                return Err(reject(&timer, error.into()));
            }
        };

        let token = context.cancellation.child_token();

        let guard = match &context.correlation_key {
            Some(key) => match self.cancellations.install(key, token.clone()) {
                Ok(guard) => Some(guard),
                Err(error) => return Err(reject(&timer, error)),
            },
            None => None,
        };

        timer.admitted();

        let call_context = RequestContext {
            correlation_key: context.correlation_key.clone(),
            cancellation: token,
            deadline: context.deadline,
        };

        let admitted = Admitted::new(timer, permit, guard, self.metrics.clone(), self.rate_limits.clone());

        Ok((admitted, call_context))
    }

    async fn check_rate_limit(&self, context: &RequestContext, name: &str) -> crate::Result<()> {
        let result = if self.rate_limits.waits(name) {
            tokio::select! {
                biased;
                _ = context.cancellation.cancelled() => return Err(LlmError::cancelled()),
                _ = deadline(context.deadline) => {
                    Err(LlmError::new(
                        ErrorKind::AdmissionDenied,
                        format!("no rate limit capacity for '{name}' before the deadline"),
                    ))
                }
                result = self.rate_limits.acquire(name) => result.map_err(LlmError::from),
            }
        } else {
            self.rate_limits.check(name).await.map_err(LlmError::from)
        };

        if let Err(ref error) = result
            && error.kind() == ErrorKind::AdmissionDenied
        {
            log::debug!("Rate limit of '{name}' refused a call: {error}");
            self.metrics.rate_limited(name);
        }

        result
    }

    /// Cancel the in-flight generation registered under the correlation key.
    pub fn abort(&self, correlation_key: &str) -> crate::Result<()> {
        self.cancellations.abort(correlation_key)
    }

    /// Probe every registered instance concurrently. Probes bypass admission.
    pub async fn health_check_all(&self, context: &RequestContext) -> BTreeMap<String, crate::Result<()>> {
        let providers: Vec<_> = self
            .registrations
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, registration)| (name.clone(), registration.provider.clone()))
            .collect();

        let mut probes: FuturesUnordered<_> = providers
            .into_iter()
            .map(|(name, provider)| async move {
                let recorder = Recorder::start(HEALTH_CHECK_DURATION_SECONDS, name.clone());

                let result = until_cancelled(context, provider.health_check(context))
                    .await
                    .map_err(|e| e.with_provider(provider.kind()));

                if let Err(error) = &result {
                    log::warn!("Health check of '{name}' failed: {error}");
                }

                recorder.record_result(&result);

                (name, result)
            })
            .collect();

        let mut results = BTreeMap::new();

        while let Some((name, result)) = probes.next().await {
            results.insert(name, result);
        }

        results
    }

    /// Models served by the named instance, priced from the current pricing table.
    pub async fn list_models(&self, context: &RequestContext, name: &str) -> crate::Result<Vec<ModelInfo>> {
        let provider = self.get(name)?;
        let kind = provider.kind();

        let mut models = until_cancelled(context, provider.list_models(context))
            .await
            .map_err(|e| e.with_provider(kind))?;

        for model in &mut models {
            if let Some(pricing) = self.metrics.pricing().get(kind, &model.id) {
                model.pricing = Some(pricing);
            }
        }

        Ok(models)
    }

    /// Aggregates of the most recent calls.
    pub fn metrics_snapshot(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    /// The breaker state of every registered instance.
    pub fn breaker_states(&self) -> BTreeMap<String, BreakerState> {
        self.breakers.states()
    }

    /// Replace the price of one model.
    pub fn update_pricing(&self, kind: ProviderKind, model: &str, pricing: Pricing) {
        self.metrics.pricing().update(kind, model, pricing);
    }

    /// The price of one model, if known.
    pub fn pricing(&self, kind: ProviderKind, model: &str) -> Option<Pricing> {
        self.metrics.pricing().get(kind, model)
    }

    /// Correlation keys of the generations in flight.
    pub fn in_flight(&self) -> Vec<String> {
        self.cancellations
            .in_flight()
            .into_iter()
            .map(|(key, _)| key)
            .collect()
    }
}

/// Run the call until it completes, the context is cancelled or its deadline passes.
async fn until_cancelled<T>(
    context: &RequestContext,
    call: impl Future<Output = crate::Result<T>>,
) -> crate::Result<T> {
    tokio::select! {
        biased;
        _ = context.cancellation.cancelled() => Err(LlmError::cancelled()),
        _ = deadline(context.deadline) => Err(LlmError::deadline_exceeded()),
        result = call => result,
    }
}

/// Completes at the deadline, never without one.
async fn deadline(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}
