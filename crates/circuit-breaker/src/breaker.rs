use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use config::{CircuitBreakerConfig, TripPolicy};
use tokio::time::Instant;

use crate::{BreakerError, BreakerState, Counts};

/// Decides from the closed-state counts whether the breaker opens.
pub type TripPredicate = Arc<dyn Fn(&Counts) -> bool + Send + Sync>;

/// Observes transitions as `(name, from, to)`.
///
/// The hook runs while the breaker is locked. It must not call back into the same breaker.
pub type StateChangeHook = Arc<dyn Fn(&str, BreakerState, BreakerState) + Send + Sync>;

/// How an admitted call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// Counts towards closing.
    Success,
    /// Counts towards opening.
    Failure,
    /// Neither. The call's slot is released without touching the consecutive counters.
    Ignored,
}

/// A circuit breaker guarding one admission key.
pub struct CircuitBreaker {
    name: String,
    max_requests: u32,
    interval: Duration,
    timeout: Duration,
    ready_to_trip: TripPredicate,
    on_state_change: Option<StateChangeHook>,
    inner: Mutex<Inner>,
}

struct Inner {
    state: BreakerState,
    generation: u64,
    counts: Counts,
    expiry: Option<Instant>,
}

impl CircuitBreaker {
    /// Create a closed breaker.
    pub fn new(name: impl Into<String>, config: &CircuitBreakerConfig) -> Self {
        let interval = config.interval;
        let now = Instant::now();

        Self {
            name: name.into(),
            max_requests: config.max_requests.max(1),
            interval,
            timeout: config.timeout,
            ready_to_trip: trip_predicate(&config.trip),
            on_state_change: None,
            inner: Mutex::new(Inner {
                state: BreakerState::Closed,
                generation: 0,
                counts: Counts::default(),
                expiry: (!interval.is_zero()).then(|| now + interval),
            }),
        }
    }

    /// Replace the configured trip policy.
    pub fn with_trip_predicate(mut self, predicate: TripPredicate) -> Self {
        self.ready_to_trip = predicate;
        self
    }

    /// Observe state transitions.
    pub fn with_state_change_hook(mut self, hook: StateChangeHook) -> Self {
        self.on_state_change = Some(hook);
        self
    }

    /// Key of the breaker.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current state, after applying any elapsed expiry.
    pub fn state(&self) -> BreakerState {
        let mut inner = self.lock();
        self.current_state(&mut inner, Instant::now());

        inner.state
    }

    /// Counts of the current generation.
    pub fn counts(&self) -> Counts {
        let mut inner = self.lock();
        self.current_state(&mut inner, Instant::now());

        inner.counts
    }

    /// Ask for admission. The returned permit must be resolved with the call's outcome.
    ///
    /// A permit dropped without an outcome counts as a failure while the thread is panicking and
    /// is ignored otherwise.
    pub fn acquire(self: &Arc<Self>) -> Result<Permit, BreakerError> {
        let generation = self.before_request()?;

        Ok(Permit {
            breaker: Arc::clone(self),
            generation,
            resolved: false,
        })
    }

    /// Run a call through the breaker, classifying its result.
    pub async fn execute<F, T, E>(
        self: &Arc<Self>,
        call: F,
        classify: impl FnOnce(&E) -> Outcome,
    ) -> Result<Result<T, E>, BreakerError>
    where
        F: Future<Output = Result<T, E>>,
    {
        let permit = self.acquire()?;
        let result = call.await;

        match &result {
            Ok(_) => permit.resolve(Outcome::Success),
            Err(error) => permit.resolve(classify(error)),
        }

        Ok(result)
    }

    fn before_request(&self) -> Result<u64, BreakerError> {
        let mut inner = self.lock();
        self.current_state(&mut inner, Instant::now());

        match inner.state {
            BreakerState::Open => {
                return Err(BreakerError::Open {
                    name: self.name.clone(),
                });
            }
            BreakerState::HalfOpen if inner.counts.requests >= self.max_requests => {
                return Err(BreakerError::TooManyRequests {
                    name: self.name.clone(),
                });
            }
            _ => (),
        }

        inner.counts.on_request();

        Ok(inner.generation)
    }

    fn after_request(&self, generation: u64, outcome: Outcome) {
        let now = Instant::now();
        let mut inner = self.lock();
        self.current_state(&mut inner, now);

        if inner.generation != generation {
            log::debug!(
                "Discarding {outcome:?} for circuit breaker '{}' from stale generation {generation}",
                self.name
            );
            return;
        }

        match outcome {
            Outcome::Success => self.on_success(&mut inner, now),
            Outcome::Failure => self.on_failure(&mut inner, now),
            Outcome::Ignored => inner.counts.on_ignored(),
        }
    }

    fn on_success(&self, inner: &mut Inner, now: Instant) {
        match inner.state {
            BreakerState::Closed => inner.counts.on_success(),
            BreakerState::HalfOpen => self.set_state(inner, BreakerState::Closed, now),
            BreakerState::Open => (),
        }
    }

    fn on_failure(&self, inner: &mut Inner, now: Instant) {
        match inner.state {
            BreakerState::Closed => {
                inner.counts.on_failure();

                if (self.ready_to_trip)(&inner.counts) {
                    self.set_state(inner, BreakerState::Open, now);
                }
            }
            BreakerState::HalfOpen => self.set_state(inner, BreakerState::Open, now),
            BreakerState::Open => (),
        }
    }

    fn current_state(&self, inner: &mut Inner, now: Instant) {
        match inner.state {
            BreakerState::Closed => {
                if inner.expiry.is_some_and(|expiry| expiry <= now) {
                    self.new_generation(inner, now);
                }
            }
            BreakerState::Open => {
                if inner.expiry.is_some_and(|expiry| expiry <= now) {
                    self.set_state(inner, BreakerState::HalfOpen, now);
                }
            }
            BreakerState::HalfOpen => (),
        }
    }

    fn set_state(&self, inner: &mut Inner, state: BreakerState, now: Instant) {
        if inner.state == state {
            return;
        }

        let previous = inner.state;
        inner.state = state;
        self.new_generation(inner, now);

        match state {
            BreakerState::Open => log::warn!("Circuit breaker '{}' opened (was {previous})", self.name),
            _ => log::info!("Circuit breaker '{}' moved from {previous} to {state}", self.name),
        }

        if let Some(hook) = &self.on_state_change {
            hook(&self.name, previous, state);
        }
    }

    fn new_generation(&self, inner: &mut Inner, now: Instant) {
        inner.generation += 1;
        inner.counts.clear();

        inner.expiry = match inner.state {
            BreakerState::Closed => (!self.interval.is_zero()).then(|| now + self.interval),
            BreakerState::Open => Some(now + self.timeout),
            BreakerState::HalfOpen => None,
        };
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn trip_predicate(policy: &TripPolicy) -> TripPredicate {
    match *policy {
        TripPolicy::FailureRatio { min_requests, ratio } => Arc::new(move |counts: &Counts| {
            counts.requests >= min_requests
                && counts.requests > 0
                && f64::from(counts.total_failures) / f64::from(counts.requests) >= ratio
        }),
        TripPolicy::ConsecutiveFailures { threshold } => {
            Arc::new(move |counts: &Counts| counts.consecutive_failures >= threshold)
        }
    }
}

/// Admission granted by a breaker, tied to the generation it was granted in.
pub struct Permit {
    breaker: Arc<CircuitBreaker>,
    generation: u64,
    resolved: bool,
}

impl Permit {
    /// Report how the admitted call ended.
    pub fn resolve(mut self, outcome: Outcome) {
        self.resolved = true;
        self.breaker.after_request(self.generation, outcome);
    }
}

impl Drop for Permit {
    fn drop(&mut self) {
        if self.resolved {
            return;
        }

        let outcome = if std::thread::panicking() {
            Outcome::Failure
        } else {
            Outcome::Ignored
        };

        self.breaker.after_request(self.generation, outcome);
    }
}
