use std::sync::Arc;

use circuit_breaker::{Outcome, Permit};
use rate_limit::RateLimitManager;

use crate::{
    cancellation::CancellationGuard,
    error::ErrorKind,
    messages::Usage,
    metrics::{CallTimer, MetricsCollector},
};

struct Parts {
    timer: CallTimer,
    permit: Permit,
    guard: Option<CancellationGuard>,
    metrics: Arc<MetricsCollector>,
    rate_limits: Arc<RateLimitManager>,
}

/// A call that passed admission and is now running in its adapter.
///
/// Finishing it resolves the breaker permit, feeds the rate limiter, records the call
/// metric and removes the cancellation entry, in that order and exactly once. Dropped
/// unfinished, it finishes as cancelled, or as failed when the thread is panicking.
pub(super) struct Admitted {
    parts: Option<Parts>,
}

impl Admitted {
    pub fn new(
        timer: CallTimer,
        permit: Permit,
        guard: Option<CancellationGuard>,
        metrics: Arc<MetricsCollector>,
        rate_limits: Arc<RateLimitManager>,
    ) -> Self {
        metrics.call_started(timer.provider(), timer.model());

        Self {
            parts: Some(Parts {
                timer,
                permit,
                guard,
                metrics,
                rate_limits,
            }),
        }
    }

    pub fn is_finished(&self) -> bool {
        self.parts.is_none()
    }

    pub fn first_token(&mut self) {
        if let Some(parts) = &mut self.parts {
            parts.timer.first_token();
        }
    }

    pub fn succeed(&mut self, usage: Usage) {
        self.finish(usage, None);
    }

    pub fn fail(&mut self, kind: ErrorKind, message: &str, usage: Usage) {
        self.finish(usage, Some((kind, message)));
    }

    fn finish(&mut self, usage: Usage, error: Option<(ErrorKind, &str)>) {
        let Some(parts) = self.parts.take() else {
            return;
        };

        let Parts {
            timer,
            permit,
            guard,
            metrics,
            rate_limits,
        } = parts;

        let outcome = match error {
            None => Outcome::Success,
            Some((ErrorKind::Cancelled, _)) => Outcome::Ignored,
            Some(_) => Outcome::Failure,
        };

        permit.resolve(outcome);

        if outcome != Outcome::Ignored {
            rate_limits.record(timer.provider(), outcome == Outcome::Success);
        }

        metrics.call_ended(timer.provider(), timer.model());

        let metric = match error {
            None => timer.success(usage),
            Some((kind, message)) => timer.failure(kind, message, usage),
        };

        metrics.record(metric);

        drop(guard);
    }
}

impl Drop for Admitted {
    fn drop(&mut self) {
        if self.is_finished() {
            return;
        }

        if std::thread::panicking() {
            self.fail(ErrorKind::ApiCallFailed, "the adapter call panicked", Usage::default());
        } else {
            self.fail(ErrorKind::Cancelled, "the caller dropped the call", Usage::default());
        }
    }
}
