//! Token bucket whose refill rate follows the upstream error rate.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use config::AdaptiveConfig;
use tokio::time::Instant;

use crate::{RateLimitError, RateLimitResult, TokenBucket};

/// Outcomes landing within this span share one slot.
const SLOT: Duration = Duration::from_secs(1);

/// A token bucket that slows down while the upstream fails and speeds up while it recovers.
///
/// The rate is multiplied by `1 - adjustment_factor` when the error rate over the rolling window
/// exceeds the threshold, and by `1 + adjustment_factor` when it falls below half the threshold.
/// Between the two bounds the rate is left alone. At most one adjustment happens per interval and
/// the result is clamped to `[min_rate, max_rate]`.
pub struct AdaptiveLimiter {
    config: AdaptiveConfig,
    state: Mutex<AdaptiveState>,
}

struct AdaptiveState {
    rate: f64,
    bucket: TokenBucket,
    outcomes: VecDeque<OutcomeSlot>,
    last_adjusted: Instant,
}

struct OutcomeSlot {
    started_at: Instant,
    successes: u64,
    errors: u64,
}

impl AdaptiveLimiter {
    /// Create a limiter starting at `initial_rate`.
    pub fn new(config: AdaptiveConfig) -> Result<Self, RateLimitError> {
        if !(config.min_rate > 0.0 && config.min_rate <= config.max_rate) {
            return Err(RateLimitError::InvalidPolicy(format!(
                "Invalid adaptive bounds: {} to {}",
                config.min_rate, config.max_rate
            )));
        }

        let rate = config.initial_rate.clamp(config.min_rate, config.max_rate);
        let bucket = TokenBucket::new(rate, config.burst)?;

        Ok(Self {
            state: Mutex::new(AdaptiveState {
                rate,
                bucket,
                outcomes: VecDeque::new(),
                last_adjusted: Instant::now(),
            }),
            config,
        })
    }

    /// Take one token if available.
    pub fn check(&self) -> RateLimitResult {
        let mut state = self.lock();
        self.adjust(&mut state, Instant::now());

        state.bucket.check()
    }

    /// Record the outcome of an admitted call.
    pub fn record(&self, success: bool) {
        let now = Instant::now();
        let mut state = self.lock();

        match state.outcomes.back_mut() {
            Some(slot) if now.saturating_duration_since(slot.started_at) < SLOT => {
                if success {
                    slot.successes += 1;
                } else {
                    slot.errors += 1;
                }
            }
            _ => state.outcomes.push_back(OutcomeSlot {
                started_at: now,
                successes: u64::from(success),
                errors: u64::from(!success),
            }),
        }

        self.adjust(&mut state, now);
    }

    /// The refill rate currently in effect.
    pub fn current_rate(&self) -> f64 {
        self.lock().rate
    }

    /// Error share over the rolling window, if any call was observed.
    pub fn error_rate(&self) -> Option<f64> {
        let mut state = self.lock();
        state.prune(Instant::now(), self.config.error_window);

        state.error_rate()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, AdaptiveState> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn adjust(&self, state: &mut AdaptiveState, now: Instant) {
        if now.saturating_duration_since(state.last_adjusted) < self.config.adjustment_interval {
            return;
        }

        state.prune(now, self.config.error_window);

        let Some(error_rate) = state.error_rate() else {
            return;
        };

        state.last_adjusted = now;

        let threshold = self.config.error_threshold;
        let factor = self.config.adjustment_factor;

        let target = if error_rate > threshold {
            (state.rate * (1.0 - factor)).max(self.config.min_rate)
        } else if error_rate < threshold / 2.0 {
            (state.rate * (1.0 + factor)).min(self.config.max_rate)
        } else {
            state.rate
        };

        if target == state.rate {
            return;
        }

        match state.bucket.retuned(target) {
            Ok(bucket) => {
                log::info!(
                    "Adaptive rate limit adjusted from {:.3}/s to {target:.3}/s at error rate {error_rate:.3}",
                    state.rate
                );

                state.rate = target;
                state.bucket = bucket;
            }
            Err(error) => log::warn!("Keeping adaptive rate at {:.3}/s: {error}", state.rate),
        }
    }
}

impl AdaptiveState {
    fn prune(&mut self, now: Instant, window: Duration) {
        while let Some(slot) = self.outcomes.front() {
            if now.saturating_duration_since(slot.started_at) < window {
                break;
            }

            self.outcomes.pop_front();
        }
    }

    fn error_rate(&self) -> Option<f64> {
        let (successes, errors) = self
            .outcomes
            .iter()
            .fold((0u64, 0u64), |(s, e), slot| (s + slot.successes, e + slot.errors));

        let total = successes + errors;

        if total == 0 {
            return None;
        }

        Some(errors as f64 / total as f64)
    }
}
