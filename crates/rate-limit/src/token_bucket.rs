//! Token bucket limiter using the governor crate.

use std::num::NonZeroU32;
use std::time::Duration;

use governor::clock::Clock;
use governor::middleware::NoOpMiddleware;
use governor::state::{InMemoryState, NotKeyed};
use governor::{Quota, RateLimiter};

use crate::{RateLimitError, RateLimitResult, TokioClock};

type DirectRateLimiter<C> = RateLimiter<NotKeyed, InMemoryState, C, NoOpMiddleware<<C as Clock>::Instant>>;

/// A bucket holding up to `burst` tokens, refilled at `rate` tokens per second.
pub struct TokenBucket<C: Clock = TokioClock> {
    limiter: DirectRateLimiter<C>,
    clock: C,
    rate: f64,
    burst: u32,
}

impl TokenBucket {
    /// Create a bucket on the tokio clock. The bucket starts full.
    pub fn new(rate: f64, burst: u32) -> Result<Self, RateLimitError> {
        Self::with_clock(rate, burst, TokioClock::default())
    }
}

impl<C: Clock + Clone> TokenBucket<C> {
    /// Create a bucket reading time from the given clock.
    pub fn with_clock(rate: f64, burst: u32, clock: C) -> Result<Self, RateLimitError> {
        let quota = quota(rate, burst)?;

        log::debug!("Creating token bucket: {rate}/s with burst capacity of {burst}");

        Ok(Self {
            limiter: RateLimiter::direct_with_clock(quota, clock.clone()),
            clock,
            rate,
            burst,
        })
    }

    /// Take one token if available.
    pub fn check(&self) -> RateLimitResult {
        match self.limiter.check() {
            Ok(()) => RateLimitResult::allowed(),
            Err(not_until) => {
                let retry_after = not_until.wait_time_from(self.clock.now());
                log::debug!("Token bucket empty, retry after {retry_after:?}");

                RateLimitResult::denied(Some(retry_after))
            }
        }
    }

    /// A bucket refilling at `rate` that holds no more tokens than this one has left.
    ///
    /// The whole tokens of this bucket are taken in the process, so it must be discarded afterwards.
    pub(crate) fn retuned(&self, rate: f64) -> Result<Self, RateLimitError> {
        let next = Self::with_clock(rate, self.burst, self.clock.clone())?;
        let remaining = self.take_remaining();

        if let Some(spent) = NonZeroU32::new(self.burst - remaining) {
            // A full bucket always holds `burst` tokens.
            let _ = next.limiter.check_n(spent);
        }

        Ok(next)
    }

    fn take_remaining(&self) -> u32 {
        (1..=self.burst)
            .rev()
            .filter_map(NonZeroU32::new)
            .find(|&n| matches!(self.limiter.check_n(n), Ok(Ok(()))))
            .map_or(0, NonZeroU32::get)
    }

    /// Tokens added per second.
    pub fn rate(&self) -> f64 {
        self.rate
    }

    /// Bucket capacity.
    pub fn burst(&self) -> u32 {
        self.burst
    }
}

/// Converts a fractional per-second rate into a governor quota.
///
/// Governor expresses rates as the period between two tokens, which allows rates below one per second.
fn quota(rate: f64, burst: u32) -> Result<Quota, RateLimitError> {
    if !(rate.is_finite() && rate > 0.0) {
        return Err(RateLimitError::InvalidPolicy(format!("Invalid rate: {rate}")));
    }

    let burst =
        NonZeroU32::new(burst).ok_or_else(|| RateLimitError::InvalidPolicy(format!("Invalid burst size: {burst}")))?;

    let period = Duration::try_from_secs_f64(1.0 / rate)
        .map_err(|_| RateLimitError::InvalidPolicy(format!("Invalid rate: {rate}")))?;

    let quota = Quota::with_period(period)
        .ok_or_else(|| RateLimitError::InvalidPolicy(format!("Rate {rate} is too high")))?
        .allow_burst(burst);

    Ok(quota)
}

#[cfg(test)]
mod tests {
    use governor::clock::FakeRelativeClock;

    use super::*;

    fn admitted<C: Clock + Clone>(bucket: &TokenBucket<C>, attempts: usize) -> usize {
        (0..attempts).filter(|_| bucket.check().allowed).count()
    }

    #[test]
    fn burst_is_admitted_at_once() {
        let clock = FakeRelativeClock::default();
        let bucket = TokenBucket::with_clock(10.0, 20, clock.clone()).unwrap();

        assert_eq!(admitted(&bucket, 50), 20);
    }

    #[test]
    fn sustained_rate_follows_refill() {
        let clock = FakeRelativeClock::default();
        let bucket = TokenBucket::with_clock(10.0, 20, clock.clone()).unwrap();

        assert_eq!(admitted(&bucket, 20), 20);

        let mut total = 0;

        for _ in 0..5 {
            clock.advance(Duration::from_secs(1));
            total += admitted(&bucket, 100);
        }

        assert_eq!(total, 50);
    }

    #[test]
    fn denial_reports_retry_after() {
        let clock = FakeRelativeClock::default();
        let bucket = TokenBucket::with_clock(1.0, 1, clock.clone()).unwrap();

        assert!(bucket.check().allowed);

        let result = bucket.check();
        assert!(!result.allowed);
        assert_eq!(result.retry_after, Some(Duration::from_secs(1)));

        clock.advance(Duration::from_secs(1));
        assert!(bucket.check().allowed);
    }

    #[test]
    fn fractional_rate() {
        let clock = FakeRelativeClock::default();
        let bucket = TokenBucket::with_clock(0.5, 1, clock.clone()).unwrap();

        assert!(bucket.check().allowed);

        clock.advance(Duration::from_secs(1));
        assert!(!bucket.check().allowed);

        clock.advance(Duration::from_secs(1));
        assert!(bucket.check().allowed);
    }

    #[test]
    fn retuned_bucket_keeps_the_remaining_tokens() {
        let clock = FakeRelativeClock::default();
        let bucket = TokenBucket::with_clock(10.0, 10, clock.clone()).unwrap();

        assert_eq!(admitted(&bucket, 7), 7);

        let slower = bucket.retuned(5.0).unwrap();
        assert_eq!(slower.rate(), 5.0);
        assert_eq!(admitted(&slower, 10), 3);

        clock.advance(Duration::from_secs(1));
        assert_eq!(admitted(&slower, 10), 5);
    }

    #[test]
    fn retuning_a_drained_bucket_grants_nothing() {
        let clock = FakeRelativeClock::default();
        let bucket = TokenBucket::with_clock(10.0, 10, clock.clone()).unwrap();

        assert_eq!(admitted(&bucket, 10), 10);

        let faster = bucket.retuned(20.0).unwrap();
        assert_eq!(admitted(&faster, 10), 0);
    }

    #[test]
    fn zero_burst_is_rejected() {
        assert!(matches!(TokenBucket::new(1.0, 0), Err(RateLimitError::InvalidPolicy(_))));
    }

    #[test]
    fn zero_rate_is_rejected() {
        assert!(matches!(TokenBucket::new(0.0, 1), Err(RateLimitError::InvalidPolicy(_))));
    }
}
