//! Sliding window limiter built from rotating sub-window counters.

use std::sync::Mutex;
use std::time::Duration;

use tokio::time::Instant;

use crate::{RateLimitError, RateLimitResult};

/// Admits at most `max_requests` within any `window`, tracked in `sub_windows` buckets.
///
/// The window advances one bucket at a time. Rotating into a bucket clears the counts it held
/// from the previous lap, so the admitted total always covers the last `sub_windows` buckets.
pub struct SlidingWindow {
    max_requests: u32,
    bucket_size: Duration,
    state: Mutex<WindowState>,
}

struct WindowState {
    counts: Vec<u32>,
    current: usize,
    current_start: Instant,
}

impl SlidingWindow {
    /// Create an empty window.
    pub fn new(window: Duration, max_requests: u32, sub_windows: u32) -> Result<Self, RateLimitError> {
        if window.is_zero() || max_requests == 0 || sub_windows == 0 {
            return Err(RateLimitError::InvalidPolicy(format!(
                "Invalid sliding window: {max_requests} requests per {window:?} in {sub_windows} sub-windows"
            )));
        }

        let bucket_size = window / sub_windows;

        if bucket_size.is_zero() {
            return Err(RateLimitError::InvalidPolicy(format!(
                "Window {window:?} is too small for {sub_windows} sub-windows"
            )));
        }

        log::debug!("Creating sliding window: {max_requests} requests per {window:?} in {sub_windows} sub-windows");

        Ok(Self {
            max_requests,
            bucket_size,
            state: Mutex::new(WindowState {
                counts: vec![0; sub_windows as usize],
                current: 0,
                current_start: Instant::now(),
            }),
        })
    }

    /// Count one request if the window has room.
    pub fn check(&self) -> RateLimitResult {
        let now = Instant::now();
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());

        state.rotate(now, self.bucket_size);

        let total: u32 = state.counts.iter().sum();

        if total < self.max_requests {
            let current = state.current;
            state.counts[current] += 1;

            return RateLimitResult::allowed();
        }

        let retry_after = state.next_release(now, self.bucket_size);
        log::debug!("Sliding window full ({total} requests), retry after {retry_after:?}");

        RateLimitResult::denied(Some(retry_after))
    }

    /// Number of requests currently counted in the window.
    pub fn in_window(&self) -> u32 {
        let mut state = self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
        state.rotate(Instant::now(), self.bucket_size);

        state.counts.iter().sum()
    }
}

impl WindowState {
    fn rotate(&mut self, now: Instant, bucket_size: Duration) {
        let elapsed = now.saturating_duration_since(self.current_start);
        let steps = (elapsed.as_nanos() / bucket_size.as_nanos()) as u64;

        if steps == 0 {
            return;
        }

        let len = self.counts.len();

        for _ in 0..steps.min(len as u64) {
            self.current = (self.current + 1) % len;
            self.counts[self.current] = 0;
        }

        self.current_start += bucket_size.saturating_mul(steps.min(u32::MAX as u64) as u32);
    }

    /// Time until the oldest non-empty bucket leaves the window.
    fn next_release(&self, now: Instant, bucket_size: Duration) -> Duration {
        let len = self.counts.len();

        // Buckets from the oldest to the current one.
        for age in (0..len).rev() {
            let index = (self.current + len - age) % len;

            if self.counts[index] == 0 {
                continue;
            }

            let expires = self.current_start + bucket_size * (len - age) as u32;

            return expires.saturating_duration_since(now);
        }

        Duration::ZERO
    }
}
