/// Request outcomes observed within the current generation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Counts {
    /// Calls admitted.
    pub requests: u32,
    /// Successful calls.
    pub total_successes: u32,
    /// Failed calls.
    pub total_failures: u32,
    /// Successes since the last failure.
    pub consecutive_successes: u32,
    /// Failures since the last success.
    pub consecutive_failures: u32,
}

impl Counts {
    pub(crate) fn on_request(&mut self) {
        self.requests = self.requests.saturating_add(1);
    }

    pub(crate) fn on_success(&mut self) {
        self.total_successes = self.total_successes.saturating_add(1);
        self.consecutive_successes = self.consecutive_successes.saturating_add(1);
        self.consecutive_failures = 0;
    }

    pub(crate) fn on_failure(&mut self) {
        self.total_failures = self.total_failures.saturating_add(1);
        self.consecutive_failures = self.consecutive_failures.saturating_add(1);
        self.consecutive_successes = 0;
    }

    /// An admitted call that reported neither outcome gives its slot back.
    pub(crate) fn on_ignored(&mut self) {
        self.requests = self.requests.saturating_sub(1);
    }

    pub(crate) fn clear(&mut self) {
        *self = Self::default();
    }

    /// Failure share among the decided calls.
    pub fn failure_ratio(&self) -> f64 {
        let decided = self.total_successes + self.total_failures;

        if decided == 0 {
            return 0.0;
        }

        f64::from(self.total_failures) / f64::from(decided)
    }
}
