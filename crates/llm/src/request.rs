use std::time::Duration;

use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Per-call context threaded from the caller through the dispatcher into the adapter.
///
/// Cancelling the token, or reaching the deadline, ends the call with a `cancelled`
/// or `timeout` error. The correlation key makes an in-flight call abortable through
/// [`Dispatcher::abort`](crate::Dispatcher::abort).
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Caller-chosen key identifying the in-flight generation.
    pub correlation_key: Option<String>,
    /// Caller-owned cancellation.
    pub cancellation: CancellationToken,
    /// Absolute point in time after which the call fails with `timeout`.
    pub deadline: Option<Instant>,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the call abortable under the given key.
    pub fn with_correlation_key(mut self, key: impl Into<String>) -> Self {
        self.correlation_key = Some(key.into());
        self
    }

    /// Bound the call by an absolute deadline. An earlier deadline already set wins.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(match self.deadline {
            Some(current) => current.min(deadline),
            None => deadline,
        });

        self
    }

    /// Bound the call to complete within the given duration from now.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Tie the call to an existing cancellation token.
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancellation = token;
        self
    }

    /// Time left until the deadline, if there is one.
    pub fn remaining(&self) -> Option<Duration> {
        self.deadline
            .map(|deadline| deadline.saturating_duration_since(Instant::now()))
    }

    /// The effective timeout of a synchronous call: the smaller of the configured one
    /// and the time left until the deadline.
    pub(crate) fn effective_timeout(&self, configured: Duration) -> Duration {
        match self.remaining() {
            Some(remaining) => remaining.min(configured),
            None => configured,
        }
    }
}
