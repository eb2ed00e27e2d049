//! Governor clock reading tokio time.

use std::time::Duration;

use governor::clock::Clock;
use tokio::time::Instant;

/// Measures time since its creation on the tokio clock, so buckets follow a paused runtime the same way
/// as the windows and adjustment timers next to them.
#[derive(Debug, Clone, Copy)]
pub struct TokioClock {
    origin: Instant,
}

impl Default for TokioClock {
    fn default() -> Self {
        Self { origin: Instant::now() }
    }
}

impl Clock for TokioClock {
    type Instant = Duration;

    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn follows_paused_time() {
        let clock = TokioClock::default();
        assert_eq!(clock.now(), Duration::ZERO);

        tokio::time::advance(Duration::from_secs(3)).await;
        assert_eq!(clock.now(), Duration::from_secs(3));
    }
}
