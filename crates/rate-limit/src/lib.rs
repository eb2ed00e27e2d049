//! Per-key admission rate limiting.
//!
//! Every named provider instance owns one limiter, selected by its configured policy:
//! - Token bucket, backed by the governor crate
//! - Sliding window with rotating sub-window counters
//! - Adaptive token bucket whose rate follows the observed upstream error rate
//!
//! Limiter state is in-memory, created lazily on first use and evicted after a period of inactivity.

#![deny(missing_docs)]

mod adaptive;
mod clock;
mod error;
mod limiter;
mod manager;
mod sliding_window;
mod token_bucket;

pub use adaptive::AdaptiveLimiter;
pub use clock::TokioClock;
pub use error::RateLimitError;
pub use limiter::{Limiter, RateLimitResult};
pub use manager::RateLimitManager;
pub use sliding_window::SlidingWindow;
pub use token_bucket::TokenBucket;
