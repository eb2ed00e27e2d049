//! Per-key circuit breaking for upstream calls.
//!
//! A breaker moves between three states:
//! - `closed`: calls pass and their outcomes are counted until the trip predicate fires
//! - `open`: calls fail fast until the open timeout elapses
//! - `half_open`: a limited number of probes decide between closing and reopening
//!
//! Every transition starts a new generation. Outcomes reported for a permit taken in an older
//! generation are discarded, so a slow call cannot affect the state it did not observe.

#![deny(missing_docs)]

mod breaker;
mod counts;
mod error;
mod registry;
mod state;

pub use breaker::{CircuitBreaker, Outcome, Permit, StateChangeHook, TripPredicate};
pub use counts::Counts;
pub use error::BreakerError;
pub use registry::BreakerRegistry;
pub use state::BreakerState;
