//! LLM dispatch core.
//!
//! A [`Dispatcher`] holds named provider instances, each an adapter for one upstream
//! vendor (OpenAI, Azure OpenAI, Qianwen, Claude, Baichuan, ChatGLM) behind the uniform
//! [`Provider`] contract. Every call passes the instance's rate limiter and circuit
//! breaker, can be aborted by correlation key, and ends as one priced
//! [`CallMetric`](metrics::CallMetric) pushed to the registered sinks.

mod cancellation;
mod dispatcher;
mod error;
mod factory;
mod messages;
pub mod metrics;
mod provider;
mod request;
mod sse;

pub use cancellation::{CancellationGuard, CancellationRegistry};
pub use circuit_breaker::{BreakerState, Counts, TripPredicate};
pub use dispatcher::{Dispatcher, DispatcherBuilder};
pub use error::{ErrorKind, LlmError, authz, retryable};
pub use factory::{create_provider, parse_kind};
pub use messages::{
    Capability, ChatRequest, ChatResult, Choice, Message, ModelInfo, Pricing, Role, StreamEvent, Usage,
};
pub use provider::{EventStream, Provider};
pub use request::RequestContext;

pub type Result<T> = std::result::Result<T, LlmError>;
