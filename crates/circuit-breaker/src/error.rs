/// Reasons a breaker refuses a call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BreakerError {
    /// The breaker is open and fails fast.
    #[error("circuit breaker '{name}' is open")]
    Open {
        /// Key of the breaker.
        name: String,
    },
    /// The breaker is half-open and all probe slots are taken.
    #[error("circuit breaker '{name}' is half-open and has no probe slot left")]
    TooManyRequests {
        /// Key of the breaker.
        name: String,
    },
}
