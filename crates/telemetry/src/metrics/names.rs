//! Metric names of the dispatch core.

/// Calls by `provider`, `model` and `status` (`success` or `error`).
pub const REQUESTS_TOTAL: &str = "requests_total";

/// Call duration in seconds by `provider` and `model`.
pub const REQUEST_DURATION_SECONDS: &str = "request_duration_seconds";

/// Time to the first streamed delta in seconds by `provider` and `model`.
pub const TIME_TO_FIRST_TOKEN_SECONDS: &str = "time_to_first_token_seconds";

/// Tokens by `provider`, `model` and `type` (`prompt`, `completion` or `total`).
pub const TOKENS_TOTAL: &str = "tokens_total";

/// Estimated spend by `provider`, `model` and `currency`.
pub const COST_TOTAL: &str = "cost_total";

/// Failed calls by `provider`, `model` and `error_kind`.
pub const ERRORS_TOTAL: &str = "errors_total";

/// In-flight calls by `provider` and `model`.
pub const ACTIVE_REQUESTS: &str = "active_requests";

/// Local rate limit rejections by `provider`.
pub const RATE_LIMIT_HITS_TOTAL: &str = "rate_limit_hits_total";

/// Breaker state by `provider`: 0 closed, 1 open, 2 half-open.
pub const BREAKER_STATE: &str = "breaker_state";

/// Health probe duration in seconds by `provider` and `status`.
pub const HEALTH_CHECK_DURATION_SECONDS: &str = "health_check_duration_seconds";
