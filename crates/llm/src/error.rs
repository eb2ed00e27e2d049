use std::{collections::BTreeMap, fmt};

use circuit_breaker::BreakerError;
use config::{ConfigError, ProviderKind};
use rate_limit::RateLimitError;
use serde::{Deserialize, Serialize};

/// Uniform error kinds shared by every adapter and the dispatcher.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The provider configuration is malformed or inconsistent.
    InvalidConfig,
    /// The API key is missing or empty.
    MissingCredential,
    /// The request is malformed.
    InvalidRequest,
    /// The model is missing or not served.
    InvalidModel,
    /// A sampling parameter is out of range.
    InvalidParameters,
    /// The upstream refused the credential or the permission.
    Unauthorized,
    /// The upstream throttled the call.
    RateLimitedUpstream,
    /// The account ran out of quota or credit.
    QuotaExceeded,
    /// The model is unknown to or unavailable at the upstream.
    ModelUnavailable,
    /// The upstream is overloaded or down.
    UpstreamUnavailable,
    /// The call exceeded its deadline.
    Timeout,
    /// The upstream answered with something that could not be decoded.
    InvalidResponse,
    /// The event stream broke before its end.
    StreamClosed,
    /// The call failed for another transport or upstream reason.
    ApiCallFailed,
    /// The local rate limiter or an open breaker refused the call.
    AdmissionDenied,
    /// The half-open breaker has no probe slot left.
    AdmissionOverloaded,
    /// The call was cancelled by its caller or aborted.
    Cancelled,
    /// No provider is registered under the name.
    ProviderNotFound,
    /// Nothing is registered under the correlation key.
    NotFound,
}

impl ErrorKind {
    /// Label used in logs, metric attributes and stream error events.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::InvalidConfig => "invalid_config",
            ErrorKind::MissingCredential => "missing_credential",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::InvalidModel => "invalid_model",
            ErrorKind::InvalidParameters => "invalid_parameters",
            ErrorKind::Unauthorized => "unauthorized",
            ErrorKind::RateLimitedUpstream => "rate_limited_upstream",
            ErrorKind::QuotaExceeded => "quota_exceeded",
            ErrorKind::ModelUnavailable => "model_unavailable",
            ErrorKind::UpstreamUnavailable => "upstream_unavailable",
            ErrorKind::Timeout => "timeout",
            ErrorKind::InvalidResponse => "invalid_response",
            ErrorKind::StreamClosed => "stream_closed",
            ErrorKind::ApiCallFailed => "api_call_failed",
            ErrorKind::AdmissionDenied => "admission_denied",
            ErrorKind::AdmissionOverloaded => "admission_overloaded",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::ProviderNotFound => "provider_not_found",
            ErrorKind::NotFound => "not_found",
        }
    }

    /// Whether repeating the same call later may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::UpstreamUnavailable | ErrorKind::ApiCallFailed | ErrorKind::RateLimitedUpstream
        )
    }

    /// Whether the failure is about credentials or permissions rather than load.
    pub fn is_authz(&self) -> bool {
        matches!(self, ErrorKind::Unauthorized | ErrorKind::MissingCredential)
    }

    /// Baseline mapping of an upstream HTTP status. Adapters refine it from the error body.
    pub fn from_status(status: u16) -> Self {
        match status {
            400 | 413 | 422 => ErrorKind::InvalidRequest,
            401 | 403 => ErrorKind::Unauthorized,
            402 => ErrorKind::QuotaExceeded,
            404 => ErrorKind::ModelUnavailable,
            408 | 504 => ErrorKind::Timeout,
            429 => ErrorKind::RateLimitedUpstream,
            503 | 529 => ErrorKind::UpstreamUnavailable,
            _ => ErrorKind::ApiCallFailed,
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error returned by every operation of the dispatch core.
#[derive(Debug, thiserror::Error)]
#[error("{kind}: {message}")]
pub struct LlmError {
    kind: ErrorKind,
    message: String,
    provider: Option<ProviderKind>,
    model: Option<String>,
    details: BTreeMap<String, String>,
    #[source]
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl LlmError {
    /// A new error of the given kind.
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            provider: None,
            model: None,
            details: BTreeMap::new(),
            source: None,
        }
    }

    /// Attach the owning provider kind, unless one is already set.
    pub fn with_provider(mut self, provider: ProviderKind) -> Self {
        self.provider.get_or_insert(provider);
        self
    }

    /// Attach the originating model, unless one is already set.
    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        let model = model.into();

        if self.model.is_none() && !model.is_empty() {
            self.model = Some(model);
        }

        self
    }

    /// Attach a detail, such as the upstream status or vendor error code.
    pub fn with_detail(mut self, key: impl Into<String>, value: impl ToString) -> Self {
        self.details.insert(key.into(), value.to_string());
        self
    }

    /// Attach the underlying cause.
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// The error kind.
    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    /// Human readable message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// The provider kind the error originates from.
    pub fn provider(&self) -> Option<ProviderKind> {
        self.provider
    }

    /// The model the failed call targeted.
    pub fn model(&self) -> Option<&str> {
        self.model.as_deref()
    }

    /// Additional details.
    pub fn details(&self) -> &BTreeMap<String, String> {
        &self.details
    }

    /// Whether repeating the same call later may succeed.
    pub fn retryable(&self) -> bool {
        self.kind.is_retryable()
    }

    /// Whether the failure is about credentials or permissions.
    pub fn authz(&self) -> bool {
        self.kind.is_authz()
    }

    pub(crate) fn cancelled() -> Self {
        Self::new(ErrorKind::Cancelled, "the generation was cancelled")
    }

    pub(crate) fn deadline_exceeded() -> Self {
        Self::new(ErrorKind::Timeout, "the call exceeded its deadline")
    }

    pub(crate) fn provider_not_found(name: &str) -> Self {
        Self::new(ErrorKind::ProviderNotFound, format!("provider '{name}' is not registered"))
    }
}

impl From<ConfigError> for LlmError {
    fn from(error: ConfigError) -> Self {
        let kind = match error {
            ConfigError::MissingCredential => ErrorKind::MissingCredential,
            ConfigError::Invalid(_) => ErrorKind::InvalidConfig,
        };

        Self::new(kind, error.to_string())
    }
}

impl From<RateLimitError> for LlmError {
    fn from(error: RateLimitError) -> Self {
        if let RateLimitError::InvalidPolicy(_) = error {
            return Self::new(ErrorKind::InvalidConfig, error.to_string());
        }

        let mut converted = Self::new(ErrorKind::AdmissionDenied, error.to_string());

        if let Some(retry_after) = error.retry_after() {
            converted = converted.with_detail("retry_after_ms", retry_after.as_millis());
        }

        converted.with_source(error)
    }
}

impl From<BreakerError> for LlmError {
    fn from(error: BreakerError) -> Self {
        let kind = match error {
            BreakerError::Open { .. } => ErrorKind::AdmissionDenied,
            BreakerError::TooManyRequests { .. } => ErrorKind::AdmissionOverloaded,
        };

        Self::new(kind, error.to_string()).with_source(error)
    }
}

/// Whether repeating the call later may succeed.
pub fn retryable(error: &LlmError) -> bool {
    error.retryable()
}

/// Whether the failure is about credentials or permissions rather than load.
pub fn authz(error: &LlmError) -> bool {
    error.authz()
}
