use std::time::Duration;

use config::ProviderKind;
use jiff::Timestamp;
use tokio::time::Instant;

use crate::{error::ErrorKind, messages::Usage, request::RequestContext};

/// Immutable record of one dispatched call.
#[derive(Debug, Clone, PartialEq)]
pub struct CallMetric {
    /// The correlation key of the call, or a generated id when the caller gave none.
    pub correlation_id: String,
    /// Name of the provider instance.
    pub provider: String,
    pub kind: ProviderKind,
    pub model: String,
    pub started_at: Timestamp,
    pub ended_at: Timestamp,
    pub duration: Duration,
    /// Time until the first streamed delta.
    pub time_to_first_token: Option<Duration>,
    pub streamed: bool,
    /// Whether the call passed admission and reached the adapter.
    pub admitted: bool,
    /// Observed usage, zero on failure.
    pub usage: Usage,
    pub success: bool,
    pub error_kind: Option<ErrorKind>,
    pub error_message: Option<String>,
    /// Estimated cost, zero when the model has no price.
    pub cost: f64,
    pub currency: Option<String>,
}

/// Measures a call in progress and produces its [`CallMetric`].
#[derive(Debug)]
pub(crate) struct CallTimer {
    correlation_id: String,
    provider: String,
    kind: ProviderKind,
    model: String,
    started_at: Timestamp,
    start: Instant,
    streamed: bool,
    admitted: bool,
    time_to_first_token: Option<Duration>,
}

impl CallTimer {
    pub fn start(context: &RequestContext, provider: &str, kind: ProviderKind, model: &str, streamed: bool) -> Self {
        let correlation_id = context
            .correlation_key
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        Self {
            correlation_id,
            provider: provider.to_string(),
            kind,
            model: model.to_string(),
            started_at: Timestamp::now(),
            start: Instant::now(),
            streamed,
            admitted: false,
            time_to_first_token: None,
        }
    }

    pub fn admitted(&mut self) {
        self.admitted = true;
    }

    pub fn kind(&self) -> ProviderKind {
        self.kind
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Remember the time to the first token. Later calls are ignored.
    pub fn first_token(&mut self) {
        if self.time_to_first_token.is_none() {
            self.time_to_first_token = Some(self.start.elapsed());
        }
    }

    pub fn success(&self, usage: Usage) -> CallMetric {
        self.finish(usage, None)
    }

    pub fn failure(&self, kind: ErrorKind, message: impl Into<String>, usage: Usage) -> CallMetric {
        self.finish(usage, Some((kind, message.into())))
    }

    fn finish(&self, usage: Usage, error: Option<(ErrorKind, String)>) -> CallMetric {
        let (error_kind, error_message) = match error {
            Some((kind, message)) => (Some(kind), Some(message)),
            None => (None, None),
        };

        CallMetric {
            correlation_id: self.correlation_id.clone(),
            provider: self.provider.clone(),
            kind: self.kind,
            model: self.model.clone(),
            started_at: self.started_at,
            ended_at: Timestamp::now(),
            duration: self.start.elapsed(),
            time_to_first_token: self.time_to_first_token,
            streamed: self.streamed,
            admitted: self.admitted,
            usage,
            success: error_kind.is_none(),
            error_kind,
            error_message,
            cost: 0.0,
            currency: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn measures_duration_and_first_token() {
        let context = RequestContext::new().with_correlation_key("chat-1");
        let mut timer = CallTimer::start(&context, "primary", ProviderKind::Openai, "gpt-4o-mini", true);

        tokio::time::advance(Duration::from_millis(150)).await;
        timer.first_token();

        tokio::time::advance(Duration::from_millis(50)).await;
        timer.first_token();

        let metric = timer.success(Usage::new(1, 1, None));

        assert_eq!(metric.correlation_id, "chat-1");
        assert_eq!(metric.time_to_first_token, Some(Duration::from_millis(150)));
        assert_eq!(metric.duration, Duration::from_millis(200));
        assert!(metric.success);
        assert!(metric.streamed);
    }

    #[tokio::test]
    async fn failure_carries_the_kind() {
        let timer = CallTimer::start(&RequestContext::new(), "claude", ProviderKind::Claude, "claude-3-haiku-20240307", false);
        let metric = timer.failure(ErrorKind::AdmissionDenied, "rate limited", Usage::default());

        assert!(!metric.success);
        assert!(!metric.admitted);
        assert_eq!(metric.error_kind, Some(ErrorKind::AdmissionDenied));
        assert!(!metric.correlation_id.is_empty());
    }
}
