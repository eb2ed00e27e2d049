use reqwest::StatusCode;
use serde::Deserialize;

use crate::{
    error::ErrorKind,
    messages::{ChatResult, StreamEvent, Usage},
    provider::http::VendorError,
    sse::StreamDecoder,
};

/// Response of the text generation API, also the shape of each stream event.
#[derive(Debug, Deserialize)]
pub(super) struct QianwenResponse {
    #[serde(default)]
    request_id: String,
    #[serde(default)]
    output: Option<QianwenOutput>,
    #[serde(default)]
    usage: Option<QianwenUsage>,
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
struct QianwenOutput {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    finish_reason: Option<String>,
    /// Present when the `message` result format is used.
    #[serde(default)]
    choices: Vec<QianwenChoice>,
}

#[derive(Debug, Deserialize)]
struct QianwenChoice {
    #[serde(default)]
    finish_reason: Option<String>,
    message: QianwenMessage,
}

#[derive(Debug, Deserialize)]
struct QianwenMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Clone, Copy, Deserialize)]
struct QianwenUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
    #[serde(default)]
    total_tokens: Option<u32>,
}

impl From<QianwenUsage> for Usage {
    fn from(usage: QianwenUsage) -> Self {
        Usage::new(usage.input_tokens, usage.output_tokens, usage.total_tokens)
    }
}

impl QianwenOutput {
    /// The text and finish reason, from either result format. DashScope spells an unfinished
    /// generation as the string `"null"`.
    fn into_parts(self) -> (String, Option<String>) {
        let (text, finish_reason) = match self.choices.into_iter().next() {
            Some(choice) => (choice.message.content, choice.finish_reason),
            None => (self.text.unwrap_or_default(), self.finish_reason),
        };

        (text, finish_reason.filter(|reason| !reason.is_empty() && reason != "null"))
    }
}

impl QianwenResponse {
    pub(super) fn into_result(self, requested_model: &str) -> ChatResult {
        let (text, finish_reason) = self.output.map(QianwenOutput::into_parts).unwrap_or_default();

        ChatResult::single(
            self.request_id,
            requested_model.to_string(),
            text,
            finish_reason,
            self.usage.map(Usage::from).unwrap_or_default(),
        )
    }
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    code: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

fn error_kind(code: &str) -> Option<ErrorKind> {
    let kind = match code {
        "Throttling.AllocationQuota" | "Arrearage" | "Throttling.FreeTierOnly" => ErrorKind::QuotaExceeded,
        "Throttling" | "Throttling.RateQuota" | "Throttling.BurstRate" => ErrorKind::RateLimitedUpstream,
        "InvalidApiKey" | "AccessDenied" | "AccessDenied.Unpurchased" | "Model.AccessDenied" => {
            ErrorKind::Unauthorized
        }
        "ModelNotFound" | "ModelNotExist" => ErrorKind::ModelUnavailable,
        "InvalidParameter" => ErrorKind::InvalidParameters,
        "DataInspectionFailed" | "BadRequest.EmptyInput" | "BadRequest.TooLarge" => ErrorKind::InvalidRequest,
        "ServiceUnavailable" | "ModelServingError" => ErrorKind::UpstreamUnavailable,
        "InternalError" | "InternalError.Algo" => ErrorKind::ApiCallFailed,
        "RequestTimeOut" => ErrorKind::Timeout,
        _ => return None,
    };

    Some(kind)
}

/// Map the status, refined by the DashScope `code`.
pub(super) fn classify_error(status: StatusCode, body: &str) -> VendorError {
    let mut vendor = VendorError::from_status(status);

    if let Ok(error) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(kind) = error.code.as_deref().and_then(error_kind) {
            vendor.kind = kind;
        }

        vendor.code = error.code;
        vendor.message = error.message;
    }

    vendor
}

/// Stream decoder for incremental output. Every event carries the running usage; the
/// first event with a finish reason ends the generation.
#[derive(Debug, Default)]
pub(super) struct QianwenDecoder {
    usage: Option<Usage>,
}

impl StreamDecoder for QianwenDecoder {
    fn decode(&mut self, event: &str, data: &str) -> Result<Vec<StreamEvent>, String> {
        let response: QianwenResponse = sonic_rs::from_str(data).map_err(|e| e.to_string())?;

        if event == "error" || response.code.as_deref().is_some_and(|code| !code.is_empty()) {
            let kind = response
                .code
                .as_deref()
                .and_then(error_kind)
                .unwrap_or(ErrorKind::ApiCallFailed);

            let message = response
                .message
                .unwrap_or_else(|| "upstream reported an error".to_string());

            return Ok(vec![StreamEvent::error(kind, message)]);
        }

        let usage = response.usage.map(Usage::from);

        if usage.is_some() {
            self.usage = usage;
        }

        let Some(output) = response.output else {
            return Ok(Vec::new());
        };

        let (text, finish_reason) = output.into_parts();
        let mut events = Vec::with_capacity(2);

        if !text.is_empty() {
            events.push(StreamEvent::Delta {
                index: 0,
                content: text,
                usage,
            });
        }

        if finish_reason.is_some() {
            events.push(StreamEvent::Done {
                finish_reason,
                usage: self.usage,
            });
        }

        Ok(events)
    }

    fn finish(&mut self) -> StreamEvent {
        StreamEvent::Done {
            finish_reason: None,
            usage: self.usage.take(),
        }
    }
}
