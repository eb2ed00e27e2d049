use reqwest::StatusCode;
use serde::Deserialize;

use crate::{
    error::ErrorKind,
    messages::{ChatResult, StreamEvent, Usage},
    provider::http::VendorError,
    sse::StreamDecoder,
};

/// Response of a non-streamed message.
#[derive(Debug, Deserialize)]
pub(super) struct ClaudeResponse {
    id: String,
    model: String,
    content: Vec<ClaudeContent>,
    #[serde(default)]
    stop_reason: Option<String>,
    usage: ClaudeUsage,
}

#[derive(Debug, Deserialize)]
struct ClaudeContent {
    #[serde(rename = "type")]
    content_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, Deserialize)]
struct ClaudeUsage {
    #[serde(default)]
    input_tokens: u32,
    #[serde(default)]
    output_tokens: u32,
}

impl From<ClaudeUsage> for Usage {
    fn from(usage: ClaudeUsage) -> Self {
        Usage::new(usage.input_tokens, usage.output_tokens, None)
    }
}

impl From<ClaudeResponse> for ChatResult {
    fn from(response: ClaudeResponse) -> Self {
        let text = response
            .content
            .into_iter()
            .filter(|block| block.content_type == "text")
            .filter_map(|block| block.text)
            .collect::<String>();

        ChatResult::single(response.id, response.model, text, response.stop_reason, response.usage.into())
    }
}

/// One event of the Messages streaming protocol.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ClaudeStreamEvent {
    MessageStart {
        message: MessageStart,
    },
    ContentBlockDelta {
        delta: BlockDelta,
    },
    MessageDelta {
        #[serde(default)]
        delta: MessageDeltaData,
        #[serde(default)]
        usage: Option<DeltaUsage>,
    },
    MessageStop {
        #[serde(default)]
        message: Option<MessageStop>,
    },
    Error {
        error: ErrorDetail,
    },
    /// `ping`, `content_block_start`, `content_block_stop` and future event types.
    #[serde(other)]
    Other,
}

#[derive(Debug, Deserialize)]
struct MessageStart {
    #[serde(default)]
    usage: Option<ClaudeUsage>,
}

#[derive(Debug, Deserialize)]
struct BlockDelta {
    #[serde(rename = "type")]
    delta_type: String,
    #[serde(default)]
    text: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct MessageDeltaData {
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct DeltaUsage {
    #[serde(default)]
    input_tokens: Option<u32>,
    #[serde(default)]
    output_tokens: u32,
}

#[derive(Debug, Deserialize)]
struct MessageStop {
    #[serde(default)]
    usage: Option<ClaudeUsage>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(rename = "type")]
    error_type: String,
    #[serde(default)]
    message: String,
}

fn error_kind(error_type: &str) -> Option<ErrorKind> {
    let kind = match error_type {
        "invalid_request_error" | "request_too_large" => ErrorKind::InvalidRequest,
        "authentication_error" | "permission_error" => ErrorKind::Unauthorized,
        "billing_error" => ErrorKind::QuotaExceeded,
        "not_found_error" => ErrorKind::ModelUnavailable,
        "rate_limit_error" => ErrorKind::RateLimitedUpstream,
        "overloaded_error" => ErrorKind::UpstreamUnavailable,
        "api_error" => ErrorKind::ApiCallFailed,
        _ => return None,
    };

    Some(kind)
}

/// Map the status, refined by the `error.type` of the body.
pub(super) fn classify_error(status: StatusCode, body: &str) -> VendorError {
    let mut vendor = VendorError::from_status(status);

    if let Ok(ErrorBody { error }) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(kind) = error_kind(&error.error_type) {
            vendor.kind = kind;
        }

        vendor.message = Some(error.message);
        vendor.code = Some(error.error_type);
    }

    vendor
}

/// Stream decoder of the Messages protocol. Input tokens arrive with `message_start`,
/// output tokens and the stop reason with `message_delta`, the end with `message_stop`.
#[derive(Debug, Default)]
pub(super) struct ClaudeDecoder {
    input_tokens: Option<u32>,
    output_tokens: Option<u32>,
    stop_reason: Option<String>,
}

impl ClaudeDecoder {
    fn usage(&self) -> Option<Usage> {
        if self.input_tokens.is_none() && self.output_tokens.is_none() {
            return None;
        }

        Some(Usage::new(
            self.input_tokens.unwrap_or_default(),
            self.output_tokens.unwrap_or_default(),
            None,
        ))
    }
}

impl StreamDecoder for ClaudeDecoder {
    fn decode(&mut self, _event: &str, data: &str) -> Result<Vec<StreamEvent>, String> {
        let event: ClaudeStreamEvent = sonic_rs::from_str(data).map_err(|e| e.to_string())?;

        let event = match event {
            ClaudeStreamEvent::MessageStart { message } => {
                if let Some(usage) = message.usage {
                    self.input_tokens = Some(usage.input_tokens);
                }

                return Ok(Vec::new());
            }
            ClaudeStreamEvent::ContentBlockDelta { delta } => match delta.text {
                Some(text) if delta.delta_type == "text_delta" && !text.is_empty() => StreamEvent::delta(text),
                _ => return Ok(Vec::new()),
            },
            ClaudeStreamEvent::MessageDelta { delta, usage } => {
                if let Some(reason) = delta.stop_reason {
                    self.stop_reason = Some(reason);
                }

                if let Some(usage) = usage {
                    self.output_tokens = Some(usage.output_tokens);

                    if let Some(input_tokens) = usage.input_tokens {
                        self.input_tokens = Some(input_tokens);
                    }
                }

                return Ok(Vec::new());
            }
            ClaudeStreamEvent::MessageStop { message } => {
                let (usage, stop_reason) = match message {
                    Some(message) => (message.usage.map(Usage::from), message.stop_reason),
                    None => (None, None),
                };

                StreamEvent::Done {
                    finish_reason: stop_reason.or_else(|| self.stop_reason.take()),
                    usage: usage.or_else(|| self.usage()),
                }
            }
            ClaudeStreamEvent::Error { error } => StreamEvent::error(
                error_kind(&error.error_type).unwrap_or(ErrorKind::ApiCallFailed),
                error.message,
            ),
            ClaudeStreamEvent::Other => return Ok(Vec::new()),
        };

        Ok(vec![event])
    }

    fn finish(&mut self) -> StreamEvent {
        StreamEvent::Done {
            finish_reason: self.stop_reason.take(),
            usage: self.usage(),
        }
    }
}
