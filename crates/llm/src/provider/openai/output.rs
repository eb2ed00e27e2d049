use reqwest::StatusCode;
use serde::Deserialize;

use crate::{
    error::ErrorKind,
    messages::{ChatResult, Choice, Message, StreamEvent, Usage},
    provider::http::VendorError,
    sse::StreamDecoder,
};

#[derive(Debug, Deserialize)]
pub(super) struct OpenAiResponse {
    #[serde(default)]
    id: String,
    #[serde(default)]
    model: String,
    choices: Vec<OpenAiChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
}

#[derive(Debug, Deserialize)]
struct OpenAiChoice {
    #[serde(default)]
    index: u32,
    message: OpenAiMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Clone, Copy, Deserialize)]
pub(super) struct OpenAiUsage {
    #[serde(default)]
    prompt_tokens: u32,
    #[serde(default)]
    completion_tokens: u32,
    #[serde(default)]
    total_tokens: Option<u32>,
}

impl From<OpenAiUsage> for Usage {
    fn from(usage: OpenAiUsage) -> Self {
        Usage::new(usage.prompt_tokens, usage.completion_tokens, usage.total_tokens)
    }
}

impl OpenAiResponse {
    /// Collapse into the uniform result. Compatible upstreams sometimes omit the model echo.
    pub(super) fn into_result(self, requested_model: &str) -> ChatResult {
        let model = if self.model.is_empty() {
            requested_model.to_string()
        } else {
            self.model
        };

        ChatResult {
            id: self.id,
            model,
            choices: self
                .choices
                .into_iter()
                .map(|choice| Choice {
                    index: choice.index,
                    message: Message::assistant(choice.message.content.unwrap_or_default()),
                    finish_reason: choice.finish_reason,
                })
                .collect(),
            usage: self.usage.map(Usage::from).unwrap_or_default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChunk {
    #[serde(default)]
    choices: Vec<OpenAiStreamChoice>,
    #[serde(default)]
    usage: Option<OpenAiUsage>,
    #[serde(default)]
    error: Option<ErrorDetail>,
}

#[derive(Debug, Deserialize)]
struct OpenAiStreamChoice {
    #[serde(default)]
    index: u32,
    #[serde(default)]
    delta: Option<OpenAiDelta>,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct OpenAiDelta {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
pub(super) struct OpenAiModelsResponse {
    pub(super) data: Vec<OpenAiModel>,
}

#[derive(Debug, Deserialize)]
pub(super) struct OpenAiModel {
    pub(super) id: String,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Debug, Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: Option<String>,
    #[serde(default, rename = "type")]
    error_type: Option<String>,
    #[serde(default)]
    code: Option<serde_json::Value>,
}

impl ErrorDetail {
    /// Vendors send the code as a string or as a number.
    fn code(&self) -> Option<String> {
        match self.code.as_ref()? {
            serde_json::Value::String(code) => Some(code.clone()),
            serde_json::Value::Number(code) => Some(code.to_string()),
            _ => None,
        }
    }
}

/// Decode an OpenAI-style error body and refine the status mapping from its code and type.
pub(crate) fn classify_error(status: StatusCode, body: &str) -> VendorError {
    let mut vendor = VendorError::from_status(status);

    let Ok(ErrorBody { error }) = serde_json::from_str::<ErrorBody>(body) else {
        return vendor;
    };

    let code = error.code();

    if let Some(kind) = refine(code.as_deref(), error.error_type.as_deref()) {
        vendor.kind = kind;
    }

    vendor.code = code.or(error.error_type);
    vendor.message = error.message;

    vendor
}

fn refine(code: Option<&str>, error_type: Option<&str>) -> Option<ErrorKind> {
    let kind = match (code, error_type) {
        (Some("insufficient_quota"), _) | (_, Some("insufficient_quota")) => ErrorKind::QuotaExceeded,
        (Some("invalid_api_key"), _) | (_, Some("authentication_error")) => ErrorKind::Unauthorized,
        (Some("model_not_found"), _) => ErrorKind::ModelUnavailable,
        (Some("context_length_exceeded"), _) => ErrorKind::InvalidRequest,
        (Some("rate_limit_exceeded"), _) => ErrorKind::RateLimitedUpstream,
        (_, Some("server_error")) => ErrorKind::ApiCallFailed,
        _ => return None,
    };

    Some(kind)
}

/// Stream decoder of the Chat Completions chunk format.
///
/// The finish reason and the usage-only chunk both precede `[DONE]`, so both are held
/// back and emitted with the terminal event.
#[derive(Debug, Default)]
pub(crate) struct OpenAiDecoder {
    finish_reason: Option<String>,
    usage: Option<Usage>,
}

impl StreamDecoder for OpenAiDecoder {
    fn decode(&mut self, _event: &str, data: &str) -> Result<Vec<StreamEvent>, String> {
        let chunk: OpenAiStreamChunk = sonic_rs::from_str(data).map_err(|e| e.to_string())?;

        if let Some(error) = chunk.error {
            let kind = refine(error.code().as_deref(), error.error_type.as_deref()).unwrap_or(ErrorKind::ApiCallFailed);
            let message = error.message.unwrap_or_else(|| "upstream reported an error".to_string());

            return Ok(vec![StreamEvent::error(kind, message)]);
        }

        let usage = chunk.usage.map(Usage::from);

        if usage.is_some() {
            self.usage = usage;
        }

        let mut events = Vec::with_capacity(chunk.choices.len());

        for choice in chunk.choices {
            if let Some(reason) = choice.finish_reason {
                self.finish_reason = Some(reason);
            }

            let Some(content) = choice.delta.and_then(|delta| delta.content) else {
                continue;
            };

            if content.is_empty() {
                continue;
            }

            events.push(StreamEvent::Delta {
                index: choice.index,
                content,
                usage,
            });
        }

        Ok(events)
    }

    fn finish(&mut self) -> StreamEvent {
        StreamEvent::Done {
            finish_reason: self.finish_reason.take(),
            usage: self.usage.take(),
        }
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_debug_snapshot;

    use super::*;

    #[test]
    fn response_collapses_to_result() {
        let response: OpenAiResponse = sonic_rs::from_str(
            r#"{
                "id": "chatcmpl-1",
                "object": "chat.completion",
                "model": "gpt-4o-mini",
                "choices": [{"index": 0, "message": {"role": "assistant", "content": "hello"}, "finish_reason": "stop"}],
                "usage": {"prompt_tokens": 1, "completion_tokens": 1, "total_tokens": 2}
            }"#,
        )
        .unwrap();

        assert_debug_snapshot!(response.into_result("gpt-4o-mini"), @r#"
        ChatResult {
            id: "chatcmpl-1",
            model: "gpt-4o-mini",
            choices: [
                Choice {
                    index: 0,
                    message: Message {
                        role: Assistant,
                        content: "hello",
                        name: None,
                    },
                    finish_reason: Some(
                        "stop",
                    ),
                },
            ],
            usage: Usage {
                prompt_tokens: 1,
                completion_tokens: 1,
                total_tokens: 2,
            },
        }
        "#);
    }

    #[test]
    fn missing_model_echo_uses_requested_model() {
        let response: OpenAiResponse =
            sonic_rs::from_str(r#"{"id":"x","choices":[{"message":{"content":"ok"}}]}"#).unwrap();

        let result = response.into_result("Baichuan4");
        assert_eq!(result.model, "Baichuan4");
        assert_eq!(result.usage, Usage::default());
    }

    #[test]
    fn insufficient_quota_overrides_429() {
        let body = r#"{"error":{"message":"You exceeded your current quota","type":"insufficient_quota","code":"insufficient_quota"}}"#;
        let vendor = classify_error(StatusCode::TOO_MANY_REQUESTS, body);

        assert_eq!(vendor.kind, ErrorKind::QuotaExceeded);
        assert_eq!(vendor.code.as_deref(), Some("insufficient_quota"));
        assert_eq!(vendor.message.as_deref(), Some("You exceeded your current quota"));
    }

    #[test]
    fn plain_statuses_keep_the_baseline() {
        let body = r#"{"error":{"message":"Incorrect API key provided","type":"invalid_request_error","code":null}}"#;
        assert_eq!(classify_error(StatusCode::UNAUTHORIZED, body).kind, ErrorKind::Unauthorized);

        assert_eq!(
            classify_error(StatusCode::SERVICE_UNAVAILABLE, "<html>busy</html>").kind,
            ErrorKind::UpstreamUnavailable
        );
    }

    #[test]
    fn decoder_holds_finish_reason_and_usage_until_done() {
        let mut decoder = OpenAiDecoder::default();

        let events = decoder
            .decode("message", r#"{"choices":[{"index":0,"delta":{"role":"assistant","content":""}}]}"#)
            .unwrap();
        assert!(events.is_empty());

        let events = decoder
            .decode("message", r#"{"choices":[{"index":0,"delta":{"content":"he"}}]}"#)
            .unwrap();
        assert_eq!(events, vec![StreamEvent::delta("he")]);

        let events = decoder
            .decode("message", r#"{"choices":[{"index":0,"delta":{},"finish_reason":"stop"}]}"#)
            .unwrap();
        assert!(events.is_empty());

        let events = decoder
            .decode("message", r#"{"choices":[],"usage":{"prompt_tokens":3,"completion_tokens":2,"total_tokens":5}}"#)
            .unwrap();
        assert!(events.is_empty());

        assert_eq!(
            decoder.finish(),
            StreamEvent::Done {
                finish_reason: Some("stop".to_string()),
                usage: Some(Usage::new(3, 2, Some(5))),
            }
        );
    }

    #[test]
    fn decoder_surfaces_in_band_errors() {
        let mut decoder = OpenAiDecoder::default();
        let events = decoder
            .decode("message", r#"{"error":{"message":"overloaded","type":"server_error"}}"#)
            .unwrap();

        assert_eq!(events, vec![StreamEvent::error(ErrorKind::ApiCallFailed, "overloaded")]);
    }

    #[test]
    fn decoder_rejects_malformed_json() {
        let mut decoder = OpenAiDecoder::default();
        assert!(decoder.decode("message", "{not json").is_err());
    }
}
