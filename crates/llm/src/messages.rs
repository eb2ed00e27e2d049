//! The uniform request, result and stream event shapes shared by every adapter.

use std::fmt;

use config::ProviderKind;
use serde::{Deserialize, Serialize};

use crate::error::{ErrorKind, LlmError};

/// Author of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Instructions to the model.
    System,
    /// End user input.
    User,
    /// Model output.
    Assistant,
}

impl Role {
    /// Wire name of the role.
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One message of a conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            name: None,
        }
    }
}

/// A vendor-neutral chat completion request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// Model id as understood by the upstream.
    pub model: String,

    /// The conversation, oldest message first.
    pub messages: Vec<Message>,

    /// Sampling temperature in [0, 2].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    /// Upper bound of generated tokens, at least 1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    /// Nucleus sampling mass in [0, 1].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    /// Frequency penalty in [-2, 2].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frequency_penalty: Option<f32>,

    /// Presence penalty in [-2, 2].
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,

    /// Sequences that stop the generation.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,

    /// Whether the caller asked for a stream. The dispatcher entry point decides the framing.
    #[serde(default)]
    pub stream: bool,

    /// Vendor-specific fields, passed through untouched.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ChatRequest {
    /// A request for the given model with the given conversation.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            ..Default::default()
        }
    }

    /// Check the request shape and the sampling parameter ranges.
    pub fn validate(&self) -> crate::Result<()> {
        if self.model.trim().is_empty() {
            return Err(LlmError::new(ErrorKind::InvalidModel, "a model id is required"));
        }

        if self.messages.is_empty() {
            return Err(LlmError::new(
                ErrorKind::InvalidRequest,
                "at least one message is required",
            ));
        }

        check_range("temperature", self.temperature, 0.0, 2.0)?;
        check_range("top_p", self.top_p, 0.0, 1.0)?;
        check_range("frequency_penalty", self.frequency_penalty, -2.0, 2.0)?;
        check_range("presence_penalty", self.presence_penalty, -2.0, 2.0)?;

        if self.max_tokens == Some(0) {
            return Err(LlmError::new(
                ErrorKind::InvalidParameters,
                "max_tokens must be at least 1",
            ));
        }

        Ok(())
    }
}

fn check_range(name: &str, value: Option<f32>, min: f32, max: f32) -> crate::Result<()> {
    match value {
        Some(value) if !(min..=max).contains(&value) => Err(LlmError::new(
            ErrorKind::InvalidParameters,
            format!("{name} must be between {min} and {max}, got {value}"),
        )),
        _ => Ok(()),
    }
}

/// Token accounting of one call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

impl Usage {
    /// Build usage from vendor counts. The total is never less than prompt plus completion.
    pub fn new(prompt_tokens: u32, completion_tokens: u32, total_tokens: Option<u32>) -> Self {
        let sum = prompt_tokens.saturating_add(completion_tokens);

        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: total_tokens.map_or(sum, |total| total.max(sum)),
        }
    }
}

/// One alternative of a completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Choice {
    pub index: u32,
    pub message: Message,
    /// Vendor termination cause, passed through unchanged.
    pub finish_reason: Option<String>,
}

/// A vendor-neutral completion result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatResult {
    /// Upstream request or response id.
    pub id: String,
    pub model: String,
    pub choices: Vec<Choice>,
    pub usage: Usage,
}

impl ChatResult {
    /// Content of the first choice.
    pub fn text(&self) -> Option<&str> {
        self.choices.first().map(|choice| choice.message.content.as_str())
    }

    /// Wrap a single text answer as the only choice.
    pub(crate) fn single(
        id: String,
        model: String,
        content: String,
        finish_reason: Option<String>,
        usage: Usage,
    ) -> Self {
        Self {
            id,
            model,
            choices: vec![Choice {
                index: 0,
                message: Message::assistant(content),
                finish_reason,
            }],
            usage,
        }
    }
}

/// An event of a streamed completion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// New text for one choice. Carries only the increment.
    Delta {
        index: u32,
        content: String,
        /// Usage reported alongside the increment, if any.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        usage: Option<Usage>,
    },
    /// Successful end of the stream.
    Done {
        finish_reason: Option<String>,
        usage: Option<Usage>,
    },
    /// Failed end of the stream.
    Error { kind: ErrorKind, message: String },
}

impl StreamEvent {
    pub(crate) fn delta(content: impl Into<String>) -> Self {
        StreamEvent::Delta {
            index: 0,
            content: content.into(),
            usage: None,
        }
    }

    pub(crate) fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
        StreamEvent::Error {
            kind,
            message: message.into(),
        }
    }

    /// Whether the event ends the stream.
    pub fn is_terminal(&self) -> bool {
        !matches!(self, StreamEvent::Delta { .. })
    }

    /// Usage carried by the event.
    pub fn usage(&self) -> Option<Usage> {
        match self {
            StreamEvent::Delta { usage, .. } | StreamEvent::Done { usage, .. } => *usage,
            StreamEvent::Error { .. } => None,
        }
    }
}

/// What a model can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Chat,
    Streaming,
    Vision,
    FunctionCalling,
    LongContext,
}

/// Price of one model, per 1,000 tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Pricing {
    pub input: f64,
    pub output: f64,
    pub currency: String,
}

impl Pricing {
    pub fn new(input: f64, output: f64, currency: impl Into<String>) -> Self {
        Self {
            input,
            output,
            currency: currency.into(),
        }
    }
}

impl From<&config::PricingConfig> for Pricing {
    fn from(config: &config::PricingConfig) -> Self {
        Self::new(config.input, config.output, config.currency.clone())
    }
}

/// A model offered by a provider.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelInfo {
    pub id: String,
    pub display_name: String,
    pub provider: ProviderKind,
    pub capabilities: Vec<Capability>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub context_window: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pricing: Option<Pricing>,
}

impl ModelInfo {
    /// A bare entry for a model that no catalog knows about.
    pub(crate) fn bare(provider: ProviderKind, id: impl Into<String>) -> Self {
        let id = id.into();

        Self {
            display_name: id.clone(),
            id,
            provider,
            capabilities: vec![Capability::Chat, Capability::Streaming],
            context_window: None,
            max_output_tokens: None,
            pricing: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_json_snapshot;

    use super::*;

    fn request() -> ChatRequest {
        ChatRequest::new("gpt-4o-mini", vec![Message::user("hi")])
    }

    #[test]
    fn valid_request() {
        request().validate().unwrap();
    }

    #[test]
    fn empty_model_is_invalid_model() {
        let mut request = request();
        request.model = " ".to_string();

        assert_eq!(request.validate().unwrap_err().kind(), ErrorKind::InvalidModel);
    }

    #[test]
    fn no_messages_is_invalid_request() {
        let mut request = request();
        request.messages.clear();

        assert_eq!(request.validate().unwrap_err().kind(), ErrorKind::InvalidRequest);
    }

    #[test]
    fn out_of_range_parameters() {
        let mut request = request();
        request.temperature = Some(2.5);

        let error = request.validate().unwrap_err();
        assert_eq!(error.kind(), ErrorKind::InvalidParameters);
        assert_eq!(error.message(), "temperature must be between 0 and 2, got 2.5");

        let mut request = self::request();
        request.max_tokens = Some(0);
        assert_eq!(request.validate().unwrap_err().kind(), ErrorKind::InvalidParameters);

        let mut request = self::request();
        request.presence_penalty = Some(-2.0);
        request.top_p = Some(1.0);
        request.validate().unwrap();
    }

    #[test]
    fn usage_total_is_never_below_sum() {
        assert_eq!(Usage::new(3, 4, Some(5)).total_tokens, 7);
        assert_eq!(Usage::new(3, 4, Some(10)).total_tokens, 10);
        assert_eq!(Usage::new(3, 4, None).total_tokens, 7);
    }

    #[test]
    fn extras_are_flattened() {
        let request: ChatRequest = serde_json::from_str(
            r#"{"model":"qwen-max","messages":[{"role":"user","content":"hi"}],"enable_search":true}"#,
        )
        .unwrap();

        assert_eq!(request.extra.get("enable_search"), Some(&serde_json::Value::Bool(true)));
        assert!(!request.stream);
    }

    #[test]
    fn stream_events_serialize_tagged() {
        let events = vec![
            StreamEvent::delta("he"),
            StreamEvent::Done {
                finish_reason: Some("stop".to_string()),
                usage: Some(Usage::new(1, 2, None)),
            },
            StreamEvent::error(ErrorKind::StreamClosed, "connection reset"),
        ];

        assert_json_snapshot!(events, @r#"
        [
          {
            "type": "delta",
            "index": 0,
            "content": "he"
          },
          {
            "type": "done",
            "finish_reason": "stop",
            "usage": {
              "prompt_tokens": 1,
              "completion_tokens": 2,
              "total_tokens": 3
            }
          },
          {
            "type": "error",
            "kind": "stream_closed",
            "message": "connection reset"
          }
        ]
        "#);
    }
}
