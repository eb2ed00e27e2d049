use serde::Serialize;

use crate::{
    messages::{ChatRequest, Message},
    provider::passthrough_extras,
};

const FIELDS: &[&str] = &[
    "model",
    "messages",
    "temperature",
    "max_tokens",
    "top_p",
    "frequency_penalty",
    "presence_penalty",
    "stop",
    "stream",
    "stream_options",
];

/// Request body of the Chat Completions API, shared by every OpenAI-compatible upstream.
///
/// Unset sampling parameters are omitted, never sent as zero values.
#[derive(Debug, Serialize)]
pub(super) struct OpenAiRequest {
    pub(super) model: String,

    pub(super) messages: Vec<Message>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) top_p: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) frequency_penalty: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) presence_penalty: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) stop: Option<Vec<String>>,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub(super) stream: bool,

    /// Asks for a final usage chunk on streams.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub(super) stream_options: Option<StreamOptions>,

    #[serde(flatten)]
    pub(super) extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub(super) struct StreamOptions {
    pub(super) include_usage: bool,
}

impl From<ChatRequest> for OpenAiRequest {
    fn from(request: ChatRequest) -> Self {
        let ChatRequest {
            model,
            messages,
            temperature,
            max_tokens,
            top_p,
            frequency_penalty,
            presence_penalty,
            stop,
            stream: _,
            extra,
        } = request;

        Self {
            model,
            messages,
            temperature,
            max_tokens,
            top_p,
            frequency_penalty,
            presence_penalty,
            stop: stop.filter(|stop| !stop.is_empty()),
            stream: false,
            stream_options: None,
            extra: passthrough_extras(extra, FIELDS),
        }
    }
}
