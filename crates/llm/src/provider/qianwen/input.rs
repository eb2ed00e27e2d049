use serde::Serialize;

use crate::{
    messages::{ChatRequest, Message},
    provider::passthrough_extras,
};

const PARAMETERS: &[&str] = &[
    "temperature",
    "top_p",
    "max_tokens",
    "presence_penalty",
    "stop",
    "incremental_output",
];

/// Request body of the DashScope text generation API.
#[derive(Debug, Serialize)]
pub(super) struct QianwenRequest {
    pub model: String,
    pub input: QianwenInput,
    pub parameters: QianwenParameters,
}

#[derive(Debug, Serialize)]
pub(super) struct QianwenInput {
    pub messages: Vec<Message>,
}

/// Sampling parameters. Vendor-specific extras such as `enable_search` land here too.
#[derive(Debug, Serialize)]
pub(super) struct QianwenParameters {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub presence_penalty: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,

    /// Send each stream event with only the new text instead of the whole answer so far.
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub incremental_output: bool,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl From<ChatRequest> for QianwenRequest {
    fn from(request: ChatRequest) -> Self {
        Self {
            model: request.model,
            input: QianwenInput {
                messages: request.messages,
            },
            parameters: QianwenParameters {
                temperature: request.temperature,
                top_p: request.top_p,
                max_tokens: request.max_tokens,
                presence_penalty: request.presence_penalty,
                stop: request.stop.filter(|stop| !stop.is_empty()),
                incremental_output: false,
                extra: passthrough_extras(request.extra, PARAMETERS),
            },
        }
    }
}
