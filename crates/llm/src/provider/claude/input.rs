use serde::Serialize;

use crate::{
    messages::{ChatRequest, Role},
    provider::passthrough_extras,
};

const FIELDS: &[&str] = &[
    "model",
    "messages",
    "system",
    "max_tokens",
    "temperature",
    "top_p",
    "stop_sequences",
    "stream",
];

/// Request body of the Anthropic Messages API.
///
/// System messages move to the top-level `system` field, `stop` becomes
/// `stop_sequences`, and the penalties the API does not accept are dropped.
#[derive(Debug, Serialize)]
pub(super) struct ClaudeRequest {
    pub model: String,

    pub messages: Vec<ClaudeMessage>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,

    /// Required by the API.
    pub max_tokens: u32,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop_sequences: Option<Vec<String>>,

    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub stream: bool,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

#[derive(Debug, Serialize)]
pub(super) struct ClaudeMessage {
    /// `user` or `assistant`.
    pub role: Role,
    pub content: String,
}

impl ClaudeRequest {
    pub fn new(request: ChatRequest, default_max_tokens: u32) -> Self {
        let mut system = Vec::new();
        let mut messages = Vec::with_capacity(request.messages.len());

        for message in request.messages {
            match message.role {
                Role::System => system.push(message.content),
                role => messages.push(ClaudeMessage {
                    role,
                    content: message.content,
                }),
            }
        }

        Self {
            model: request.model,
            messages,
            system: (!system.is_empty()).then(|| system.join("\n\n")),
            max_tokens: request.max_tokens.unwrap_or(default_max_tokens),
            temperature: request.temperature,
            top_p: request.top_p,
            stop_sequences: request.stop.filter(|stop| !stop.is_empty()),
            stream: false,
            extra: passthrough_extras(request.extra, FIELDS),
        }
    }
}

#[cfg(test)]
mod tests {
    use insta::assert_json_snapshot;

    use super::*;
    use crate::messages::Message;

    #[test]
    fn injects_max_tokens_and_lifts_system() {
        let mut request = ChatRequest::new(
            "claude-3-5-haiku-20241022",
            vec![Message::system("be brief"), Message::user("hi")],
        );

        request.stop = Some(vec!["END".to_string()]);
        request.presence_penalty = Some(0.5);

        assert_json_snapshot!(ClaudeRequest::new(request, 4096), @r#"
        {
          "model": "claude-3-5-haiku-20241022",
          "messages": [
            {
              "role": "user",
              "content": "hi"
            }
          ],
          "system": "be brief",
          "max_tokens": 4096,
          "stop_sequences": [
            "END"
          ]
        }
        "#);
    }

    #[test]
    fn explicit_max_tokens_wins() {
        let mut request = ChatRequest::new("claude-3-opus-20240229", vec![Message::user("hi")]);
        request.max_tokens = Some(10);

        let request = ClaudeRequest::new(request, 4096);
        assert_eq!(request.max_tokens, 10);
        assert_eq!(request.system, None);
    }

    #[test]
    fn extras_keep_vendor_fields_only() {
        let mut request = ChatRequest::new("claude-3-5-haiku-20241022", vec![Message::user("hi")]);

        request
            .extra
            .insert("max_tokens".to_string(), serde_json::json!(1));
        request
            .extra
            .insert("top_k".to_string(), serde_json::json!(5));

        assert_json_snapshot!(ClaudeRequest::new(request, 4096), @r#"
        {
          "model": "claude-3-5-haiku-20241022",
          "messages": [
            {
              "role": "user",
              "content": "hi"
            }
          ],
          "max_tokens": 4096,
          "top_k": 5
        }
        "#);
    }
}
