//! Vendor wire payloads used by the mocks.

pub mod openai {
    use serde_json::{Value, json};

    pub fn completion(model: &str, text: &str, usage: (u32, u32, u32)) -> Value {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "model": model,
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": text},
                "finish_reason": "stop"
            }],
            "usage": {
                "prompt_tokens": usage.0,
                "completion_tokens": usage.1,
                "total_tokens": usage.2
            }
        })
    }

    pub fn delta(text: &str) -> String {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "choices": [{"index": 0, "delta": {"content": text}, "finish_reason": null}]
        })
        .to_string()
    }

    pub fn finish(reason: &str) -> String {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "choices": [{"index": 0, "delta": {}, "finish_reason": reason}]
        })
        .to_string()
    }

    pub fn usage(prompt: u32, completion: u32) -> String {
        json!({
            "id": "chatcmpl-1",
            "object": "chat.completion.chunk",
            "choices": [],
            "usage": {"prompt_tokens": prompt, "completion_tokens": completion, "total_tokens": prompt + completion}
        })
        .to_string()
    }

    pub fn error(kind: &str, code: &str, message: &str) -> Value {
        json!({"error": {"message": message, "type": kind, "code": code}})
    }

    pub fn models(ids: &[&str]) -> Value {
        json!({
            "object": "list",
            "data": ids.iter().map(|id| json!({"id": id, "object": "model"})).collect::<Vec<_>>()
        })
    }
}

pub mod claude {
    use serde_json::{Value, json};

    pub fn message(model: &str, text: &str, usage: (u32, u32)) -> Value {
        json!({
            "id": "msg_01",
            "type": "message",
            "role": "assistant",
            "model": model,
            "content": [{"type": "text", "text": text}],
            "stop_reason": "end_turn",
            "usage": {"input_tokens": usage.0, "output_tokens": usage.1}
        })
    }

    /// The event sequence of a streamed message.
    pub fn stream(model: &str, chunks: &[&str], usage: (u32, u32)) -> Vec<(&'static str, String)> {
        let mut events = vec![(
            "message_start",
            json!({
                "type": "message_start",
                "message": {"id": "msg_01", "model": model, "usage": {"input_tokens": usage.0, "output_tokens": 0}}
            })
            .to_string(),
        )];

        events.push((
            "content_block_start",
            json!({"type": "content_block_start", "index": 0, "content_block": {"type": "text", "text": ""}}).to_string(),
        ));

        for chunk in chunks {
            events.push((
                "content_block_delta",
                json!({"type": "content_block_delta", "index": 0, "delta": {"type": "text_delta", "text": chunk}})
                    .to_string(),
            ));
        }

        events.push((
            "message_delta",
            json!({"type": "message_delta", "delta": {"stop_reason": "end_turn"}, "usage": {"output_tokens": usage.1}})
                .to_string(),
        ));

        events.push(("message_stop", json!({"type": "message_stop"}).to_string()));

        events
    }

    pub fn error(kind: &str, message: &str) -> Value {
        json!({"type": "error", "error": {"type": kind, "message": message}})
    }
}

pub mod qianwen {
    use serde_json::{Value, json};

    pub fn generation(text: &str, usage: (u32, u32)) -> Value {
        json!({
            "request_id": "req-1",
            "output": {"text": text, "finish_reason": "stop"},
            "usage": {"input_tokens": usage.0, "output_tokens": usage.1, "total_tokens": usage.0 + usage.1}
        })
    }

    pub fn increment(text: &str, finish_reason: Option<&str>, usage: (u32, u32)) -> String {
        json!({
            "request_id": "req-1",
            "output": {"text": text, "finish_reason": finish_reason.unwrap_or("null")},
            "usage": {"input_tokens": usage.0, "output_tokens": usage.1, "total_tokens": usage.0 + usage.1}
        })
        .to_string()
    }

    pub fn error(code: &str, message: &str) -> Value {
        json!({"request_id": "req-1", "code": code, "message": message})
    }
}
