//! Server-sent event decoding shared by the adapters.
//!
//! The transport is framed by `eventsource-stream`; each adapter supplies a
//! [`StreamDecoder`] that turns one `data:` payload into uniform events.

use std::fmt;

use config::ProviderKind;
use eventsource_stream::{EventStreamError, Eventsource};
use futures::{Stream, StreamExt};

use crate::{error::ErrorKind, messages::StreamEvent, provider::EventStream};

const DONE_MARKER: &str = "[DONE]";

/// Turns vendor payloads into stream events.
pub(crate) trait StreamDecoder: Send + 'static {
    /// Decode one trimmed, non-empty `data:` payload. `event` is the SSE event name, or
    /// `message` when the upstream sent none.
    ///
    /// A terminal event in the returned list ends the stream; events after it are dropped.
    fn decode(&mut self, event: &str, data: &str) -> Result<Vec<StreamEvent>, String>;

    /// The terminal event emitted on the literal `[DONE]` marker.
    fn finish(&mut self) -> StreamEvent {
        StreamEvent::Done {
            finish_reason: None,
            usage: None,
        }
    }
}

/// Decode the SSE body of a streaming response.
///
/// The returned stream ends after the first terminal event. Decoding failures end it with
/// `invalid_response`, transport failures with `stream_closed`. A body that closes
/// without any terminal simply ends; the dispatcher completes it.
pub(crate) fn decode<D: StreamDecoder>(response: reqwest::Response, provider: ProviderKind, decoder: D) -> EventStream {
    decode_bytes(response.bytes_stream(), provider, decoder)
}

fn decode_bytes<S, B, E, D>(body: S, provider: ProviderKind, mut decoder: D) -> EventStream
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: fmt::Display + Send + 'static,
    D: StreamDecoder,
{
    let mut events = Box::pin(body.eventsource());

    let stream = async_stream::stream! {
        while let Some(event) = events.next().await {
            let event = match event {
                Ok(event) => event,
                Err(EventStreamError::Transport(e)) => {
                    log::warn!("{provider} event stream failed: {e}");
                    yield StreamEvent::error(ErrorKind::StreamClosed, format!("{provider} event stream failed: {e}"));
                    return;
                }
                Err(e) => {
                    log::warn!("Malformed {provider} event stream: {e}");
                    yield StreamEvent::error(ErrorKind::InvalidResponse, format!("malformed {provider} event stream: {e}"));
                    return;
                }
            };

            let data = event.data.trim();

            if data.is_empty() {
                continue;
            }

            if data == DONE_MARKER {
                yield decoder.finish();
                return;
            }

            match decoder.decode(&event.event, data) {
                Ok(decoded) => {
                    for event in decoded {
                        let terminal = event.is_terminal();
                        yield event;

                        if terminal {
                            return;
                        }
                    }
                }
                Err(message) => {
                    log::warn!("Failed to decode {provider} stream event: {message}");
                    log::warn!("Raw event data that failed to parse: {data}");

                    yield StreamEvent::error(
                        ErrorKind::InvalidResponse,
                        format!("failed to decode a {provider} stream event: {message}"),
                    );
                    return;
                }
            }
        }
    };

    Box::pin(stream)
}
