//! OpenAI-style streamed chat completions: `eventsource-stream` does the
//! `text/event-stream` framing, this module decodes each event's payload.

use eventsource_stream::{EventStreamError, Eventsource};
use futures::stream::{Stream, StreamExt};
use hotelrag_core::ModelError;
use serde::Deserialize;

#[derive(Debug, Clone, PartialEq)]
pub enum SseFrame {
    Fragment(String),
    Done,
}

#[derive(Deserialize)]
struct ChunkPayload {
    #[serde(default)]
    choices: Vec<ChunkChoice>,
}

#[derive(Deserialize)]
struct ChunkChoice {
    #[serde(default)]
    delta: ChunkDelta,
}

#[derive(Deserialize, Default)]
struct ChunkDelta {
    #[serde(default)]
    content: Option<String>,
}

/// Decode one event's `data` field. Empty deltas (role-only chunks) yield nothing.
pub fn decode_data(data: &str) -> Result<Option<SseFrame>, ModelError> {
    let data = data.trim();
    if data.is_empty() {
        return Ok(None);
    }
    if data == "[DONE]" {
        return Ok(Some(SseFrame::Done));
    }
    let payload: ChunkPayload =
        serde_json::from_str(data).map_err(|e| ModelError::Decode(format!("stream chunk: {e}")))?;
    let text: String = payload.choices.into_iter().filter_map(|c| c.delta.content).collect();
    Ok((!text.is_empty()).then_some(SseFrame::Fragment(text)))
}

/// Frames decoded from a raw byte stream; `transport` maps the body's own errors.
pub fn frames<S, B, E>(bytes: S, transport: fn(E) -> ModelError) -> impl Stream<Item = Result<SseFrame, ModelError>> + Send
where
    S: Stream<Item = Result<B, E>> + Send + 'static,
    B: AsRef<[u8]> + Send + 'static,
    E: Send + 'static,
{
    bytes.eventsource().filter_map(move |event| {
        let frame = match event {
            Ok(event) => decode_data(&event.data).transpose(),
            Err(EventStreamError::Transport(e)) => Some(Err(transport(e))),
            Err(EventStreamError::Utf8(e)) => Some(Err(ModelError::Decode(format!("stream is not utf-8: {e}")))),
            Err(EventStreamError::Parser(e)) => Some(Err(ModelError::Decode(format!("malformed event stream: {e}")))),
        };
        futures::future::ready(frame)
    })
}
