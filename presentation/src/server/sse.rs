//! OpenAI-compatible response bodies and the streaming adapter.
//!
//! Streaming responses are Server-Sent Events: one `chat.completion.chunk`
//! per text token, a finish chunk, then `data: [DONE]`. A failure mid-stream
//! becomes a single `{"error": ...}` frame followed by `[DONE]`.

use axum::response::sse::{Event, KeepAlive, Sse};
use futures::stream::{self, Stream, StreamExt};
use relay_domain::{Completion, FinishReason};
use relay_infrastructure::{CallEvent, RelayCall, RelayError};
use serde_json::{Value, json};
use std::convert::Infallible;
use tracing::{debug, warn};

pub const DONE_FRAME: &str = "[DONE]";

pub fn completion_id(request_id: &str) -> String {
    format!("chatcmpl-{request_id}")
}

pub fn content_chunk(id: &str, model: &str, created: i64, content: &str) -> Value {
    json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": model,
        "choices": [{"index": 0, "delta": {"content": content}, "finish_reason": null}],
    })
}

pub fn finish_chunk(id: &str, model: &str, created: i64, reason: &FinishReason) -> Value {
    json!({
        "id": id,
        "object": "chat.completion.chunk",
        "created": created,
        "model": model,
        "choices": [{"index": 0, "delta": {}, "finish_reason": reason.as_str()}],
    })
}

pub fn error_chunk(error: &RelayError) -> Value {
    json!({"error": {"type": error.kind(), "message": error.to_string()}})
}

pub fn aggregated_response(id: &str, model: &str, created: i64, completion: &Completion) -> Value {
    json!({
        "id": id,
        "object": "chat.completion",
        "created": created,
        "model": model,
        "choices": [{
            "index": 0,
            "message": {"role": "assistant", "content": completion.content},
            "finish_reason": completion.finish_reason.as_str(),
        }],
        "usage": {"prompt_tokens": 0, "completion_tokens": 0, "total_tokens": 0},
    })
}

struct StreamState {
    call: RelayCall,
    id: String,
    model: String,
    created: i64,
}

/// Turn a relay call into the SSE frames sent to the client.
///
/// Dropping the stream (client gone) drops the call and frees its slot.
pub fn event_stream(call: RelayCall, created: i64) -> impl Stream<Item = Event> + Send {
    let state = StreamState {
        id: completion_id(call.id()),
        model: call.model().to_string(),
        created,
        call,
    };

    stream::unfold(Some(state), |state| async move {
        let mut state = state?;
        let frames = match state.call.next_event().await {
            Ok(Some(CallEvent::Text(text))) => {
                let chunk = content_chunk(&state.id, &state.model, state.created, &text);
                return Some((vec![data(&chunk)], Some(state)));
            }
            Ok(Some(CallEvent::Restarted { attempt })) => {
                debug!(request_id = %state.call.id(), attempt, "Stream resumed after challenge");
                return Some((Vec::new(), Some(state)));
            }
            Ok(Some(CallEvent::Finished(reason))) => {
                let reason = reason.unwrap_or_default();
                let chunk = finish_chunk(&state.id, &state.model, state.created, &reason);
                vec![data(&chunk), Event::default().data(DONE_FRAME)]
            }
            Ok(None) => vec![Event::default().data(DONE_FRAME)],
            Err(e) => {
                warn!(request_id = %state.call.id(), "Stream failed: {e}");
                vec![data(&error_chunk(&e)), Event::default().data(DONE_FRAME)]
            }
        };
        Some((frames, None))
    })
    .flat_map(stream::iter)
}

fn data(value: &Value) -> Event {
    Event::default().data(value.to_string())
}

/// SSE response for a streaming chat completion.
pub fn sse_response(
    call: RelayCall,
    created: i64,
) -> Sse<impl Stream<Item = Result<Event, Infallible>> + Send> {
    Sse::new(event_stream(call, created).map(Ok)).keep_alive(KeepAlive::default())
}
