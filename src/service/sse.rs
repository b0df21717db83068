//! Event-stream framing for progress streams.
//!
//! Each event becomes `event: <name>\ndata: <json>\n\n`. Names are
//! `progress` for intermediate events, `complete` for the successful
//! terminal event and `error` for a failure.

use futures::Stream;
use serde::Serialize;
use tracing::error;

use crate::report::PipelineEvent;

/// Content type of a framed stream.
pub const CONTENT_TYPE: &str = "text/event-stream";
/// Framed streams must never be cached.
pub const CACHE_CONTROL: &str = "no-cache";

pub const EVENT_PROGRESS: &str = "progress";
pub const EVENT_COMPLETE: &str = "complete";
pub const EVENT_ERROR: &str = "error";

/// Frame name for `event`.
pub fn event_name(event: &PipelineEvent) -> &'static str {
    match event {
        PipelineEvent::Progress(p) if p.is_terminal() => EVENT_COMPLETE,
        PipelineEvent::Progress(_) => EVENT_PROGRESS,
        PipelineEvent::Failed(_) => EVENT_ERROR,
    }
}

/// Encode one event. The payload is the bare progress event or failure.
pub fn encode_event(event: &PipelineEvent) -> Result<String, serde_json::Error> {
    let data = match event {
        PipelineEvent::Progress(p) => serde_json::to_string(p)?,
        PipelineEvent::Failed(f) => serde_json::to_string(f)?,
    };
    Ok(frame(event_name(event), &data))
}

/// Encode an arbitrary payload under `name`.
pub fn encode_frame<T: Serialize>(name: &str, payload: &T) -> Result<String, serde_json::Error> {
    Ok(frame(name, &serde_json::to_string(payload)?))
}

fn frame(name: &str, data: &str) -> String {
    format!("event: {}\ndata: {}\n\n", name, data)
}

/// Frame every event of `events`, in order.
///
/// An event that cannot be serialized is replaced by an `error` frame so the
/// consumer still sees the stream end.
pub fn encode_stream<S>(events: S) -> impl Stream<Item = String>
where
    S: Stream<Item = PipelineEvent> + Unpin,
{
    async_stream::stream! {
        let mut events = events;
        while let Some(event) = futures::StreamExt::next(&mut events).await {
            match encode_event(&event) {
                Ok(framed) => yield framed,
                Err(e) => {
                    error!(error = %e, "Failed to serialize progress event");
                    let payload = serde_json::json!({
                        "code": "serialization_error",
                        "message": e.to_string(),
                    });
                    yield frame(EVENT_ERROR, &payload.to_string());
                    break;
                }
            }
        }
    }
}
