//! Server-sent event framing for run events
//!
//! Payloads are always JSON strings so embedded newlines cannot break the
//! line-oriented framing.

use futures::stream::{self, Stream};
use tracing::debug;

use crate::bus::Listener;
use crate::event::RunEvent;

/// Payload of the `done` frame
pub const DONE_PAYLOAD: &str = "[DONE]";

impl RunEvent {
    /// SSE event name
    pub fn sse_name(&self) -> &'static str {
        match self {
            Self::Message(_) => "message",
            Self::ToolStatus(_) => "tool",
            Self::Error(_) => "error",
            Self::Done => "done",
        }
    }

    /// Render as one SSE frame
    pub fn to_sse_frame(&self) -> String {
        let payload = serde_json::Value::from(self.text().unwrap_or(DONE_PAYLOAD));
        format!("event: {}\ndata: {}\n\n", self.sse_name(), payload)
    }
}

impl Listener {
    /// Stream of SSE frames that ends when the run closes its stream
    pub fn into_sse_stream(self) -> impl Stream<Item = String> + Send + 'static {
        stream::unfold(self, |mut listener| async move {
            match listener.recv().await {
                Some(event) => Some((event.to_sse_frame(), listener)),
                None => {
                    debug!("SSE stream for run {} finished", listener.run_id());
                    None
                }
            }
        })
    }
}
