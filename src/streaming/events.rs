//! Outbound stream records and their SSE encoding

use axum::response::sse::Event;
use serde::{Deserialize, Serialize};

/// Event delivered to the client
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum OutboundEvent {
    /// Visible text from the terminal team
    Token {
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        team: Option<String>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        node: Option<String>,
    },
    /// A visible generation finished
    End,
    /// Something failed; never suppressed
    Error { message: String },
}

impl OutboundEvent {
    pub fn error(message: impl Into<String>) -> Self {
        Self::Error {
            message: message.into(),
        }
    }
}

/// One item on a session's channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionFrame {
    Event(OutboundEvent),
    /// Sentinel closing the stream
    Done,
}

/// Data of the frame that closes every stream
pub const DONE_MARKER: &str = "[DONE]";

impl SessionFrame {
    /// SSE data payload: the event's JSON, or the `[DONE]` marker
    pub fn data(&self) -> Result<String, serde_json::Error> {
        match self {
            SessionFrame::Event(event) => serde_json::to_string(event),
            SessionFrame::Done => Ok(DONE_MARKER.to_string()),
        }
    }

    pub fn to_event(&self) -> Result<Event, serde_json::Error> {
        Ok(Event::default().data(self.data()?))
    }
}
