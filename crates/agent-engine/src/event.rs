//! Event types for agent runs

use serde::{Deserialize, Serialize};

/// Events broadcast to observers of a run
///
/// End of stream is not an event: listeners see it as their channel closing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum RunEvent {
    /// Narrative text from the model, or the closing run summary
    Message(String),

    /// Progress note about tools being run or retries being waited out
    ToolStatus(String),

    /// The run ended with an error
    Error(String),

    /// The run finished normally
    Done,
}

impl RunEvent {
    /// Create a message event
    pub fn message(text: impl Into<String>) -> Self {
        Self::Message(text.into())
    }

    /// Create a tool status event
    pub fn tool_status(text: impl Into<String>) -> Self {
        Self::ToolStatus(text.into())
    }

    /// Create an error event
    pub fn error(text: impl Into<String>) -> Self {
        Self::Error(text.into())
    }

    /// Check if the event ends the run
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Error(_) | Self::Done)
    }

    /// Text carried by the event, if any
    pub fn text(&self) -> Option<&str> {
        match self {
            Self::Message(text) | Self::ToolStatus(text) | Self::Error(text) => Some(text),
            Self::Done => None,
        }
    }
}
