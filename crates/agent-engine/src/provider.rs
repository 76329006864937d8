//! Model chat session interface
//!
//! The provider client lives outside this crate; the engine only needs a
//! session it can send one turn's input to and read a chunk stream back.

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::ProviderError;
use crate::tool::{ToolCall, ToolResponse};

/// Streamed reply for one turn; the stream ending marks the end of the turn
pub type ChunkStream = BoxStream<'static, Result<ModelChunk, ProviderError>>;

/// One piece of a streamed model reply
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ModelChunk {
    /// Narrative text fragment
    pub text: Option<String>,
    /// Tool calls requested in this chunk
    pub tool_calls: Vec<ToolCall>,
}

impl ModelChunk {
    /// Chunk carrying only text
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            tool_calls: Vec::new(),
        }
    }

    /// Chunk carrying only one tool call
    pub fn tool_call(call: ToolCall) -> Self {
        Self {
            text: None,
            tool_calls: vec![call],
        }
    }
}

/// What gets sent to the model for one turn
#[derive(Debug, Clone, PartialEq)]
pub enum TurnInput {
    /// The user's message
    Text(String),
    /// Results of the tools requested in the previous turn, in request order
    ToolResults(Vec<ToolResponse>),
}

impl From<String> for TurnInput {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for TurnInput {
    fn from(text: &str) -> Self {
        Self::Text(text.to_string())
    }
}

/// A multi-turn conversation with the model provider
#[async_trait]
pub trait ChatSession: Send + Sync {
    /// Send one turn's input and open the streamed reply
    async fn send(&mut self, input: TurnInput) -> Result<ChunkStream, ProviderError>;
}
