//! Test doubles shared by the engine's unit tests

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde_json::json;

use agent_core::history::{ChatMessage, HistoryStore, MessageRole};

use crate::error::ProviderError;
use crate::provider::{ChatSession, ChunkStream, ModelChunk, TurnInput};
use crate::tool::ToolCall;

/// One scripted reply to `send`
pub enum Step {
    /// Open successfully and yield these items
    Stream(Vec<Result<ModelChunk, ProviderError>>),
    /// Fail to open
    Fail(ProviderError),
    /// Open a stream that never yields
    Hang,
}

impl Step {
    pub fn text(text: &str) -> Self {
        Self::Stream(vec![Ok(ModelChunk::text(text))])
    }

    pub fn chunks(chunks: Vec<ModelChunk>) -> Self {
        Self::Stream(chunks.into_iter().map(Ok).collect())
    }

    pub fn tools(calls: Vec<ToolCall>) -> Self {
        Self::chunks(calls.into_iter().map(ModelChunk::tool_call).collect())
    }
}

/// Inputs a scripted session received, in order
pub type Inputs = Arc<Mutex<Vec<TurnInput>>>;

/// Chat session replaying a fixed script
pub struct ScriptedSession {
    steps: VecDeque<Step>,
    inputs: Inputs,
}

impl ScriptedSession {
    pub fn new(steps: Vec<Step>) -> (Self, Inputs) {
        let inputs = Inputs::default();
        let session = Self {
            steps: steps.into(),
            inputs: Arc::clone(&inputs),
        };
        (session, inputs)
    }
}

#[async_trait]
impl ChatSession for ScriptedSession {
    async fn send(&mut self, input: TurnInput) -> Result<ChunkStream, ProviderError> {
        self.inputs.lock().unwrap().push(input);
        match self.steps.pop_front() {
            Some(Step::Stream(items)) => Ok(stream::iter(items).boxed()),
            Some(Step::Fail(err)) => Err(err),
            Some(Step::Hang) | None => {
                Ok(stream::pending::<Result<ModelChunk, ProviderError>>().boxed())
            }
        }
    }
}

/// Session that requests `list_files` on every turn and never answers
pub struct LoopingSession {
    pub turns: Arc<Mutex<u32>>,
}

#[async_trait]
impl ChatSession for LoopingSession {
    async fn send(&mut self, _input: TurnInput) -> Result<ChunkStream, ProviderError> {
        *self.turns.lock().unwrap() += 1;
        let chunks = vec![
            Ok(ModelChunk::text("Still looking.")),
            Ok(ModelChunk::tool_call(ToolCall::new(
                "list_files",
                json!({"directory": "."}),
            ))),
        ];
        Ok(stream::iter(chunks).boxed())
    }
}

/// History store whose writes run on the blocking pool after a delay
pub struct SlowHistoryStore {
    delay: Duration,
    messages: Arc<Mutex<Vec<ChatMessage>>>,
}

impl SlowHistoryStore {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            messages: Arc::default(),
        }
    }
}

#[async_trait]
impl HistoryStore for SlowHistoryStore {
    async fn save(&self, role: MessageRole, text: &str) -> agent_core::Result<ChatMessage> {
        let delay = self.delay;
        let messages = Arc::clone(&self.messages);
        let message = ChatMessage::new(role, text);
        tokio::task::spawn_blocking(move || {
            std::thread::sleep(delay);
            messages.lock().unwrap().push(message.clone());
            message
        })
        .await
        .map_err(|e| agent_core::Error::Storage(e.to_string()))
    }

    async fn load(&self) -> agent_core::Result<Vec<ChatMessage>> {
        Ok(self.messages.lock().unwrap().clone())
    }
}

/// History store that refuses every write
pub struct FailingHistoryStore;

#[async_trait]
impl HistoryStore for FailingHistoryStore {
    async fn save(&self, _role: MessageRole, _text: &str) -> agent_core::Result<ChatMessage> {
        Err(agent_core::Error::Storage("disk full".into()))
    }

    async fn load(&self) -> agent_core::Result<Vec<ChatMessage>> {
        Ok(Vec::new())
    }
}
