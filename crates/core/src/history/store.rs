//! Chat history store trait
//!
//! Defines the interface the engine persists finished runs through.

use async_trait::async_trait;
use tokio::sync::RwLock;

use super::model::{ChatMessage, MessageRole};
use crate::Result;

/// Storage interface for chat history
#[async_trait]
pub trait HistoryStore: Send + Sync {
    /// Append a message with the given role
    async fn save(&self, role: MessageRole, text: &str) -> Result<ChatMessage>;

    /// Load the whole history, oldest first
    async fn load(&self) -> Result<Vec<ChatMessage>>;
}

/// In-memory history store
#[derive(Debug, Default)]
pub struct MemoryHistoryStore {
    messages: RwLock<Vec<ChatMessage>>,
}

impl MemoryHistoryStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored messages
    pub async fn len(&self) -> usize {
        self.messages.read().await.len()
    }

    /// Whether nothing has been stored yet
    pub async fn is_empty(&self) -> bool {
        self.messages.read().await.is_empty()
    }
}

#[async_trait]
impl HistoryStore for MemoryHistoryStore {
    async fn save(&self, role: MessageRole, text: &str) -> Result<ChatMessage> {
        let message = ChatMessage::new(role, text);
        self.messages.write().await.push(message.clone());
        Ok(message)
    }

    async fn load(&self) -> Result<Vec<ChatMessage>> {
        Ok(self.messages.read().await.clone())
    }
}
