//! Chat history records
//!
//! A `ChatMessage` is one persisted entry of the conversation. Agent runs
//! only ever write a single `Model` message when they finish; user messages
//! are written by whoever starts the run.

use std::fmt;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Message role in a chat
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Model,
    System,
}

impl MessageRole {
    /// Get the canonical string representation
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Model => "model",
            Self::System => "system",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A persisted chat message
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// Unique message ID
    pub id: String,

    /// Role of the message sender
    pub role: MessageRole,

    /// Message content
    pub content: String,

    /// Timestamp in milliseconds
    pub timestamp: i64,
}

impl ChatMessage {
    /// Create a new message stamped with the current time
    pub fn new(role: MessageRole, content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role,
            content: content.into(),
            timestamp: Utc::now().timestamp_millis(),
        }
    }

    /// Create a new user message
    pub fn user(content: impl Into<String>) -> Self {
        Self::new(MessageRole::User, content)
    }

    /// Create a new model message
    pub fn model(content: impl Into<String>) -> Self {
        Self::new(MessageRole::Model, content)
    }
}

/// One page of history, newest first
#[derive(Debug, Clone, Serialize)]
pub struct HistoryPage {
    pub messages: Vec<ChatMessage>,
    pub total: usize,
}

impl HistoryPage {
    /// Slice `messages` (oldest first) into a newest-first page
    pub fn from_messages(messages: &[ChatMessage], limit: usize, offset: usize) -> Self {
        let total = messages.len();
        let page = messages.iter().rev().skip(offset).take(limit).cloned().collect();
        Self {
            messages: page,
            total,
        }
    }
}
