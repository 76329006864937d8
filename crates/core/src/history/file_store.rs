//! File-based chat history
//!
//! Directory structure:
//! ```text
//! .agent-data/
//!   history/
//!     messages.jsonl   # Chat messages (newline-delimited JSON)
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::model::{ChatMessage, HistoryPage, MessageRole};
use super::store::HistoryStore;
use crate::{Error, Result};

/// Resolve the data directory from `AGENT_DATA_DIR`, defaulting to `.agent-data`
pub fn data_dir_from_env() -> PathBuf {
    std::env::var("AGENT_DATA_DIR")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(".agent-data"))
}

/// History store backed by a JSONL file
#[derive(Debug, Clone)]
pub struct FileHistoryStore {
    base_dir: PathBuf,
}

impl FileHistoryStore {
    /// Create a new history store rooted at `data_dir`
    pub fn new(data_dir: impl AsRef<Path>) -> Self {
        Self {
            base_dir: data_dir.as_ref().join("history"),
        }
    }

    fn messages_path(&self) -> PathBuf {
        self.base_dir.join("messages.jsonl")
    }

    fn ensure_dir(&self) -> Result<()> {
        if !self.base_dir.exists() {
            fs::create_dir_all(&self.base_dir)?;
        }
        Ok(())
    }

    /// Append one message to the log
    pub fn append_message(&self, message: &ChatMessage) -> Result<()> {
        self.ensure_dir()?;
        let path = self.messages_path();

        let file = OpenOptions::new().create(true).append(true).open(&path)?;

        let mut writer = BufWriter::new(file);
        let json = serde_json::to_string(message)?;

        writeln!(writer, "{}", json)?;
        writer.flush()?;

        debug!("Appended {} message {}", message.role, message.id);
        Ok(())
    }

    /// Load all messages, oldest first
    pub fn load_messages(&self) -> Result<Vec<ChatMessage>> {
        let path = self.messages_path();

        if !path.exists() {
            return Ok(Vec::new());
        }

        let file = File::open(&path)?;
        let reader = BufReader::new(file);
        let mut messages = Vec::new();

        for (line_num, line) in reader.lines().enumerate() {
            let line = match line {
                Ok(l) => l,
                Err(e) => {
                    warn!("Failed to read line {} in history file: {}", line_num, e);
                    continue;
                }
            };

            if line.trim().is_empty() {
                continue;
            }

            match serde_json::from_str::<ChatMessage>(&line) {
                Ok(msg) => messages.push(msg),
                Err(e) => {
                    warn!(
                        "Failed to parse message at line {} in {}: {}",
                        line_num,
                        path.display(),
                        e
                    );
                }
            }
        }

        debug!("Loaded {} history messages", messages.len());
        Ok(messages)
    }

    /// Newest-first page of the history
    pub fn page(&self, limit: usize, offset: usize) -> Result<HistoryPage> {
        let messages = self.load_messages()?;
        Ok(HistoryPage::from_messages(&messages, limit, offset))
    }

    /// Drop the whole history
    pub fn reset(&self) -> Result<()> {
        let path = self.messages_path();
        if path.exists() {
            fs::remove_file(&path)?;
            info!("Cleared chat history at {}", path.display());
        }
        Ok(())
    }
}

#[async_trait]
impl HistoryStore for FileHistoryStore {
    async fn save(&self, role: MessageRole, text: &str) -> Result<ChatMessage> {
        let store = self.clone();
        let message = ChatMessage::new(role, text);
        tokio::task::spawn_blocking(move || -> Result<ChatMessage> {
            store.append_message(&message)?;
            Ok(message)
        })
        .await
        .map_err(|e| Error::Storage(format!("History writer failed: {}", e)))?
    }

    async fn load(&self) -> Result<Vec<ChatMessage>> {
        let store = self.clone();
        tokio::task::spawn_blocking(move || store.load_messages())
            .await
            .map_err(|e| Error::Storage(format!("History reader failed: {}", e)))?
    }
}
