//! Tool calls, results, and the registry of tools the model may call

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Argument map of a tool call
pub type ToolArgs = Map<String, Value>;

/// Blocking tool implementation run on the blocking thread pool
pub type ToolFn = Arc<dyn Fn(&ToolArgs) -> anyhow::Result<Value> + Send + Sync>;

/// A tool invocation requested by the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub name: String,
    #[serde(default)]
    pub args: ToolArgs,
}

impl ToolCall {
    /// Create a call; non-object `args` are treated as no arguments
    pub fn new(name: impl Into<String>, args: Value) -> Self {
        let args = match args {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        Self {
            name: name.into(),
            args,
        }
    }

    /// String argument by key
    pub fn arg_str(&self, key: &str) -> Option<&str> {
        self.args.get(key).and_then(Value::as_str)
    }
}

/// Outcome of one tool call, always text
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolResponse {
    pub name: String,
    pub result: String,
}

/// One piece of content returned by a remote tool
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentSegment {
    Text { text: String },
    Image { mime_type: String },
    Audio { mime_type: String },
    Resource { uri: String },
}

impl ContentSegment {
    /// Kind name used in placeholders
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Text { .. } => "text",
            Self::Image { .. } => "image",
            Self::Audio { .. } => "audio",
            Self::Resource { .. } => "resource",
        }
    }

    /// Text form handed back to the model
    pub fn render(&self) -> String {
        match self {
            Self::Text { text } => text.clone(),
            other => format!("[{} content]", other.kind()),
        }
    }
}

/// A session with an external tool server
#[async_trait]
pub trait RemoteToolSession: Send + Sync {
    /// Invoke `name` on the remote side
    async fn call_tool(&self, name: &str, args: ToolArgs) -> anyhow::Result<Vec<ContentSegment>>;
}

/// Tools available to the model, by name
#[derive(Clone, Default)]
pub struct ToolRegistry {
    local: HashMap<String, ToolFn>,
    remote: HashMap<String, Arc<dyn RemoteToolSession>>,
}

impl ToolRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a blocking in-process tool
    pub fn register_local<F>(&mut self, name: impl Into<String>, tool: F) -> &mut Self
    where
        F: Fn(&ToolArgs) -> anyhow::Result<Value> + Send + Sync + 'static,
    {
        self.local.insert(name.into(), Arc::new(tool));
        self
    }

    /// Route `name` to a remote tool session
    pub fn register_remote(
        &mut self,
        name: impl Into<String>,
        session: Arc<dyn RemoteToolSession>,
    ) -> &mut Self {
        self.remote.insert(name.into(), session);
        self
    }

    /// Look up a local tool
    pub fn local(&self, name: &str) -> Option<ToolFn> {
        self.local.get(name).cloned()
    }

    /// Look up the session serving a remote tool
    pub fn remote(&self, name: &str) -> Option<Arc<dyn RemoteToolSession>> {
        self.remote.get(name).cloned()
    }

    /// All registered tool names, sorted
    pub fn tool_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.local.keys().chain(self.remote.keys()).cloned().collect();
        names.sort();
        names.dedup();
        names
    }
}

impl fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut local: Vec<&String> = self.local.keys().collect();
        let mut remote: Vec<&String> = self.remote.keys().collect();
        local.sort();
        remote.sort();
        f.debug_struct("ToolRegistry")
            .field("local", &local)
            .field("remote", &remote)
            .finish()
    }
}
