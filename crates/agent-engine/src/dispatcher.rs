//! Tool dispatcher - runs the tool calls of one turn
//!
//! A dispatch never fails: unknown tools and tool errors come back as text
//! so the next model turn can see what went wrong.

use std::sync::Arc;

use anyhow::{anyhow, Context};
use futures::future::join_all;
use serde_json::Value;
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::tool::{ContentSegment, ToolCall, ToolFn, ToolRegistry, ToolResponse};

/// Executes tool calls against a registry
#[derive(Debug)]
pub struct ToolDispatcher {
    registry: ToolRegistry,
    workers: Arc<Semaphore>,
}

impl ToolDispatcher {
    /// Create a dispatcher running at most `max_workers` blocking tools at once
    pub fn new(registry: ToolRegistry, max_workers: usize) -> Self {
        Self {
            registry,
            workers: Arc::new(Semaphore::new(max_workers.max(1))),
        }
    }

    /// Run one tool call and return its textual result
    pub async fn dispatch(&self, call: &ToolCall) -> String {
        debug!("Executing tool: {} args={:?}", call.name, call.args);

        if let Some(tool) = self.registry.local(&call.name) {
            return match self.run_local(call, tool).await {
                Ok(result) => result,
                Err(e) => format!("Error executing {}: {}", call.name, e),
            };
        }

        if let Some(session) = self.registry.remote(&call.name) {
            return match session.call_tool(&call.name, call.args.clone()).await {
                Ok(segments) => render_segments(&segments),
                Err(e) => format!("Error executing MCP tool {}: {}", call.name, e),
            };
        }

        warn!("Unknown tool call: {}", call.name);
        format!("Error: Tool {} not found.", call.name)
    }

    async fn run_local(&self, call: &ToolCall, tool: ToolFn) -> anyhow::Result<String> {
        let permit = Arc::clone(&self.workers)
            .acquire_owned()
            .await
            .context("tool worker pool is closed")?;
        let args = call.args.clone();

        let value = tokio::task::spawn_blocking(move || {
            let _permit = permit;
            tool(&args)
        })
        .await
        .map_err(|e| anyhow!("{}", e))??;

        Ok(render_value(value))
    }

    /// Run every call concurrently; results keep the request order
    pub async fn dispatch_all(&self, calls: &[ToolCall]) -> Vec<ToolResponse> {
        join_all(calls.iter().map(|call| async move {
            ToolResponse {
                name: call.name.clone(),
                result: self.dispatch(call).await,
            }
        }))
        .await
    }

    /// Human-readable progress note for one call
    pub fn describe(call: &ToolCall) -> String {
        let arg = |key: &str| call.arg_str(key).unwrap_or("None").to_string();
        match call.name.as_str() {
            "read_file" => format!("Reading file '{}'", arg("filepath")),
            "list_files" => format!("Listing directory '{}'", arg("directory")),
            "get_file_history" => format!("Getting history for '{}'", arg("filepath")),
            "get_recent_commits" => "Getting recent commits".to_string(),
            "get_file_outline" => format!("Outlining '{}'", arg("filepath")),
            "read_android_manifest" => "Reading Android Manifest".to_string(),
            other => format!("Running {}", other),
        }
    }

    /// Status line announcing a turn's tool calls
    pub fn status_line(calls: &[ToolCall]) -> String {
        let descriptions: Vec<String> = calls.iter().map(Self::describe).collect();
        format!("{}...", descriptions.join(", "))
    }
}

fn render_value(value: Value) -> String {
    match value {
        Value::String(text) => text,
        other => other.to_string(),
    }
}

fn render_segments(segments: &[ContentSegment]) -> String {
    segments
        .iter()
        .map(ContentSegment::render)
        .collect::<Vec<_>>()
        .join("\n")
}
