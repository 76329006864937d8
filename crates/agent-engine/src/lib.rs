//! Agent Engine - background runner for tool-using model conversations
//!
//! A run drives a multi-turn chat with a model provider, executes the tools
//! the model asks for, and broadcasts its progress to any number of
//! observers, who can attach at any time and get the run replayed.

mod bus;
mod config;
mod dispatcher;
mod engine;
mod error;
mod event;
mod orchestrator;
mod provider;
mod run;
mod sse;
pub mod telemetry;
mod tool;
mod turn;

#[cfg(test)]
mod test_support;

pub use bus::{Listener, RunState};
pub use config::{EngineConfig, RunAdmission};
pub use dispatcher::ToolDispatcher;
pub use engine::{Engine, RunRegistry, RunStatus, StartedRun};
pub use error::{extract_error_message, EngineError, ProviderError, Result};
pub use event::RunEvent;
pub use orchestrator::{Orchestrator, RunOutcome, CANCELLED_MESSAGE};
pub use provider::{ChatSession, ChunkStream, ModelChunk, TurnInput};
pub use run::Run;
pub use sse::DONE_PAYLOAD;
pub use tool::{
    ContentSegment, RemoteToolSession, ToolArgs, ToolCall, ToolFn, ToolRegistry, ToolResponse,
};
pub use turn::{RetryPolicy, TurnDriver, TurnOutput};
