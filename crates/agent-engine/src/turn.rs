//! Turn driver - one round trip with the model
//!
//! Opens the reply stream (retrying transient provider failures), forwards
//! narrative fragments to observers as they arrive, and collects the tool
//! calls the model asks for.

use std::time::Duration;

use backon::{BackoffBuilder, ExponentialBuilder};
use futures::StreamExt;
use tracing::{debug, warn};

use crate::bus::RunState;
use crate::error::{extract_error_message, ProviderError};
use crate::event::RunEvent;
use crate::provider::{ChatSession, ChunkStream, TurnInput};
use crate::tool::ToolCall;

/// Bounded exponential backoff for opening model streams
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Retries after the first attempt
    pub max_retries: u32,
    /// Delay before the first retry
    pub initial_backoff: Duration,
}

/// Longest single wait between attempts
const MAX_BACKOFF: Duration = Duration::from_secs(60);

impl RetryPolicy {
    /// Doubling backoff: `initial_backoff`, then x2 per retry, at most `max_retries` delays
    pub fn backoff(&self) -> ExponentialBuilder {
        ExponentialBuilder::default()
            .with_min_delay(self.initial_backoff)
            .with_max_delay(MAX_BACKOFF.max(self.initial_backoff))
            .with_factor(2.0)
            .with_max_times(self.max_retries as usize)
    }
}

/// Everything one turn produced
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TurnOutput {
    /// Concatenated narrative text
    pub text: String,
    /// Tool calls in the order the model issued them
    pub tool_calls: Vec<ToolCall>,
}

/// Drives model turns for a run
pub struct TurnDriver {
    session: Box<dyn ChatSession>,
    retry: RetryPolicy,
}

impl TurnDriver {
    /// Bind a chat session
    pub fn new(session: Box<dyn ChatSession>, retry: RetryPolicy) -> Self {
        Self { session, retry }
    }

    /// Run one turn, broadcasting text fragments as they stream in
    pub async fn run_turn(
        &mut self,
        input: TurnInput,
        state: &RunState,
    ) -> Result<TurnOutput, ProviderError> {
        let mut stream = self.open_stream(input, state).await?;
        let mut output = TurnOutput::default();

        while let Some(chunk) = stream.next().await {
            let chunk = chunk?;
            if let Some(text) = chunk.text.filter(|t| !t.is_empty()) {
                output.text.push_str(&text);
                state.broadcast(RunEvent::Message(text));
            }
            output.tool_calls.extend(chunk.tool_calls);
        }

        debug!(
            "Turn finished with {} chars of text and {} tool calls",
            output.text.len(),
            output.tool_calls.len()
        );
        Ok(output)
    }

    async fn open_stream(
        &mut self,
        input: TurnInput,
        state: &RunState,
    ) -> Result<ChunkStream, ProviderError> {
        let mut delays = self.retry.backoff().build();
        let mut attempt = 0;
        loop {
            let err = match self.session.send(input.clone()).await {
                Ok(stream) => return Ok(stream),
                Err(e) => e,
            };
            if !err.is_transient() {
                return Err(err);
            }
            match delays.next() {
                Some(delay) => {
                    attempt += 1;
                    warn!(
                        "Transient provider error (attempt {}/{}), retrying in {:?}: {}",
                        attempt, self.retry.max_retries, delay, err
                    );
                    state.broadcast(RunEvent::tool_status(format!(
                        "Model unavailable ({}). Retrying in {:?} (attempt {}/{})...",
                        extract_error_message(&err.to_string()),
                        delay,
                        attempt,
                        self.retry.max_retries
                    )));
                    tokio::time::sleep(delay).await;
                }
                None => return Err(err),
            }
        }
    }
}
