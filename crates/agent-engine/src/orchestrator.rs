//! Orchestrator - the turn loop of one run
//!
//! Alternates model turns with tool fan-out until the model answers without
//! requesting tools or the turn cap is reached, then broadcasts the summary
//! and writes the run to history once. Cancellation is honoured only while
//! turns are running; once finalizing starts the run completes. Every exit
//! path releases the run's registry slot and closes the event stream.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use agent_core::history::{HistoryStore, MessageRole};

use crate::bus::RunState;
use crate::dispatcher::ToolDispatcher;
use crate::error::{EngineError, Result};
use crate::event::RunEvent;
use crate::provider::TurnInput;
use crate::run::Run;
use crate::turn::TurnDriver;

/// Error text broadcast when a run is cancelled
pub const CANCELLED_MESSAGE: &str = "Task was cancelled by user.";

/// How a run ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// `done` was broadcast
    Completed,
    /// An `error` event with this text was broadcast
    Failed(String),
    /// The run was cancelled
    Cancelled,
}

/// Drives one run from its first turn to its terminal event
pub struct Orchestrator {
    state: Arc<RunState>,
    driver: TurnDriver,
    dispatcher: Arc<ToolDispatcher>,
    history: Arc<dyn HistoryStore>,
    max_turns: u32,
}

impl Orchestrator {
    pub fn new(
        state: Arc<RunState>,
        driver: TurnDriver,
        dispatcher: Arc<ToolDispatcher>,
        history: Arc<dyn HistoryStore>,
        max_turns: u32,
    ) -> Self {
        Self {
            state,
            driver,
            dispatcher,
            history,
            max_turns: max_turns.max(1),
        }
    }

    /// Run to completion.
    ///
    /// `on_exit` runs after the terminal event and before the stream closes.
    pub async fn run(mut self, input: TurnInput, on_exit: impl FnOnce() + Send) -> RunOutcome {
        let state = Arc::clone(&self.state);
        let cancel = state.cancel_token().clone();
        let run_id = state.run_id();
        info!("Run {} started", run_id);

        let turns = tokio::select! {
            biased;
            _ = cancel.cancelled() => Err(EngineError::Cancelled),
            result = self.drive(input) => result,
        };

        let result = match turns {
            Ok(run) if state.begin_finalizing() => self.finalize(run).await,
            Ok(_) => Err(EngineError::Cancelled),
            Err(e) => Err(e),
        };

        let outcome = match result {
            Ok(()) => {
                info!("Run {} completed", run_id);
                RunOutcome::Completed
            }
            Err(EngineError::Cancelled) => {
                info!("Run {} cancelled", run_id);
                state.broadcast(RunEvent::error(CANCELLED_MESSAGE));
                RunOutcome::Cancelled
            }
            Err(e) => {
                error!("Run {} failed: {}", run_id, e);
                let message = e.user_message();
                state.broadcast(RunEvent::error(message.clone()));
                RunOutcome::Failed(message)
            }
        };

        on_exit();
        state.close();
        outcome
    }

    async fn drive(&mut self, mut input: TurnInput) -> Result<Run> {
        let mut run = Run::new();
        let mut answered = false;

        while run.turns < self.max_turns {
            run.turns += 1;
            debug!("Run {} turn {}", self.state.run_id(), run.turns);

            let output = self.driver.run_turn(input, &self.state).await?;
            if output.tool_calls.is_empty() {
                run.finish_with_answer(&output.text);
                answered = true;
                break;
            }

            run.record_turn_text(&output.text);
            for call in &output.tool_calls {
                run.record_tool_use(&call.name);
            }
            self.state.broadcast(RunEvent::tool_status(ToolDispatcher::status_line(
                &output.tool_calls,
            )));

            let results = self.dispatcher.dispatch_all(&output.tool_calls).await;
            input = TurnInput::ToolResults(results);
        }

        if !answered {
            warn!(
                "Run {} stopped after {} turns without a final answer",
                self.state.run_id(),
                self.max_turns
            );
        }
        Ok(run)
    }

    async fn finalize(&self, run: Run) -> Result<()> {
        let summary = run.summary_markdown();
        if let Some(summary) = &summary {
            self.state.broadcast(RunEvent::message(summary.clone()));
        }
        if let Some(text) = run.history_text(summary.as_deref()) {
            self.history.save(MessageRole::Model, &text).await?;
        }

        self.state.broadcast(RunEvent::Done);
        Ok(())
    }
}
