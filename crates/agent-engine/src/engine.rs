//! Engine - starts runs in the background and tracks the active one
//!
//! At most one run is active per engine. The admission slot decides what a
//! second `start` does, and each run clears the slot on exit only if the slot
//! still points at it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::info;
use uuid::Uuid;

use agent_core::history::HistoryStore;

use crate::bus::{Listener, RunState};
use crate::config::{EngineConfig, RunAdmission};
use crate::dispatcher::ToolDispatcher;
use crate::error::{EngineError, Result};
use crate::orchestrator::{Orchestrator, RunOutcome};
use crate::provider::{ChatSession, TurnInput};
use crate::tool::ToolRegistry;
use crate::turn::TurnDriver;

#[derive(Debug)]
struct ActiveRun {
    id: Uuid,
    state: Arc<RunState>,
}

/// Admission slot holding the active run
#[derive(Debug, Default)]
pub struct RunRegistry {
    slot: Mutex<Option<ActiveRun>>,
}

impl RunRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Option<ActiveRun>> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Claim the slot for `state`.
    ///
    /// Under `Supersede` the previous occupant is returned so the caller can
    /// cancel it; under `Reject` an occupied slot is an error.
    pub fn admit(
        &self,
        state: Arc<RunState>,
        policy: RunAdmission,
    ) -> Result<Option<Arc<RunState>>> {
        let mut slot = self.lock();
        if let (Some(active), RunAdmission::Reject) = (slot.as_ref(), policy) {
            return Err(EngineError::RunActive { run_id: active.id });
        }

        let previous = slot.replace(ActiveRun {
            id: state.run_id(),
            state,
        });
        Ok(previous.map(|run| run.state))
    }

    /// Clear the slot if it still belongs to `run_id`
    pub fn release(&self, run_id: Uuid) -> bool {
        let mut slot = self.lock();
        if slot.as_ref().is_some_and(|run| run.id == run_id) {
            *slot = None;
            return true;
        }
        false
    }

    /// State of the active run
    pub fn active(&self) -> Option<Arc<RunState>> {
        self.lock().as_ref().map(|run| Arc::clone(&run.state))
    }
}

/// Snapshot for status endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct RunStatus {
    pub active: bool,
    pub run_id: Option<Uuid>,
}

/// A run that has been admitted and spawned
#[derive(Debug)]
pub struct StartedRun {
    pub run_id: Uuid,
    /// Listener attached before the first event
    pub listener: Listener,
    /// Resolves when the run has closed its stream
    pub handle: JoinHandle<RunOutcome>,
}

/// Entry point for starting, observing and cancelling runs
pub struct Engine {
    config: EngineConfig,
    registry: Arc<RunRegistry>,
    dispatcher: Arc<ToolDispatcher>,
    history: Arc<dyn HistoryStore>,
}

impl Engine {
    /// Create an engine over a tool registry and a history store
    pub fn new(config: EngineConfig, tools: ToolRegistry, history: Arc<dyn HistoryStore>) -> Self {
        let dispatcher = Arc::new(ToolDispatcher::new(tools, config.tool_workers));
        Self {
            config,
            registry: Arc::new(RunRegistry::new()),
            dispatcher,
            history,
        }
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Admit a new run and spawn its orchestrator.
    ///
    /// Must be called from within a Tokio runtime. Returns as soon as the
    /// run is spawned; the run keeps going if the returned listener is
    /// dropped.
    pub fn start(
        &self,
        session: Box<dyn ChatSession>,
        input: impl Into<TurnInput>,
    ) -> Result<StartedRun> {
        let run_id = Uuid::new_v4();
        let state = Arc::new(RunState::new(run_id));

        if let Some(previous) = self
            .registry
            .admit(Arc::clone(&state), self.config.admission)?
        {
            info!("Run {} supersedes run {}", run_id, previous.run_id());
            previous.cancel();
        }

        let listener = state.attach();
        let orchestrator = Orchestrator::new(
            Arc::clone(&state),
            TurnDriver::new(session, self.config.retry_policy()),
            Arc::clone(&self.dispatcher),
            Arc::clone(&self.history),
            self.config.max_turns,
        );

        let registry = Arc::clone(&self.registry);
        let handle = tokio::spawn(orchestrator.run(input.into(), move || {
            registry.release(run_id);
        }));

        Ok(StartedRun {
            run_id,
            listener,
            handle,
        })
    }

    /// Attach a late or reconnecting observer to the active run
    pub fn attach_to_active_run(&self) -> Option<Listener> {
        self.registry.active().map(|state| state.attach())
    }

    /// Ask the active run to stop.
    ///
    /// Returns `false` when no run is active or it already ended or was
    /// already cancelled.
    pub fn cancel_active_run(&self) -> bool {
        match self.registry.active() {
            Some(state) => {
                let cancelled = state.cancel();
                if cancelled {
                    info!("Cancellation requested for run {}", state.run_id());
                }
                cancelled
            }
            None => false,
        }
    }

    pub fn is_run_active(&self) -> bool {
        self.registry.active().is_some()
    }

    pub fn active_run_id(&self) -> Option<Uuid> {
        self.registry.active().map(|state| state.run_id())
    }

    /// Current run status
    pub fn status(&self) -> RunStatus {
        let run_id = self.active_run_id();
        RunStatus {
            active: run_id.is_some(),
            run_id,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use agent_core::history::MemoryHistoryStore;

    use super::*;
    use crate::event::RunEvent;
    use crate::orchestrator::CANCELLED_MESSAGE;
    use crate::test_support::{ScriptedSession, Step};

    fn engine(admission: RunAdmission) -> (Engine, Arc<MemoryHistoryStore>) {
        let config = EngineConfig {
            initial_backoff: Duration::from_millis(1),
            admission,
            ..EngineConfig::default()
        };
        let mut tools = ToolRegistry::new();
        tools.register_local("list_files", |_| Ok(json!(["a.py", "b.py"])));
        let history = Arc::new(MemoryHistoryStore::new());
        let engine = Engine::new(config, tools, history.clone());
        (engine, history)
    }

    fn scripted(steps: Vec<Step>) -> Box<dyn ChatSession> {
        Box::new(ScriptedSession::new(steps).0)
    }

    #[tokio::test]
    async fn test_idle_engine() {
        let (engine, _) = engine(RunAdmission::Supersede);
        assert!(!engine.is_run_active());
        assert!(engine.attach_to_active_run().is_none());
        assert!(!engine.cancel_active_run());
        assert_eq!(
            engine.status(),
            RunStatus {
                active: false,
                run_id: None
            }
        );
    }

    #[tokio::test]
    async fn test_run_clears_slot_when_done() {
        let (engine, history) = engine(RunAdmission::Supersede);
        let started = engine
            .start(scripted(vec![Step::text("Hello")]), "Hi")
            .unwrap();

        assert_eq!(started.handle.await.unwrap(), RunOutcome::Completed);
        assert_eq!(
            started.listener.collect().await,
            vec![RunEvent::message("Hello"), RunEvent::Done]
        );
        assert!(!engine.is_run_active());
        assert!(!engine.cancel_active_run());
        assert_eq!(history.len().await, 1);
    }

    #[tokio::test]
    async fn test_late_observer_replays() {
        let (engine, _) = engine(RunAdmission::Supersede);
        let hanging = engine.start(scripted(vec![Step::Hang]), "Hi").unwrap();
        assert_eq!(engine.active_run_id(), Some(hanging.run_id));
        assert_eq!(
            serde_json::to_value(engine.status()).unwrap(),
            json!({"active": true, "run_id": hanging.run_id})
        );

        let late = engine.attach_to_active_run().unwrap();
        assert_eq!(late.run_id(), hanging.run_id);

        assert!(engine.cancel_active_run());
        assert!(!engine.cancel_active_run());
        assert_eq!(hanging.handle.await.unwrap(), RunOutcome::Cancelled);

        let expected = vec![RunEvent::error(CANCELLED_MESSAGE)];
        assert_eq!(late.collect().await, expected);
        assert_eq!(hanging.listener.collect().await, expected);
        assert!(!engine.is_run_active());
    }

    #[tokio::test]
    async fn test_supersede_cancels_previous_run() {
        let (engine, _) = engine(RunAdmission::Supersede);
        let first = engine.start(scripted(vec![Step::Hang]), "First").unwrap();
        let second = engine.start(scripted(vec![Step::Hang]), "Second").unwrap();

        assert_eq!(first.handle.await.unwrap(), RunOutcome::Cancelled);
        // The superseded run must not clear the new run's slot
        assert_eq!(engine.active_run_id(), Some(second.run_id));

        assert!(engine.cancel_active_run());
        assert_eq!(second.handle.await.unwrap(), RunOutcome::Cancelled);
        assert!(!engine.is_run_active());
    }

    #[tokio::test]
    async fn test_reject_keeps_active_run() {
        let (engine, _) = engine(RunAdmission::Reject);
        let first = engine.start(scripted(vec![Step::Hang]), "First").unwrap();

        match engine.start(scripted(vec![Step::text("Hello")]), "Second") {
            Err(EngineError::RunActive { run_id }) => assert_eq!(run_id, first.run_id),
            other => panic!("expected RunActive, got {:?}", other.map(|run| run.run_id)),
        }
        assert_eq!(engine.active_run_id(), Some(first.run_id));

        assert!(engine.cancel_active_run());
        assert_eq!(first.handle.await.unwrap(), RunOutcome::Cancelled);
        assert!(engine.start(scripted(vec![Step::text("Hello")]), "Third").is_ok());
    }

    #[test]
    fn test_release_only_matching_run() {
        let registry = RunRegistry::new();
        let first = Arc::new(RunState::new(Uuid::new_v4()));
        let second = Arc::new(RunState::new(Uuid::new_v4()));

        assert!(registry
            .admit(Arc::clone(&first), RunAdmission::Supersede)
            .unwrap()
            .is_none());
        let previous = registry
            .admit(Arc::clone(&second), RunAdmission::Supersede)
            .unwrap();
        assert_eq!(previous.map(|s| s.run_id()), Some(first.run_id()));

        assert!(!registry.release(first.run_id()));
        assert!(registry.release(second.run_id()));
        assert!(registry.active().is_none());
    }
}
