//! Run state - replayable broadcast bus for one run
//!
//! Every event is appended to the replay buffer and handed to the attached
//! listeners inside one critical section, so a listener attaching at any
//! moment sees the full history followed by live events with no gap and no
//! duplicate. Closing the bus drops every sender, which is how listeners
//! learn the stream has ended.

use std::sync::{Mutex, MutexGuard, PoisonError};

use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::event::RunEvent;

/// Receiving side handed to an observer of a run
#[derive(Debug)]
pub struct Listener {
    run_id: Uuid,
    rx: mpsc::UnboundedReceiver<RunEvent>,
}

impl Listener {
    /// Run this listener is attached to
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    /// Next event, or `None` once the run has closed the stream
    pub async fn recv(&mut self) -> Option<RunEvent> {
        self.rx.recv().await
    }

    /// Drain events until the stream closes
    pub async fn collect(mut self) -> Vec<RunEvent> {
        let mut events = Vec::new();
        while let Some(event) = self.rx.recv().await {
            events.push(event);
        }
        events
    }

    /// Convert into a `Stream` of events
    pub fn into_stream(self) -> UnboundedReceiverStream<RunEvent> {
        UnboundedReceiverStream::new(self.rx)
    }
}

#[derive(Default)]
struct BusInner {
    replay: Vec<RunEvent>,
    listeners: Vec<mpsc::UnboundedSender<RunEvent>>,
    finalizing: bool,
    finished: bool,
    closed: bool,
}

/// Shared state of one run: replay buffer, listeners, cancellation handle
#[derive(Debug)]
pub struct RunState {
    run_id: Uuid,
    cancel: CancellationToken,
    inner: Mutex<BusInner>,
}

impl std::fmt::Debug for BusInner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BusInner")
            .field("replay", &self.replay.len())
            .field("listeners", &self.listeners.len())
            .field("finalizing", &self.finalizing)
            .field("finished", &self.finished)
            .field("closed", &self.closed)
            .finish()
    }
}

impl RunState {
    /// Create the state for a new run
    pub fn new(run_id: Uuid) -> Self {
        Self {
            run_id,
            cancel: CancellationToken::new(),
            inner: Mutex::new(BusInner::default()),
        }
    }

    /// Run identifier
    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    fn lock(&self) -> MutexGuard<'_, BusInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a new listener, replaying everything broadcast so far.
    ///
    /// On a closed bus the listener gets the replay and then end of stream.
    pub fn attach(&self) -> Listener {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();

        for event in &inner.replay {
            // Receiver is still in hand, so this cannot fail
            let _ = tx.send(event.clone());
        }
        if !inner.closed {
            inner.listeners.push(tx);
        }

        debug!(
            "Listener attached to run {} ({} events replayed)",
            self.run_id,
            inner.replay.len()
        );
        Listener {
            run_id: self.run_id,
            rx,
        }
    }

    /// Record an event and deliver it to every attached listener.
    ///
    /// Nothing is recorded after a terminal event. Listeners whose receiver
    /// is gone are dropped.
    pub(crate) fn broadcast(&self, event: RunEvent) {
        let mut inner = self.lock();
        if inner.finished || inner.closed {
            warn!(
                "Dropping {:?} broadcast after run {} finished",
                event, self.run_id
            );
            return;
        }
        if event.is_terminal() {
            inner.finished = true;
        }

        inner.replay.push(event.clone());
        inner.listeners.retain(|tx| tx.send(event.clone()).is_ok());
    }

    /// Signal end of stream to every listener
    pub(crate) fn close(&self) {
        let mut inner = self.lock();
        if inner.closed {
            return;
        }
        inner.closed = true;
        inner.listeners.clear();
        debug!("Closed event stream for run {}", self.run_id);
    }

    /// Whether the run has closed its stream
    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Copy of every event broadcast so far
    pub fn replay(&self) -> Vec<RunEvent> {
        self.lock().replay.clone()
    }

    /// Number of listeners still receiving live events
    pub fn listener_count(&self) -> usize {
        self.lock().listeners.len()
    }

    /// Token the orchestrator watches for cancellation
    pub(crate) fn cancel_token(&self) -> &CancellationToken {
        &self.cancel
    }

    /// Whether a terminal event has been broadcast
    pub fn is_finished(&self) -> bool {
        let inner = self.lock();
        inner.finished || inner.closed
    }

    /// Stop accepting cancellation so the run can be written out.
    ///
    /// Returns `false` if cancellation was already requested.
    pub(crate) fn begin_finalizing(&self) -> bool {
        let mut inner = self.lock();
        if self.cancel.is_cancelled() {
            return false;
        }
        inner.finalizing = true;
        true
    }

    /// Request cancellation.
    ///
    /// Returns `false` once the run is writing out its result, or if it was
    /// already cancelled.
    pub fn cancel(&self) -> bool {
        let inner = self.lock();
        if inner.finalizing || inner.finished || inner.closed || self.cancel.is_cancelled() {
            return false;
        }
        self.cancel.cancel();
        true
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;

    #[tokio::test]
    async fn test_late_listener_gets_replay_then_live() {
        let state = RunState::new(Uuid::new_v4());
        state.broadcast(RunEvent::message("one"));
        state.broadcast(RunEvent::message("two"));

        let mut late = state.attach();
        state.broadcast(RunEvent::message("three"));
        state.broadcast(RunEvent::Done);
        state.close();

        assert_eq!(late.recv().await, Some(RunEvent::message("one")));
        assert_eq!(late.recv().await, Some(RunEvent::message("two")));
        assert_eq!(late.recv().await, Some(RunEvent::message("three")));
        assert_eq!(late.recv().await, Some(RunEvent::Done));
        assert_eq!(late.recv().await, None);
    }

    #[tokio::test]
    async fn test_attach_after_close_replays_and_ends() {
        let state = RunState::new(Uuid::new_v4());
        state.broadcast(RunEvent::message("hello"));
        state.broadcast(RunEvent::Done);
        state.close();

        let events = state.attach().collect().await;
        assert_eq!(events, vec![RunEvent::message("hello"), RunEvent::Done]);
        assert_eq!(state.listener_count(), 0);
    }

    #[tokio::test]
    async fn test_nothing_recorded_after_terminal_event() {
        let state = RunState::new(Uuid::new_v4());
        let listener = state.attach();

        state.broadcast(RunEvent::error("boom"));
        state.broadcast(RunEvent::message("late"));
        state.broadcast(RunEvent::Done);
        state.close();

        assert_eq!(listener.collect().await, vec![RunEvent::error("boom")]);
        assert_eq!(state.replay(), vec![RunEvent::error("boom")]);
    }

    #[tokio::test]
    async fn test_disconnected_listener_is_pruned() {
        let state = RunState::new(Uuid::new_v4());
        let kept = state.attach();
        let dropped = state.attach();
        assert_eq!(state.listener_count(), 2);

        drop(dropped);
        state.broadcast(RunEvent::message("still running"));
        assert_eq!(state.listener_count(), 1);

        state.close();
        assert_eq!(kept.collect().await, vec![RunEvent::message("still running")]);
    }

    #[tokio::test]
    async fn test_concurrent_attach_sees_every_event_once() {
        let state = Arc::new(RunState::new(Uuid::new_v4()));
        let total = 500;

        let producer = {
            let state = Arc::clone(&state);
            tokio::spawn(async move {
                for i in 0..total {
                    state.broadcast(RunEvent::message(i.to_string()));
                    if i % 50 == 0 {
                        tokio::task::yield_now().await;
                    }
                }
                state.broadcast(RunEvent::Done);
                state.close();
            })
        };

        let mut attachers = Vec::new();
        for _ in 0..8 {
            let state = Arc::clone(&state);
            attachers.push(tokio::spawn(async move {
                tokio::task::yield_now().await;
                state.attach().collect().await
            }));
        }

        producer.await.unwrap();
        let expected = state.replay();
        assert_eq!(expected.len(), total + 1);
        for attacher in attachers {
            assert_eq!(attacher.await.unwrap(), expected);
        }
    }

    #[test]
    fn test_cancel_is_one_shot() {
        let state = RunState::new(Uuid::new_v4());
        assert!(state.cancel());
        assert!(!state.cancel());

        let closed = RunState::new(Uuid::new_v4());
        closed.close();
        assert!(!closed.cancel());

        let done = RunState::new(Uuid::new_v4());
        done.broadcast(RunEvent::Done);
        assert!(done.is_finished());
        assert!(!done.cancel());
    }

    #[test]
    fn test_finalizing_and_cancel_exclude_each_other() {
        let finalizing = RunState::new(Uuid::new_v4());
        assert!(finalizing.begin_finalizing());
        assert!(!finalizing.cancel());

        let cancelled = RunState::new(Uuid::new_v4());
        assert!(cancelled.cancel());
        assert!(!cancelled.begin_finalizing());
    }
}
