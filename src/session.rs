//! Stream session: follows one run from subscription to final result
//!
//! ```text
//! idle -> subscribing -> streaming -> draining -> terminated(success)
//!                   \__________________/    \--> terminated(error)
//! ```
//!
//! The session reacts to two stream events, "message received" and "stream
//! closed", and issues exactly one result fetch after closure. Messages are
//! handled strictly in arrival order. Cancellation is honoured in every
//! state: the subscription is dropped and nothing further is classified or
//! fetched. A session with a blank run id never leaves idle; it terminates
//! with an error without touching the backend.

use crate::backend::{BackendError, EventStream, HealingBackend};
use crate::board::StepBoard;
use crate::model::HealingResult;
use crate::progress::RunProgress;
use crate::registry::SessionLease;
use futures::StreamExt;
use serde::Deserialize;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// How a session ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Termination {
    Success,
    Error,
    Cancelled,
}

/// Lifecycle state of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Subscribing,
    Streaming,
    Draining,
    Terminated(Termination),
}

impl SessionState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionState::Terminated(_))
    }
}

/// Terminal report handed to the result consumer
#[derive(Debug)]
pub enum SessionOutcome {
    /// The stream closed and the result was retrieved
    Completed {
        result: HealingResult,
        progress: RunProgress,
    },
    /// The stream closed but the result could not be retrieved
    FetchFailed {
        error: BackendError,
        progress: RunProgress,
    },
    /// The session was cancelled before it terminated
    Cancelled { progress: RunProgress },
    /// The run id was unusable; nothing was subscribed or fetched
    Rejected {
        error: BackendError,
        progress: RunProgress,
    },
}

impl SessionOutcome {
    pub fn progress(&self) -> &RunProgress {
        match self {
            SessionOutcome::Completed { progress, .. }
            | SessionOutcome::FetchFailed { progress, .. }
            | SessionOutcome::Cancelled { progress }
            | SessionOutcome::Rejected { progress, .. } => progress,
        }
    }

    pub fn result(&self) -> Option<&HealingResult> {
        match self {
            SessionOutcome::Completed { result, .. } => Some(result),
            _ => None,
        }
    }

    pub fn termination(&self) -> Termination {
        match self {
            SessionOutcome::Completed { .. } => Termination::Success,
            SessionOutcome::FetchFailed { .. } | SessionOutcome::Rejected { .. } => {
                Termination::Error
            }
            SessionOutcome::Cancelled { .. } => Termination::Cancelled,
        }
    }
}

/// Callbacks from a running session. All default to no-ops.
pub trait SessionObserver: Send + Sync {
    fn state_changed(&self, _state: SessionState) {}

    /// A message was appended to the transcript at `index`
    fn message_observed(&self, _index: usize, _message: &str) {}

    /// The board was replaced and differs from the previous one
    fn board_updated(&self, _board: &StepBoard) {}

    fn terminated(&self, _outcome: &SessionOutcome) {}
}

/// Observer that ignores every callback
pub struct NoopObserver;

impl SessionObserver for NoopObserver {}

/// Everything a session needs to know about its run
#[derive(Clone)]
pub struct SessionContext {
    pub run_id: String,
    pub observer: Arc<dyn SessionObserver>,
}

impl SessionContext {
    pub fn new(run_id: impl Into<String>, observer: Arc<dyn SessionObserver>) -> Self {
        Self {
            run_id: run_id.into(),
            observer,
        }
    }

    /// Context without an observer; the outcome is the only report
    pub fn detached(run_id: impl Into<String>) -> Self {
        Self::new(run_id, Arc::new(NoopObserver))
    }
}

/// Cancels a session from any state. Cloneable and idempotent.
#[derive(Clone)]
pub struct CancelHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.tx.borrow()
    }
}

/// Wire payload of one stream event
#[derive(Deserialize)]
struct LogPayload {
    message: String,
}

enum StreamStep {
    Cancelled,
    Item(Option<Result<String, BackendError>>),
}

async fn wait_cancelled(rx: &mut watch::Receiver<bool>) {
    let sender_gone = rx.wait_for(|cancelled| *cancelled).await.is_err();
    if sender_gone {
        std::future::pending::<()>().await;
    }
}

/// Owns the subscription to one run's log stream
pub struct StreamSession {
    context: SessionContext,
    backend: Arc<dyn HealingBackend>,
    state: SessionState,
    progress: RunProgress,
    cancel_tx: Arc<watch::Sender<bool>>,
    cancel_rx: watch::Receiver<bool>,
    _lease: Option<SessionLease>,
}

impl StreamSession {
    /// Create an idle session
    pub fn new(backend: Arc<dyn HealingBackend>, context: SessionContext) -> Self {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        Self {
            context,
            backend,
            state: SessionState::Idle,
            progress: RunProgress::new(),
            cancel_tx: Arc::new(cancel_tx),
            cancel_rx,
            _lease: None,
        }
    }

    pub(crate) fn with_lease(mut self, lease: SessionLease) -> Self {
        self._lease = Some(lease);
        self
    }

    pub fn run_id(&self) -> &str {
        &self.context.run_id
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn progress(&self) -> &RunProgress {
        &self.progress
    }

    pub fn cancel_handle(&self) -> CancelHandle {
        CancelHandle {
            tx: Arc::clone(&self.cancel_tx),
        }
    }

    /// Run the session on its own task
    pub fn spawn(self) -> (CancelHandle, JoinHandle<SessionOutcome>) {
        let handle = self.cancel_handle();
        (handle, tokio::spawn(self.run()))
    }

    /// Drive the session to a terminal state
    pub async fn run(mut self) -> SessionOutcome {
        let cancelled_early = *self.cancel_rx.borrow();
        if cancelled_early {
            return self.cancelled();
        }

        if self.context.run_id.trim().is_empty() {
            warn!("Refusing to subscribe without a run id");
            let error = BackendError::InvalidRunId(self.context.run_id.clone());
            return self.terminate(Termination::Error, |progress| SessionOutcome::Rejected {
                error,
                progress,
            });
        }

        info!(run_id = %self.context.run_id, backend = self.backend.name(), "Subscribing to log stream");
        self.transition(SessionState::Subscribing);

        let opened = tokio::select! {
            biased;
            _ = wait_cancelled(&mut self.cancel_rx) => None,
            opened = self.backend.open_stream(&self.context.run_id) => Some(opened),
        };

        match opened {
            None => return self.cancelled(),
            Some(Ok(events)) => {
                if self.pump(events).await {
                    return self.cancelled();
                }
            }
            Some(Err(e)) => {
                // An event source that fails to connect reports closure.
                warn!(run_id = %self.context.run_id, error = %e, "Log stream unavailable, treating as closed");
            }
        }

        self.transition(SessionState::Draining);
        info!(
            run_id = %self.context.run_id,
            messages = self.progress.transcript.len(),
            "Log stream closed, fetching result"
        );

        let fetched = tokio::select! {
            biased;
            _ = wait_cancelled(&mut self.cancel_rx) => None,
            fetched = self.backend.fetch_result(&self.context.run_id) => Some(fetched),
        };

        match fetched {
            None => self.cancelled(),
            Some(Ok(result)) => {
                info!(run_id = %self.context.run_id, result = ?result.result, "Result retrieved");
                self.terminate(Termination::Success, |progress| SessionOutcome::Completed {
                    result,
                    progress,
                })
            }
            Some(Err(error)) => {
                warn!(run_id = %self.context.run_id, error = %error, "Failed to fetch result");
                self.terminate(Termination::Error, |progress| SessionOutcome::FetchFailed {
                    error,
                    progress,
                })
            }
        }
    }

    /// Consume the stream until it closes. Returns true if cancelled.
    async fn pump(&mut self, mut events: EventStream) -> bool {
        loop {
            let step = tokio::select! {
                biased;
                _ = wait_cancelled(&mut self.cancel_rx) => StreamStep::Cancelled,
                item = events.next() => StreamStep::Item(item),
            };

            match step {
                StreamStep::Cancelled => return true,
                StreamStep::Item(Some(Ok(data))) => self.receive(&data),
                StreamStep::Item(Some(Err(e))) => {
                    warn!(run_id = %self.context.run_id, error = %e, "Log stream error, treating as closed");
                    return false;
                }
                StreamStep::Item(None) => return false,
            }
        }
    }

    fn receive(&mut self, data: &str) {
        if self.state == SessionState::Subscribing {
            self.transition(SessionState::Streaming);
        }

        let message = match serde_json::from_str::<LogPayload>(data) {
            Ok(payload) => payload.message,
            Err(e) => {
                warn!(run_id = %self.context.run_id, error = %e, payload = data, "Skipping malformed stream payload");
                return;
            }
        };

        let changed = self.progress.observe(message);
        let index = self.progress.transcript.len() - 1;
        let observer = &self.context.observer;

        if let Some(line) = self.progress.transcript.get(index) {
            debug!(run_id = %self.context.run_id, index, line, "Log line");
            observer.message_observed(index, line);
        }
        if changed {
            observer.board_updated(&self.progress.board);
        }
    }

    fn transition(&mut self, next: SessionState) {
        debug!(run_id = %self.context.run_id, from = ?self.state, to = ?next, "Session state change");
        self.state = next;
        self.context.observer.state_changed(next);
    }

    fn cancelled(self) -> SessionOutcome {
        info!(run_id = %self.context.run_id, "Session cancelled");
        self.terminate(Termination::Cancelled, |progress| SessionOutcome::Cancelled {
            progress,
        })
    }

    fn terminate(
        mut self,
        termination: Termination,
        build: impl FnOnce(RunProgress) -> SessionOutcome,
    ) -> SessionOutcome {
        self.transition(SessionState::Terminated(termination));
        let outcome = build(std::mem::take(&mut self.progress));
        self.context.observer.terminated(&outcome);
        outcome
    }
}
