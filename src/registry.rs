//! Live session registry
//!
//! Only one subscription may be live per run id. The registry hands out
//! sessions and keeps their cancel handles until they finish.

use crate::backend::HealingBackend;
use crate::session::{CancelHandle, SessionContext, StreamSession};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::debug;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("A session is already live for run {0}")]
    AlreadyLive(String),
}

/// Releases the registry slot when the owning session is dropped
pub(crate) struct SessionLease {
    live: Arc<DashMap<String, CancelHandle>>,
    run_id: String,
}

impl Drop for SessionLease {
    fn drop(&mut self) {
        self.live.remove(&self.run_id);
        debug!(run_id = %self.run_id, "Session slot released");
    }
}

/// Tracks live sessions by run id
#[derive(Default)]
pub struct SessionRegistry {
    live: Arc<DashMap<String, CancelHandle>>,
}

impl SessionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a session for `context.run_id`, unless one is already live
    pub fn open(
        &self,
        backend: Arc<dyn HealingBackend>,
        context: SessionContext,
    ) -> Result<StreamSession, RegistryError> {
        let run_id = context.run_id.clone();
        match self.live.entry(run_id.clone()) {
            Entry::Occupied(_) => Err(RegistryError::AlreadyLive(run_id)),
            Entry::Vacant(slot) => {
                let session = StreamSession::new(backend, context);
                slot.insert(session.cancel_handle());
                let lease = SessionLease {
                    live: Arc::clone(&self.live),
                    run_id,
                };
                Ok(session.with_lease(lease))
            }
        }
    }

    /// Cancel the live session for a run. Returns false if none is live.
    pub fn cancel(&self, run_id: &str) -> bool {
        let handle = self.live.get(run_id).map(|h| h.clone());
        match handle {
            Some(handle) => {
                handle.cancel();
                true
            }
            None => false,
        }
    }

    pub fn is_live(&self, run_id: &str) -> bool {
        self.live.contains_key(run_id)
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::tests::ScriptedBackend;
    use crate::session::Termination;

    #[tokio::test]
    async fn test_one_live_session_per_run() {
        let registry = SessionRegistry::new();
        let backend: Arc<dyn HealingBackend> = Arc::new(ScriptedBackend::new(&["[CLONE] a"]));

        let first = registry
            .open(backend.clone(), SessionContext::detached("run-1"))
            .unwrap();
        assert!(registry.is_live("run-1"));

        let err = registry
            .open(backend.clone(), SessionContext::detached("run-1"))
            .err()
            .unwrap();
        assert_eq!(err, RegistryError::AlreadyLive("run-1".to_string()));

        let other = registry.open(backend.clone(), SessionContext::detached("run-2"));
        assert!(other.is_ok());
        assert_eq!(registry.len(), 2);
        drop(other);

        let outcome = first.run().await;
        assert_eq!(outcome.termination(), Termination::Success);
        assert!(registry.is_empty());

        assert!(registry
            .open(backend, SessionContext::detached("run-1"))
            .is_ok());
    }

    #[tokio::test]
    async fn test_cancel_through_registry() {
        let registry = SessionRegistry::new();
        let scripted = Arc::new(ScriptedBackend::new(&["[CLONE] a"]).hold_open());

        let session = registry
            .open(scripted.clone(), SessionContext::detached("run-1"))
            .unwrap();
        let (_handle, task) = session.spawn();

        assert!(registry.cancel("run-1"));
        let outcome = task.await.unwrap();

        assert_eq!(outcome.termination(), Termination::Cancelled);
        assert_eq!(scripted.fetches.load(std::sync::atomic::Ordering::SeqCst), 0);
        assert!(!registry.cancel("run-1"));
        assert!(!registry.is_live("run-1"));
    }
}
