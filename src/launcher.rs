//! Run submission

use crate::backend::{BackendError, HealingBackend};
use crate::model::{FixMode, Run, RunRequest};
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};

#[derive(Error, Debug)]
pub enum LaunchError {
    #[error("Missing required field: {0}")]
    MissingField(&'static str),

    #[error("Failed to start pipeline: {0}")]
    Submission(#[from] BackendError),
}

/// Parameters the operator supplies for a new run
#[derive(Debug, Clone)]
pub struct LaunchRequest {
    pub repo_url: String,
    pub team_name: String,
    pub team_lead: String,
    pub branch: String,
    pub fix_mode: FixMode,
}

impl LaunchRequest {
    pub fn new(
        repo_url: impl Into<String>,
        team_name: impl Into<String>,
        team_lead: impl Into<String>,
    ) -> Self {
        Self {
            repo_url: repo_url.into(),
            team_name: team_name.into(),
            team_lead: team_lead.into(),
            branch: "main".to_string(),
            fix_mode: FixMode::Auto,
        }
    }

    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    pub fn with_fix_mode(mut self, fix_mode: FixMode) -> Self {
        self.fix_mode = fix_mode;
        self
    }

    fn validate(&self) -> Result<(), LaunchError> {
        let required = [
            ("repo_url", &self.repo_url),
            ("team_name", &self.team_name),
            ("leader_name", &self.team_lead),
        ];
        for (field, value) in required {
            if value.trim().is_empty() {
                return Err(LaunchError::MissingField(field));
            }
        }
        Ok(())
    }
}

/// Submits runs to the healing backend
pub struct RunLauncher {
    backend: Arc<dyn HealingBackend>,
}

impl RunLauncher {
    pub fn new(backend: Arc<dyn HealingBackend>) -> Self {
        Self { backend }
    }

    /// Validate, submit, and return the created run
    pub async fn launch(&self, request: LaunchRequest) -> Result<Run, LaunchError> {
        request.validate()?;

        let wire = RunRequest {
            repo_url: request.repo_url.trim().to_string(),
            team_name: request.team_name.trim().to_string(),
            leader_name: request.team_lead.trim().to_string(),
        };

        let ticket = self.backend.start_run(&wire).await.map_err(|e| {
            warn!(backend = self.backend.name(), error = %e, "Run submission failed");
            e
        })?;

        info!(run_id = %ticket.run_id, repo_url = %wire.repo_url, "Run started");

        Ok(Run {
            run_id: ticket.run_id,
            repo_url: wire.repo_url,
            team_name: wire.team_name,
            team_lead: wire.leader_name,
            branch: request.branch,
            fix_mode: request.fix_mode,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::EventStream;
    use crate::model::{HealingResult, RunTicket};
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct RecordingBackend {
        requests: Mutex<Vec<RunRequest>>,
        fail: bool,
    }

    impl RecordingBackend {
        fn new(fail: bool) -> Arc<Self> {
            Arc::new(Self {
                requests: Mutex::new(Vec::new()),
                fail,
            })
        }
    }

    #[async_trait]
    impl HealingBackend for RecordingBackend {
        fn name(&self) -> &str {
            "recording"
        }

        async fn start_run(&self, request: &RunRequest) -> Result<RunTicket, BackendError> {
            self.requests.lock().unwrap().push(request.clone());
            if self.fail {
                return Err(BackendError::Status {
                    status: 400,
                    body: "repo_url, team_name, leader_name are required".to_string(),
                });
            }
            Ok(RunTicket {
                run_id: "run-1".to_string(),
            })
        }

        async fn open_stream(&self, _run_id: &str) -> Result<EventStream, BackendError> {
            unreachable!("launcher never subscribes")
        }

        async fn fetch_result(&self, _run_id: &str) -> Result<HealingResult, BackendError> {
            unreachable!("launcher never fetches results")
        }
    }

    #[tokio::test]
    async fn test_launch_builds_run() {
        let backend = RecordingBackend::new(false);
        let launcher = RunLauncher::new(backend.clone());

        let run = launcher
            .launch(
                LaunchRequest::new(" https://github.com/acme/app ", "Acme", "Jane Doe")
                    .with_fix_mode(FixMode::Manual),
            )
            .await
            .unwrap();

        assert_eq!(run.run_id, "run-1");
        assert_eq!(run.repo_url, "https://github.com/acme/app");
        assert_eq!(run.branch, "main");
        assert_eq!(run.fix_mode, FixMode::Manual);
        assert_eq!(run.fix_branch(), "ACME_JANE_DOE_AI_FIX");

        let sent = backend.requests.lock().unwrap();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].leader_name, "Jane Doe");
    }

    #[tokio::test]
    async fn test_missing_fields_never_reach_backend() {
        let backend = RecordingBackend::new(false);
        let launcher = RunLauncher::new(backend.clone());

        let err = launcher
            .launch(LaunchRequest::new("https://github.com/acme/app", "  ", "Jane"))
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::MissingField("team_name")));

        let err = launcher
            .launch(LaunchRequest::new("", "Acme", "Jane"))
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::MissingField("repo_url")));

        assert!(backend.requests.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_submission_failure_surfaces() {
        let launcher = RunLauncher::new(RecordingBackend::new(true));
        let err = launcher
            .launch(LaunchRequest::new("https://github.com/acme/app", "Acme", "Jane"))
            .await
            .unwrap_err();
        assert!(matches!(err, LaunchError::Submission(BackendError::Status { status: 400, .. })));
    }
}
