//! AutoHeal Console - operator client for the AutoHeal CI healing agent
//!
//! This crate provides:
//! - A typed client for the healing backend (run submission, log stream, result retrieval)
//! - A log line classifier that turns the agent's free-text log into stage events
//! - A fixed ten-step pipeline board derived from those events
//! - A stream session state machine that follows one run to its final result
//! - A registry that keeps at most one live subscription per run

pub mod backend;
pub mod board;
pub mod classifier;
pub mod config;
pub mod launcher;
pub mod model;
pub mod progress;
pub mod registry;
pub mod session;

pub use backend::{BackendError, HealingBackend, HttpBackend};
pub use board::{Stage, Step, StepBoard, StepStatus};
pub use classifier::{classify, Classified, StageEvent};
pub use config::ConsoleConfig;
pub use launcher::{LaunchRequest, RunLauncher};
pub use model::{FixMode, HealingResult, Outcome, ResultExport, Run};
pub use progress::{RunProgress, Transcript};
pub use registry::SessionRegistry;
pub use session::{
    CancelHandle, SessionContext, SessionObserver, SessionOutcome, SessionState, StreamSession,
};
