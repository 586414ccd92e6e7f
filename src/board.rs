//! The ten-step pipeline board shown while a healing run is in flight

use serde::Serialize;

/// One canonical stage of the remote pipeline, in board order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Stage {
    Clone,
    CreateBranch,
    InstallDependencies,
    RunTests,
    AnalyzeFailure,
    GenerateFix,
    ApplyChanges,
    Commit,
    Push,
    RerunTests,
}

impl Stage {
    /// Every stage, in display order
    pub const ALL: [Stage; 10] = [
        Stage::Clone,
        Stage::CreateBranch,
        Stage::InstallDependencies,
        Stage::RunTests,
        Stage::AnalyzeFailure,
        Stage::GenerateFix,
        Stage::ApplyChanges,
        Stage::Commit,
        Stage::Push,
        Stage::RerunTests,
    ];

    /// Position of this stage on the board
    pub fn index(self) -> usize {
        self as usize
    }

    /// Display name of the stage
    pub fn name(self) -> &'static str {
        match self {
            Stage::Clone => "Cloning repository",
            Stage::CreateBranch => "Creating new branch",
            Stage::InstallDependencies => "Installing dependencies",
            Stage::RunTests => "Running tests",
            Stage::AnalyzeFailure => "Analyzing failure",
            Stage::GenerateFix => "Generating fix",
            Stage::ApplyChanges => "Applying changes",
            Stage::Commit => "Committing changes",
            Stage::Push => "Pushing branch",
            Stage::RerunTests => "Re-running tests",
        }
    }
}

/// Status of a single step
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum StepStatus {
    Pending,
    Running,
    Done,
    Failed,
}

impl std::fmt::Display for StepStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            StepStatus::Pending => write!(f, "pending"),
            StepStatus::Running => write!(f, "running"),
            StepStatus::Done => write!(f, "done"),
            StepStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A named step and its current status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Step {
    pub name: &'static str,
    pub status: StepStatus,
}

/// Fixed-size, ordered board of pipeline steps.
///
/// Steps are never added, removed or reordered. Status writes are
/// crate-private: outside the classifier a board is read-only and is
/// replaced wholesale.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StepBoard {
    steps: [Step; 10],
}

impl StepBoard {
    /// Create a board with every step pending
    pub fn new() -> Self {
        Self {
            steps: Stage::ALL.map(|stage| Step {
                name: stage.name(),
                status: StepStatus::Pending,
            }),
        }
    }

    /// All steps in display order
    pub fn steps(&self) -> &[Step] {
        &self.steps
    }

    /// Status of one stage
    pub fn status(&self, stage: Stage) -> StepStatus {
        self.steps[stage.index()].status
    }

    /// Status vector in display order
    pub fn statuses(&self) -> [StepStatus; 10] {
        self.steps.map(|s| s.status)
    }

    /// True once every step is done
    pub fn is_complete(&self) -> bool {
        self.steps.iter().all(|s| s.status == StepStatus::Done)
    }

    /// Number of steps currently in the given status
    pub fn count(&self, status: StepStatus) -> usize {
        self.steps.iter().filter(|s| s.status == status).count()
    }

    /// pending -> running. Any other status is left alone.
    pub(crate) fn start(&mut self, stage: Stage) {
        let step = &mut self.steps[stage.index()];
        if step.status == StepStatus::Pending {
            step.status = StepStatus::Running;
        }
    }

    /// pending|running -> done. Done and failed steps are left alone.
    pub(crate) fn finish(&mut self, stage: Stage) {
        let step = &mut self.steps[stage.index()];
        if matches!(step.status, StepStatus::Pending | StepStatus::Running) {
            step.status = StepStatus::Done;
        }
    }

    /// Force every step to done, whatever its status
    pub(crate) fn finish_all(&mut self) {
        for step in self.steps.iter_mut() {
            step.status = StepStatus::Done;
        }
    }
}

impl Default for StepBoard {
    fn default() -> Self {
        Self::new()
    }
}
