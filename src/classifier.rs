//! Log line classification
//!
//! The healing agent reports progress as free-text log lines with a bracketed
//! tag (`[CLONE] ...`, `[GIT] Pushing ...`). This module parses those lines
//! into [`StageEvent`]s at the boundary and applies events to a
//! [`StepBoard`]. The board only ever moves forward:
//!
//! | Line prefix | Effect |
//! |-------------|--------|
//! | `[CLONE]` | clone running |
//! | `[ANALYSIS]` | clone done, tests running |
//! | `[ERROR FOUND]` | tests done, analysis running |
//! | `[FIX]` / `[FIX SUGGESTED]` | analysis done, fix generation running |
//! | `[GIT] Creating branch` | fix generation done, branch creation running |
//! | `[GIT] Applying` | apply running |
//! | `[GIT] Committing` | apply done, commit running |
//! | `[GIT] Pushing` | commit done, push running |
//! | `[RESULT]` | every step done |
//!
//! Any other line, `[ERROR] Pipeline failed: ...` included, leaves the board
//! unchanged.

use crate::board::{Stage, StepBoard};

/// A stage transition reported by the healing agent
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    CloneStarted,
    AnalysisStarted,
    /// Carries the full log line, kept as the current error context
    ErrorFound { line: String },
    /// Carries the full log line, kept as the current suggested fix
    FixSuggested { line: String },
    BranchCreating,
    ApplyingChanges,
    Committing,
    Pushing,
    /// Terminal marker: the agent reported completion
    Completed,
}

#[derive(Debug, Clone, Copy)]
enum Rule {
    Clone,
    Analysis,
    ErrorFound,
    Fix,
    CreatingBranch,
    Applying,
    Committing,
    Pushing,
    Result,
}

/// Prefix rules. Every rule whose prefix matches fires, in table order.
const RULES: &[(&[&str], Rule)] = &[
    (&["[CLONE]"], Rule::Clone),
    (&["[ANALYSIS]"], Rule::Analysis),
    (&["[ERROR FOUND]"], Rule::ErrorFound),
    (&["[FIX]", "[FIX SUGGESTED]"], Rule::Fix),
    (&["[GIT] Creating branch"], Rule::CreatingBranch),
    (&["[GIT] Applying"], Rule::Applying),
    (&["[GIT] Committing"], Rule::Committing),
    (&["[GIT] Pushing"], Rule::Pushing),
    (&["[RESULT]"], Rule::Result),
];

impl Rule {
    fn event(self, line: &str) -> StageEvent {
        match self {
            Rule::Clone => StageEvent::CloneStarted,
            Rule::Analysis => StageEvent::AnalysisStarted,
            Rule::ErrorFound => StageEvent::ErrorFound {
                line: line.to_string(),
            },
            Rule::Fix => StageEvent::FixSuggested {
                line: line.to_string(),
            },
            Rule::CreatingBranch => StageEvent::BranchCreating,
            Rule::Applying => StageEvent::ApplyingChanges,
            Rule::Committing => StageEvent::Committing,
            Rule::Pushing => StageEvent::Pushing,
            Rule::Result => StageEvent::Completed,
        }
    }
}

impl StageEvent {
    /// Parse one raw log line. Unrecognized lines yield no events.
    pub fn parse_line(line: &str) -> Vec<StageEvent> {
        RULES
            .iter()
            .filter(|(prefixes, _)| prefixes.iter().any(|p| line.starts_with(p)))
            .map(|(_, rule)| rule.event(line))
            .collect()
    }
}

/// Apply one event to a copy of the board
pub fn apply(board: &StepBoard, event: &StageEvent) -> StepBoard {
    let mut next = board.clone();
    match event {
        StageEvent::CloneStarted => next.start(Stage::Clone),
        StageEvent::AnalysisStarted => {
            next.finish(Stage::Clone);
            next.start(Stage::RunTests);
        }
        StageEvent::ErrorFound { .. } => {
            next.finish(Stage::RunTests);
            next.start(Stage::AnalyzeFailure);
        }
        StageEvent::FixSuggested { .. } => {
            next.finish(Stage::AnalyzeFailure);
            next.start(Stage::GenerateFix);
        }
        StageEvent::BranchCreating => {
            next.finish(Stage::GenerateFix);
            next.start(Stage::CreateBranch);
        }
        StageEvent::ApplyingChanges => next.start(Stage::ApplyChanges),
        StageEvent::Committing => {
            next.finish(Stage::ApplyChanges);
            next.start(Stage::Commit);
        }
        StageEvent::Pushing => {
            next.finish(Stage::Commit);
            next.start(Stage::Push);
        }
        StageEvent::Completed => next.finish_all(),
    }
    next
}

/// Outcome of classifying one log line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classified {
    /// Replacement board
    pub board: StepBoard,
    /// Events recognized in the line, in rule order
    pub events: Vec<StageEvent>,
}

/// Classify one log line against the current board
pub fn classify(board: &StepBoard, line: &str) -> Classified {
    let events = StageEvent::parse_line(line);
    let board = events
        .iter()
        .fold(board.clone(), |acc, event| apply(&acc, event));
    Classified { board, events }
}
