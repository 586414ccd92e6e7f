//! Per-run progress: the raw transcript plus the derived step board

use crate::board::StepBoard;
use crate::classifier::{classify, StageEvent};
use serde::Serialize;

/// Append-only, arrival-ordered record of raw log messages
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct Transcript {
    lines: Vec<String>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a message and return its arrival index
    pub fn push(&mut self, line: impl Into<String>) -> usize {
        self.lines.push(line.into());
        self.lines.len() - 1
    }

    pub fn len(&self) -> usize {
        self.lines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.lines.get(index).map(String::as_str)
    }

    pub fn iter(&self) -> impl Iterator<Item = &str> {
        self.lines.iter().map(String::as_str)
    }

    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

/// Everything derived from the log stream of one run
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunProgress {
    pub transcript: Transcript,
    pub board: StepBoard,
    /// Latest `[ERROR FOUND]` line
    pub error_context: Option<String>,
    /// Latest `[FIX]` / `[FIX SUGGESTED]` line
    pub suggested_fix: Option<String>,
}

impl RunProgress {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one message: append it to the transcript, classify it and
    /// swap in the resulting board. Returns true if the board changed.
    pub fn observe(&mut self, message: impl Into<String>) -> bool {
        let message = message.into();
        let classified = classify(&self.board, &message);

        for event in &classified.events {
            match event {
                StageEvent::ErrorFound { line } => self.error_context = Some(line.clone()),
                StageEvent::FixSuggested { line } => self.suggested_fix = Some(line.clone()),
                _ => {}
            }
        }

        self.transcript.push(message);
        let changed = classified.board != self.board;
        self.board = classified.board;
        changed
    }

    /// Clear everything for a new run
    pub fn reset(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::board::{Stage, StepStatus};

    #[test]
    fn test_transcript_keeps_every_message_in_order() {
        let mut progress = RunProgress::new();
        let lines = ["[CLONE] a", "noise", "[CLONE] a", "", "[RESULT] done", "after"];
        for line in lines {
            progress.observe(line);
        }
        assert_eq!(progress.transcript.len(), lines.len());
        assert!(progress.transcript.iter().eq(lines.iter().copied()));
        assert_eq!(progress.transcript.get(1), Some("noise"));
    }

    #[test]
    fn test_observe_reports_board_changes() {
        let mut progress = RunProgress::new();
        assert!(progress.observe("[CLONE] start"));
        assert!(!progress.observe("[CLONE] again"));
        assert!(!progress.observe("unrelated"));
        assert!(progress.observe("[ANALYSIS] go"));
        assert_eq!(progress.board.status(Stage::RunTests), StepStatus::Running);
    }

    #[test]
    fn test_error_and_fix_context_latest_wins() {
        let mut progress = RunProgress::new();
        progress.observe("[ERROR FOUND] main.py:3 - first");
        progress.observe("[FIX] Generating fix suggestion");
        assert_eq!(progress.suggested_fix.as_deref(), Some("[FIX] Generating fix suggestion"));

        progress.observe("[FIX SUGGESTED] Add ':'");
        progress.observe("[ERROR FOUND] main.py:9 - second");
        assert_eq!(progress.error_context.as_deref(), Some("[ERROR FOUND] main.py:9 - second"));
        assert_eq!(progress.suggested_fix.as_deref(), Some("[FIX SUGGESTED] Add ':'"));
    }

    #[test]
    fn test_reset_clears_run() {
        let mut progress = RunProgress::new();
        progress.observe("[RESULT] done");
        progress.observe("[ERROR FOUND] x");
        progress.reset();
        assert!(progress.transcript.is_empty());
        assert_eq!(progress.board, StepBoard::new());
        assert!(progress.error_context.is_none());
    }
}
