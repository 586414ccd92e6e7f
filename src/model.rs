//! Run and result records exchanged with the healing backend

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;

/// How the agent should treat a suggested fix
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FixMode {
    #[default]
    Auto,
    Manual,
}

impl std::fmt::Display for FixMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FixMode::Auto => write!(f, "auto"),
            FixMode::Manual => write!(f, "manual"),
        }
    }
}

/// Body of a run submission
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RunRequest {
    pub repo_url: String,
    pub team_name: String,
    pub leader_name: String,
}

/// Response to a run submission
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct RunTicket {
    pub run_id: String,
}

/// One healing run, immutable once created
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Run {
    pub run_id: String,
    pub repo_url: String,
    pub team_name: String,
    pub team_lead: String,
    pub branch: String,
    pub fix_mode: FixMode,
}

impl Run {
    /// Branch the agent pushes its fix to
    pub fn fix_branch(&self) -> String {
        fix_branch_name(&self.team_name, &self.team_lead)
    }
}

fn sanitize_name(name: &str) -> String {
    name.trim().replace(' ', "_").to_uppercase()
}

/// `{TEAM}_{LEADER}_AI_FIX`, with names trimmed, spaces as `_`, upper-cased
pub fn fix_branch_name(team_name: &str, leader_name: &str) -> String {
    format!(
        "{}_{}_AI_FIX",
        sanitize_name(team_name),
        sanitize_name(leader_name)
    )
}

/// Final verdict of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Outcome {
    Success,
    #[serde(alias = "failed")]
    Failure,
}

/// Terminal record of a run, produced once by the agent
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HealingResult {
    pub result: Outcome,
    #[serde(alias = "repo_url")]
    pub repo: String,
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub attempts: u32,
    #[serde(default)]
    pub commits: u32,
    #[serde(default)]
    pub files_changed: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    #[serde(default)]
    pub primary_fix: Option<String>,
    #[serde(default)]
    pub alternative_fix: Option<String>,
    /// Seconds
    #[serde(default)]
    pub total_time: Option<f64>,
    #[serde(default)]
    pub summary: String,
}

impl HealingResult {
    pub fn is_success(&self) -> bool {
        self.result == Outcome::Success
    }
}

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("Failed to serialize result: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Failed to write export file: {0}")]
    Io(#[from] std::io::Error),
}

/// Downloadable JSON document: the result plus the time it was exported
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultExport {
    pub result: Outcome,
    pub repo: String,
    pub branch: Option<String>,
    pub attempts: u32,
    pub commits: u32,
    pub files_changed: Vec<String>,
    pub last_error: Option<String>,
    pub primary_fix: Option<String>,
    pub alternative_fix: Option<String>,
    pub total_time: Option<f64>,
    pub summary: String,
    pub timestamp: String,
}

impl ResultExport {
    pub fn new(result: &HealingResult, exported_at: DateTime<Utc>) -> Self {
        Self {
            result: result.result,
            repo: result.repo.clone(),
            branch: result.branch.clone(),
            attempts: result.attempts,
            commits: result.commits,
            files_changed: result.files_changed.clone(),
            last_error: result.last_error.clone(),
            primary_fix: result.primary_fix.clone(),
            alternative_fix: result.alternative_fix.clone(),
            total_time: result.total_time,
            summary: result.summary.clone(),
            timestamp: exported_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        }
    }

    /// Pretty-printed JSON, two-space indented
    pub fn to_pretty_json(&self) -> Result<String, ExportError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn write_to(&self, path: &Path) -> Result<(), ExportError> {
        std::fs::write(path, self.to_pretty_json()?)?;
        Ok(())
    }
}
