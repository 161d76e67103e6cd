//! Progress store and lifecycle state normalization.
//!
//! The progress file has been written by several generations of tooling:
//! status strings vary, fields go missing, and the board's `passes` flag can
//! disagree with the entry. Everything downstream branches on the
//! [`TaskState`] union produced by [`task_state`] instead of re-deriving the
//! rules in place.

use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Deserializer, Serialize};

use crate::error::{OrchestratorError, OrchestratorResult};
use crate::store::tasks::Task;

/// Statuses a progress entry can carry on disk. An entry never records
/// "pending"; a pending task simply has no entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ProgressStatus {
    Running,
    Blocked,
    Completed,
    Error,
    CodeReview,
}

impl ProgressStatus {
    pub fn parse(raw: &str) -> Option<Self> {
        match raw {
            "running" => Some(ProgressStatus::Running),
            "blocked" => Some(ProgressStatus::Blocked),
            "completed" => Some(ProgressStatus::Completed),
            "error" => Some(ProgressStatus::Error),
            "code-review" => Some(ProgressStatus::CodeReview),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ProgressStatus::Running => "running",
            ProgressStatus::Blocked => "blocked",
            ProgressStatus::Completed => "completed",
            ProgressStatus::Error => "error",
            ProgressStatus::CodeReview => "code-review",
        }
    }
}

/// Legacy stores carry status strings outside the known set. Treat those as
/// absent rather than failing the whole load.
fn lenient_status<'de, D>(deserializer: D) -> Result<Option<ProgressStatus>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(ProgressStatus::parse))
}

/// One task's lifecycle record.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProgressEntry {
    #[serde(default, deserialize_with = "lenient_status", skip_serializing_if = "Option::is_none")]
    pub status: Option<ProgressStatus>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tdd_agent: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub work_log: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tdd_affected_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens_used: Vec<u64>,
    /// Fields written by other tools; preserved verbatim across rewrites.
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ProgressEntry {
    /// `tokensUsed` is a per-turn series; the final element is the figure
    /// reported for the task.
    pub fn final_tokens(&self) -> Option<u64> {
        self.tokens_used.last().copied()
    }

    pub fn total_tokens(&self) -> u64 {
        self.tokens_used.iter().sum()
    }
}

/// The progress store: task name -> entry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProgressStore {
    #[serde(flatten)]
    pub entries: BTreeMap<String, ProgressEntry>,
}

impl ProgressStore {
    /// Load the store from disk. A missing file is an empty store, not an
    /// error: first runs start with no progress at all.
    pub fn load(path: &Path) -> OrchestratorResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = fs::read_to_string(path)?;
        if raw.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_json::from_str(&raw).map_err(|source| OrchestratorError::InvalidStore {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn entry(&self, name: &str) -> Option<&ProgressEntry> {
        self.entries.get(name)
    }

    pub fn entry_mut(&mut self, name: &str) -> &mut ProgressEntry {
        self.entries.entry(name.to_string()).or_default()
    }
}

/// Lifecycle state for one task, combining the board's `passes` flag with the
/// progress entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    /// No progress entry exists; the task has never been scheduled.
    NoEntry,
    /// An agent owns the task, or the entry carries no usable status.
    Running,
    /// Recorded as waiting on something outside the board.
    Blocked,
    /// A terminal entry exists; `passes` is the board's verdict.
    Terminal { passes: bool },
}

/// Normalize the store's dual representations into one union. The board's
/// `passes` flag wins over whatever the entry says.
pub fn task_state(task: &Task, entry: Option<&ProgressEntry>) -> TaskState {
    if task.passes {
        return TaskState::Terminal { passes: true };
    }
    match entry {
        None => TaskState::NoEntry,
        Some(entry) => match entry.status {
            Some(ProgressStatus::Blocked) => TaskState::Blocked,
            Some(ProgressStatus::Running) | None => TaskState::Running,
            Some(ProgressStatus::Completed)
            | Some(ProgressStatus::Error)
            | Some(ProgressStatus::CodeReview) => TaskState::Terminal { passes: false },
        },
    }
}
