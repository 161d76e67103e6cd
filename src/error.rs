//! Error taxonomy for orchestrator runs.
//!
//! Errors fall into five classes with different blast radii: structural
//! problems abort the run before anything is scheduled, store contention is
//! retried and only escalates past the retry ceiling, task failures are
//! recorded in the progress store without stopping the batch, verification
//! failures are fatal only under fail-fast, and a policy abort is a clean
//! operator-requested exit.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// The task store file does not exist.
    #[error("task store not found at {0}")]
    MissingTaskStore(PathBuf),

    /// A store file exists but does not parse as the expected JSON shape.
    #[error("invalid store {path}: {source}")]
    InvalidStore {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The blockedBy graph contains a cycle. Carries the cycle path.
    #[error("dependency cycle: {0}")]
    DependencyCycle(String),

    /// A blockedBy entry names a task that is not on the board.
    #[error("task '{task}' is blocked by unknown task '{missing}'")]
    UnknownDependency { task: String, missing: String },

    /// A store write kept failing past the retry ceiling.
    #[error("store update for {path} failed after {attempts} attempts: {source}")]
    StoreContention {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: io::Error,
    },

    /// One task's agent invocation failed. Recorded per task, never fatal.
    #[error("task '{task}' failed: {reason}")]
    TaskExecution { task: String, reason: String },

    /// An independent verification command failed.
    #[error("verification failed: {0}")]
    Verification(String),

    /// The operator chose Quit at a retry prompt.
    #[error("aborted by operator")]
    PolicyAbort,

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

impl OrchestratorError {
    /// Structural errors abort the run before any task is scheduled.
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            OrchestratorError::MissingTaskStore(_)
                | OrchestratorError::InvalidStore { .. }
                | OrchestratorError::DependencyCycle(_)
                | OrchestratorError::UnknownDependency { .. }
        )
    }
}
