//! Task board store.
//!
//! Tasks are authored externally (by hand or by a planning tool); this
//! subsystem only ever flips a task's `passes` flag. Serde attributes match
//! the camelCase JSON the board viewer reads.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, OrchestratorResult};

/// Work category. Determines which wave a task runs in and which agent role
/// implements it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Data,
    Config,
    Api,
    Integration,
    Ui,
    Testing,
}

impl Category {
    /// Fixed wave ordering: foundations first, tests last.
    pub fn wave(&self) -> u8 {
        match self {
            Category::Data | Category::Config => 1,
            Category::Api => 2,
            Category::Integration => 3,
            Category::Ui => 4,
            Category::Testing => 5,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Category::Data => "data",
            Category::Config => "config",
            Category::Api => "api",
            Category::Integration => "integration",
            Category::Ui => "ui",
            Category::Testing => "testing",
        }
    }

    /// Whether tasks in this category get a test-authoring pre-phase.
    /// Testing tasks write tests already, so they skip it.
    pub fn wants_tdd_phase(&self) -> bool {
        !matches!(self, Category::Testing)
    }
}

/// One unit of work on the board.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub name: String,
    pub category: Category,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub steps: Vec<String>,
    #[serde(default)]
    pub passes: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_by: Option<Vec<String>>,
}

impl Task {
    /// The task names this task waits on. Empty when unblocked.
    pub fn blockers(&self) -> &[String] {
        self.blocked_by.as_deref().unwrap_or(&[])
    }
}

/// The task store document.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaskBoard {
    #[serde(default)]
    pub project: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_type: Option<String>,
    #[serde(default)]
    pub tasks: Vec<Task>,
}

impl TaskBoard {
    /// Load the board from disk. A missing file is a structural error; the
    /// orchestrator has nothing to run without it.
    pub fn load(path: &Path) -> OrchestratorResult<Self> {
        if !path.exists() {
            return Err(OrchestratorError::MissingTaskStore(path.to_path_buf()));
        }
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|source| OrchestratorError::InvalidStore {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn task(&self, name: &str) -> Option<&Task> {
        self.tasks.iter().find(|task| task.name == name)
    }

    pub fn task_mut(&mut self, name: &str) -> Option<&mut Task> {
        self.tasks.iter_mut().find(|task| task.name == name)
    }
}
