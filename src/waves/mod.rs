//! Wave planning: which tasks are eligible to run next.
//!
//! Waves are a fixed category ordering (see [`Category::wave`]), not a
//! user-defined schedule. The planner only ever selects tasks that are
//! pending and whose whole dependency closure has passed; everything else is
//! picked up on a later pass once the stores have moved.

use serde::Serialize;

use crate::graph::DependencyGraph;
use crate::store::progress::{task_state, ProgressEntry, ProgressStatus, ProgressStore, TaskState};
use crate::store::tasks::{Category, Task, TaskBoard};

pub const FIRST_WAVE: u8 = 1;
pub const LAST_WAVE: u8 = 5;

/// Derived board status for display and planning. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayStatus {
    Pending,
    InProgress,
    Blocked,
    CodeReview,
    Completed,
}

impl DisplayStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DisplayStatus::Pending => "pending",
            DisplayStatus::InProgress => "in-progress",
            DisplayStatus::Blocked => "blocked",
            DisplayStatus::CodeReview => "code-review",
            DisplayStatus::Completed => "completed",
        }
    }
}

/// Status table for one task.
///
/// A passed task shows `completed` only once a reviewer has marked the entry
/// completed; until then it sits in `code-review`. A terminal entry whose
/// task has not passed reads `in-progress`: the agent finished but
/// verification did not hold, so the task needs attention, not rescheduling.
pub fn task_status(task: &Task, entry: Option<&ProgressEntry>) -> DisplayStatus {
    match task_state(task, entry) {
        TaskState::Terminal { passes: true } => {
            let reviewed = entry
                .and_then(|entry| entry.status)
                .map(|status| status == ProgressStatus::Completed)
                .unwrap_or(false);
            if reviewed {
                DisplayStatus::Completed
            } else {
                DisplayStatus::CodeReview
            }
        }
        TaskState::Terminal { passes: false } => DisplayStatus::InProgress,
        TaskState::Running => DisplayStatus::InProgress,
        TaskState::Blocked => DisplayStatus::Blocked,
        TaskState::NoEntry => DisplayStatus::Pending,
    }
}

/// Tasks eligible to launch in `wave`: right category, still pending, every
/// transitive dependency passed. Not-ready tasks are left for the next
/// planning pass.
pub fn tasks_for_wave<'a>(
    board: &'a TaskBoard,
    progress: &ProgressStore,
    graph: &DependencyGraph<'_>,
    wave: u8,
) -> Vec<&'a Task> {
    board
        .tasks
        .iter()
        .filter(|task| task.category.wave() == wave)
        .filter(|task| task_status(task, progress.entry(&task.name)) == DisplayStatus::Pending)
        .filter(|task| graph.is_ready(&task.name))
        .collect()
}

/// Categories that belong to `wave`, for banners and the status view.
pub fn wave_categories(wave: u8) -> Vec<Category> {
    [
        Category::Data,
        Category::Config,
        Category::Api,
        Category::Integration,
        Category::Ui,
        Category::Testing,
    ]
    .into_iter()
    .filter(|category| category.wave() == wave)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task(name: &str, category: Category, passes: bool, blocked_by: &[&str]) -> Task {
        Task {
            name: name.to_string(),
            category,
            description: String::new(),
            steps: vec![],
            passes,
            blocked_by: if blocked_by.is_empty() {
                None
            } else {
                Some(blocked_by.iter().map(|s| s.to_string()).collect())
            },
        }
    }

    fn entry(status: Option<ProgressStatus>) -> ProgressEntry {
        ProgressEntry {
            status,
            ..Default::default()
        }
    }

    #[test]
    fn test_status_table_exhaustive() {
        let pending = task("t", Category::Api, false, &[]);
        let passed = task("t", Category::Api, true, &[]);

        // No entry at all.
        assert_eq!(task_status(&pending, None), DisplayStatus::Pending);

        // Passed: completed only when the entry says completed.
        assert_eq!(
            task_status(&passed, Some(&entry(Some(ProgressStatus::Completed)))),
            DisplayStatus::Completed
        );
        assert_eq!(
            task_status(&passed, Some(&entry(Some(ProgressStatus::CodeReview)))),
            DisplayStatus::CodeReview
        );
        assert_eq!(task_status(&passed, None), DisplayStatus::CodeReview);
        assert_eq!(
            task_status(&passed, Some(&entry(Some(ProgressStatus::Running)))),
            DisplayStatus::CodeReview
        );

        // Not passed: entry status drives the table.
        assert_eq!(
            task_status(&pending, Some(&entry(Some(ProgressStatus::Blocked)))),
            DisplayStatus::Blocked
        );
        assert_eq!(
            task_status(&pending, Some(&entry(Some(ProgressStatus::Running)))),
            DisplayStatus::InProgress
        );
        assert_eq!(
            task_status(&pending, Some(&entry(Some(ProgressStatus::Completed)))),
            DisplayStatus::InProgress
        );
        assert_eq!(
            task_status(&pending, Some(&entry(Some(ProgressStatus::Error)))),
            DisplayStatus::InProgress
        );
        assert_eq!(
            task_status(&pending, Some(&entry(None))),
            DisplayStatus::InProgress
        );
    }

    #[test]
    fn test_wave_selection_filters_category_status_and_readiness() {
        let board = TaskBoard {
            project: "test".to_string(),
            created: None,
            project_type: None,
            tasks: vec![
                task("schema", Category::Data, true, &[]),
                task("api-ready", Category::Api, false, &["schema"]),
                task("api-waiting", Category::Api, false, &["api-ready"]),
                task("api-running", Category::Api, false, &["schema"]),
                task("ui-later", Category::Ui, false, &["api-ready"]),
            ],
        };
        let mut progress = ProgressStore::default();
        progress.entry_mut("api-running").status = Some(ProgressStatus::Running);

        let graph = DependencyGraph::from_board(&board);
        let wave2 = tasks_for_wave(&board, &progress, &graph, 2);
        let names: Vec<&str> = wave2.iter().map(|t| t.name.as_str()).collect();

        // api-waiting is deferred (dependency not passed), api-running is
        // already owned, ui-later is in a later wave.
        assert_eq!(names, ["api-ready"]);
        assert!(tasks_for_wave(&board, &progress, &graph, 4).is_empty());
    }

    #[test]
    fn test_wave_categories_table() {
        assert_eq!(wave_categories(1), [Category::Data, Category::Config]);
        assert_eq!(wave_categories(2), [Category::Api]);
        assert_eq!(wave_categories(5), [Category::Testing]);
    }
}
