//! Store reconciliation.
//!
//! Every mutation of `tasks.json` and `progress.json` during a run goes
//! through this module: marking a task running before its implementation job
//! launches, recording the test-authoring phase, and folding a normalized
//! worker output into the stores when a job finishes. The passes flag on the
//! board flips one way only, and only on evidence: an explicit verification
//! verdict when the transcript carried one, plain success otherwise.

use std::path::{Path, PathBuf};

use crate::error::OrchestratorResult;
use crate::store::atomic::update_store;
use crate::store::{
    now_timestamp, ProgressStatus, ProgressStore, TaskBoard, PROGRESS_FILE, TASKS_FILE,
};
use crate::transcript::{ParsedTranscript, WorkerOutput, WorkerStatus};

fn progress_path(project_dir: &Path) -> PathBuf {
    project_dir.join(PROGRESS_FILE)
}

fn tasks_path(project_dir: &Path) -> PathBuf {
    project_dir.join(TASKS_FILE)
}

/// Progress status a normalized worker status maps to. Success lands in
/// code-review, not completed: the work exists but nobody has reviewed it.
pub fn progress_status_for(status: WorkerStatus) -> ProgressStatus {
    match status {
        WorkerStatus::Success => ProgressStatus::CodeReview,
        WorkerStatus::Blocked => ProgressStatus::Blocked,
        WorkerStatus::Error | WorkerStatus::Unknown => ProgressStatus::Error,
    }
}

/// Durably mark a task running under the given agent before its
/// implementation job launches. Test-phase fields already on the entry are
/// preserved; a stale completion timestamp from an earlier attempt is
/// cleared.
pub async fn mark_running(
    project_dir: &Path,
    task_name: &str,
    agent: &str,
) -> OrchestratorResult<()> {
    let path = progress_path(project_dir);
    update_store(&path, ProgressStore::load, |store: &mut ProgressStore| {
        let entry = store.entry_mut(task_name);
        entry.status = Some(ProgressStatus::Running);
        entry.agent = Some(agent.to_string());
        if entry.started_at.is_none() {
            entry.started_at = Some(now_timestamp());
        }
        entry.completed_at = None;
    })
    .await?;
    Ok(())
}

/// Record a finished phase A (test-authoring) job: which agent wrote the
/// tests, which files it produced, and its token series. The files feed the
/// phase B prompt; the tokens open the entry's per-turn series.
pub async fn record_test_phase(
    project_dir: &Path,
    task_name: &str,
    tdd_agent: &str,
    parsed: &ParsedTranscript,
) -> OrchestratorResult<()> {
    let path = progress_path(project_dir);
    let log_line = work_log_line("test phase", parsed.status, parsed.summary.as_deref());
    update_store(&path, ProgressStore::load, |store: &mut ProgressStore| {
        let entry = store.entry_mut(task_name);
        entry.tdd_agent = Some(tdd_agent.to_string());
        if entry.started_at.is_none() {
            entry.started_at = Some(now_timestamp());
        }
        for file in &parsed.affected_files {
            if !entry.tdd_affected_files.contains(file) {
                entry.tdd_affected_files.push(file.clone());
            }
        }
        entry.tokens_used.extend(parsed.tokens_used.iter().copied());
        entry.work_log.push(log_line.clone());
    })
    .await?;
    Ok(())
}

/// Fold one normalized worker output into the stores and return the progress
/// status that was recorded. The progress entry is updated first;
/// `tasks.json` is rewritten only when the passes flag actually flips.
pub async fn apply_output(
    project_dir: &Path,
    output: &WorkerOutput,
) -> OrchestratorResult<ProgressStatus> {
    let status = progress_status_for(output.status);
    let path = progress_path(project_dir);
    let log_line = work_log_line(
        "implementation",
        output.status,
        output.error.as_deref().or(output
            .work_log
            .first()
            .map(|line| line.as_str())),
    );

    update_store(&path, ProgressStore::load, |store: &mut ProgressStore| {
        let entry = store.entry_mut(&output.task_name);
        entry.status = Some(status);
        if let Some(agent) = &output.agent {
            entry.agent = Some(agent.clone());
        }
        if entry.started_at.is_none() {
            entry.started_at = output.started_at.clone();
        }
        entry.completed_at = output
            .completed_at
            .clone()
            .or_else(|| Some(now_timestamp()));
        for line in &output.work_log {
            entry.work_log.push(line.clone());
        }
        entry.work_log.push(log_line.clone());
        for file in &output.affected_files {
            if !entry.affected_files.contains(file) {
                entry.affected_files.push(file.clone());
            }
        }
        entry.tokens_used.extend(output.tokens_used.iter().copied());
    })
    .await?;

    if flips_passes(output) {
        let board_path = tasks_path(project_dir);
        update_store(&board_path, TaskBoard::load, |board: &mut TaskBoard| {
            if let Some(task) = board.task_mut(&output.task_name) {
                task.passes = true;
            }
        })
        .await?;
    }

    Ok(status)
}

/// Whether this output earns the task its passes flag: the explicit
/// verification verdict when present, otherwise plain success.
fn flips_passes(output: &WorkerOutput) -> bool {
    match &output.verification {
        Some(verification) => verification.passed,
        None => output.status == WorkerStatus::Success,
    }
}

fn work_log_line(phase: &str, status: WorkerStatus, detail: Option<&str>) -> String {
    let detail = detail
        .and_then(|text| text.lines().next())
        .unwrap_or("no summary");
    let detail: String = detail.chars().take(160).collect();
    format!("[{}] {} {}: {}", now_timestamp(), phase, status.as_str(), detail)
}
