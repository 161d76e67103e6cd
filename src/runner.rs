//! Top-level run loop.
//!
//! A run walks the waves in order. Each wave is planned against freshly
//! loaded stores, executed in batches of at most `parallel` tasks, reconciled
//! into the stores, and re-planned until it yields nothing, so tasks unlocked
//! by an earlier batch in the same wave still run. A drained wave is checked
//! by the verification gate before the next one is planned. Failures inside a
//! batch go through the retry policy; structural problems and operator quits
//! abort the whole run.

use std::collections::{HashSet, VecDeque};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::advisor;
use crate::config::ProjectConfig;
use crate::error::{OrchestratorError, OrchestratorResult};
use crate::graph::DependencyGraph;
use crate::reconcile;
use crate::report::{Reporter, RunSummary};
use crate::retry::{is_success_like, FailAction, RetryPolicy};
use crate::schedule::{
    detect_stack, AgentCommand, RoleTable, Scheduler, SchedulerConfig, DEFAULT_PARALLEL,
};
use crate::store::progress::{ProgressStatus, ProgressStore};
use crate::store::tasks::{Task, TaskBoard};
use crate::store::{PROGRESS_FILE, TASKS_FILE};
use crate::verify;
use crate::waves::{self, DisplayStatus, FIRST_WAVE, LAST_WAVE};

#[derive(Debug, Clone)]
pub struct RunnerConfig {
    pub project_dir: PathBuf,
    pub parallel: usize,
    pub dry_run: bool,
    pub non_interactive: bool,
    pub on_fail: FailAction,
    pub fail_fast: bool,
    pub no_verify: bool,
}

impl RunnerConfig {
    pub fn new(project_dir: impl Into<PathBuf>) -> Self {
        Self {
            project_dir: project_dir.into(),
            parallel: DEFAULT_PARALLEL,
            dry_run: false,
            non_interactive: false,
            on_fail: FailAction::Skip,
            fail_fast: false,
            no_verify: false,
        }
    }

    pub fn with_parallel(mut self, parallel: usize) -> Self {
        self.parallel = parallel.max(1);
        self
    }

    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }
}

/// What a finished run looked like. `tasks_run` counts attempts, so a task
/// that failed once and passed on retry counts twice.
#[derive(Debug, Default)]
pub struct RunOutcome {
    pub tasks_run: usize,
    pub summary: RunSummary,
}

pub async fn run(config: RunnerConfig) -> OrchestratorResult<RunOutcome> {
    let started = Instant::now();
    let project_dir = config.project_dir.clone();

    let board = TaskBoard::load(&project_dir.join(TASKS_FILE))?;
    DependencyGraph::from_board(&board).validate()?;
    let project_config = ProjectConfig::load(&project_dir)?;

    let signals = detect_stack(&project_dir);
    let roles = RoleTable::from_signals(&signals);
    let reporter = Reporter::new();
    let retry_policy = RetryPolicy::detect(config.non_interactive, config.on_fail);

    let scheduler_config = SchedulerConfig::new(project_dir.clone(), board.project.clone())
        .with_parallel(config.parallel)
        .with_agent(AgentCommand::from_config(&project_config))
        .with_logs_dir(project_config.logs_dir(&project_dir));
    let scheduler = Scheduler::new(scheduler_config);

    let progress = ProgressStore::load(&project_dir.join(PROGRESS_FILE))?;
    let pending = board
        .tasks
        .iter()
        .filter(|task| {
            waves::task_status(task, progress.entry(&task.name)) == DisplayStatus::Pending
        })
        .count();
    reporter.run_header(&board, pending, config.parallel, config.dry_run);

    let mut outcome = RunOutcome::default();
    let mut planned = 0usize;

    for wave in FIRST_WAVE..=LAST_WAVE {
        let mut banner_shown = false;
        let mut attempted: HashSet<String> = HashSet::new();

        // A finished batch can flip passes flags that make further tasks in
        // this same wave ready, so the wave is re-planned until it yields
        // nothing. Tasks already attempted this wave are never re-planned;
        // they come back only through an explicit retry.
        loop {
            let board = TaskBoard::load(&project_dir.join(TASKS_FILE))?;
            let progress = ProgressStore::load(&project_dir.join(PROGRESS_FILE))?;
            let graph = DependencyGraph::from_board(&board);
            let eligible: Vec<&Task> = waves::tasks_for_wave(&board, &progress, &graph, wave)
                .into_iter()
                .filter(|task| !attempted.contains(&task.name))
                .collect();
            if eligible.is_empty() {
                break;
            }
            if !banner_shown {
                reporter.wave_banner(wave, eligible.len());
                banner_shown = true;
            }

            if config.dry_run {
                planned += eligible.len();
                for task in &eligible {
                    reporter.dry_run_task(task, roles.implementation_role(task.category));
                }
                break;
            }

            let mut queue: VecDeque<Task> = eligible.into_iter().cloned().collect();
            while !queue.is_empty() {
                let take = queue.len().min(config.parallel.max(1));
                let batch: Vec<Task> = queue.drain(..take).collect();
                for task in &batch {
                    attempted.insert(task.name.clone());
                }
                let outputs = scheduler.run_batch(&batch, &roles).await;

                let mut failures: Vec<String> = Vec::new();
                for output in &outputs {
                    outcome.tasks_run += 1;
                    let status = match reconcile::apply_output(&project_dir, output).await {
                        Ok(status) => status,
                        Err(err) => {
                            if err.is_structural() {
                                return Err(err);
                            }
                            tracing::warn!(task = %output.task_name, error = %err, "could not record result");
                            ProgressStatus::Error
                        }
                    };
                    let tdd = batch
                        .iter()
                        .find(|task| task.name == output.task_name)
                        .map(|task| task.category.wants_tdd_phase())
                        .unwrap_or(false);
                    reporter.task_line(output, tdd);
                    outcome.summary.record(output);
                    if !is_success_like(status) {
                        failures.push(output.task_name.clone());
                    }
                }

                if failures.is_empty() {
                    continue;
                }
                match retry_policy.decide(&failures)? {
                    FailAction::Skip => {}
                    FailAction::Retry => {
                        for name in failures.iter().rev() {
                            if let Some(task) = batch.iter().find(|task| &task.name == name) {
                                queue.push_front(task.clone());
                            }
                        }
                    }
                    FailAction::Quit => return Err(OrchestratorError::PolicyAbort),
                }
            }
        }

        if config.dry_run || !banner_shown || config.no_verify {
            continue;
        }
        let commands = verify::resolve_commands(&project_config, &project_dir);
        if commands.is_empty() {
            continue;
        }
        let report =
            verify::run_gate(&commands, &project_dir, project_config.command_timeout()).await;
        reporter.gate_report(&report);
        if !report.passed() {
            if config.fail_fast {
                return Err(OrchestratorError::Verification(format!(
                    "wave {} gate failed: {}",
                    wave,
                    report.failed_names().join(", ")
                )));
            }
            tracing::warn!(
                wave,
                failed = %report.failed_names().join(", "),
                "verification gate failed; continuing without fail-fast"
            );
        }
    }

    if config.dry_run {
        if planned == 0 {
            reporter.nothing_to_do();
        }
        return Ok(outcome);
    }
    if outcome.tasks_run == 0 {
        reporter.nothing_to_do();
        return Ok(outcome);
    }

    reporter.run_summary(&outcome.summary, started.elapsed());

    let progress = ProgressStore::load(&project_dir.join(PROGRESS_FILE))?;
    let rules = advisor::load_rules(&project_dir);
    let matches = advisor::matching_rules(&progress, &rules, &project_dir.display().to_string());
    advisor::print_next_steps(&matches);

    Ok(outcome)
}

/// Read-only board view for `crew status`.
pub fn show_status(project_dir: &Path) -> OrchestratorResult<()> {
    let board = TaskBoard::load(&project_dir.join(TASKS_FILE))?;
    let progress = ProgressStore::load(&project_dir.join(PROGRESS_FILE))?;
    Reporter::new().status_table(&board, &progress);
    Ok(())
}
