//! Batch job scheduling.
//!
//! A batch is a slice of ready tasks, at most `parallel` of them. Tasks whose
//! category calls for test-first work get a phase A test-authoring job; the
//! whole phase A sub-batch completes before any phase B implementation job
//! launches, because phase B prompts embed the test files phase A wrote.
//! Every task is durably marked running before its implementation job starts,
//! so a crash mid-batch leaves honest state behind.
//!
//! Jobs run concurrently under a semaphore bound and the batch joins on all
//! of them at once. Per-job failures (spawn errors, panics, store contention)
//! become error outputs for that task; they never abort the batch.

pub mod job;
pub mod prompt;
pub mod roles;

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;

use crate::error::OrchestratorResult;
use crate::reconcile;
use crate::store::{now_timestamp, Task};
use crate::transcript::{ParsedTranscript, TranscriptParser, WorkerOutput, WorkerStatus};

pub use job::{AgentCommand, JobPaths, PollConfig};
pub use roles::{detect_stack, RoleTable, StackSignals, FALLBACK_ROLE, TEST_AUTHOR_ROLE};

/// Default number of concurrent agent processes.
pub const DEFAULT_PARALLEL: usize = 3;

#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    pub project_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub project_name: String,
    pub parallel: usize,
    pub agent: AgentCommand,
    pub poll: PollConfig,
}

impl SchedulerConfig {
    pub fn new(project_dir: impl Into<PathBuf>, project_name: impl Into<String>) -> Self {
        let project_dir = project_dir.into();
        Self {
            logs_dir: project_dir.join(".crew").join("logs"),
            project_dir,
            project_name: project_name.into(),
            parallel: DEFAULT_PARALLEL,
            agent: AgentCommand::default(),
            poll: PollConfig::default(),
        }
    }

    pub fn with_parallel(mut self, parallel: usize) -> Self {
        self.parallel = parallel.max(1);
        self
    }

    pub fn with_agent(mut self, agent: AgentCommand) -> Self {
        self.agent = agent;
        self
    }

    pub fn with_logs_dir(mut self, logs_dir: impl Into<PathBuf>) -> Self {
        self.logs_dir = logs_dir.into();
        self
    }

    pub fn with_poll(mut self, poll: PollConfig) -> Self {
        self.poll = poll;
        self
    }
}

/// Runs batches of agent jobs and turns their transcripts into worker
/// outputs.
pub struct Scheduler {
    config: SchedulerConfig,
    semaphore: Arc<Semaphore>,
    parser: TranscriptParser,
}

impl Scheduler {
    pub fn new(config: SchedulerConfig) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(config.parallel.max(1))),
            parser: TranscriptParser::new(config.project_dir.display().to_string()),
            config,
        }
    }

    /// Run one batch to completion: phase A for every test-first task, then
    /// phase B for all of them. Returns one output per task.
    pub async fn run_batch(&self, tasks: &[Task], roles: &RoleTable) -> Vec<WorkerOutput> {
        let tdd_files = self.run_test_phase(tasks).await;
        self.run_implementation_phase(tasks, roles, &tdd_files).await
    }

    /// Phase A: concurrent test-authoring jobs for every category that wants
    /// them. Failures here degrade the run (phase B proceeds without tests)
    /// rather than failing the task outright.
    async fn run_test_phase(&self, tasks: &[Task]) -> HashMap<String, Vec<String>> {
        let candidates: Vec<&Task> = tasks
            .iter()
            .filter(|task| task.category.wants_tdd_phase())
            .collect();
        if candidates.is_empty() {
            return HashMap::new();
        }
        tracing::info!(count = candidates.len(), "launching test-authoring jobs");

        let mut handles = Vec::new();
        for task in &candidates {
            let prompt = prompt::render_test_prompt(task, &self.config.project_name);
            let paths = JobPaths::new(&self.config.logs_dir, &task.name, true);
            handles.push(self.spawn_job(prompt, paths));
        }

        let mut tdd_files = HashMap::new();
        for (task, joined) in candidates.iter().zip(join_all(handles).await) {
            let parsed = match joined {
                Ok(Ok(raw)) => self.parser.parse(&raw),
                Ok(Err(err)) => {
                    tracing::warn!(task = %task.name, error = %err, "test-authoring job failed to run");
                    continue;
                }
                Err(err) => {
                    tracing::warn!(task = %task.name, error = %err, "test-authoring job panicked");
                    continue;
                }
            };
            if parsed.status != WorkerStatus::Success {
                tracing::warn!(
                    task = %task.name,
                    status = parsed.status.as_str(),
                    "test-authoring job did not succeed; implementation proceeds without its tests"
                );
            }
            if let Err(err) = reconcile::record_test_phase(
                &self.config.project_dir,
                &task.name,
                TEST_AUTHOR_ROLE,
                &parsed,
            )
            .await
            {
                tracing::warn!(task = %task.name, error = %err, "could not record test phase");
            }
            tdd_files.insert(task.name.clone(), parsed.affected_files);
        }
        tdd_files
    }

    /// Phase B: mark each task running, then launch all implementation jobs
    /// concurrently and join on the lot.
    async fn run_implementation_phase(
        &self,
        tasks: &[Task],
        roles: &RoleTable,
        tdd_files: &HashMap<String, Vec<String>>,
    ) -> Vec<WorkerOutput> {
        let mut outputs = Vec::new();
        let mut launched: Vec<(&Task, &str, String)> = Vec::new();
        let mut handles = Vec::new();

        for task in tasks {
            let role = roles.implementation_role(task.category);
            let started_at = now_timestamp();

            if let Err(err) = reconcile::mark_running(&self.config.project_dir, &task.name, role).await
            {
                tracing::warn!(task = %task.name, error = %err, "could not mark task running; not launching");
                outputs.push(failure_output(
                    task,
                    role,
                    started_at,
                    format!("could not mark task running: {}", err),
                ));
                continue;
            }

            let files = tdd_files
                .get(&task.name)
                .map(|files| files.as_slice())
                .unwrap_or(&[]);
            let prompt =
                prompt::render_implementation_prompt(task, role, &self.config.project_name, files);
            let paths = JobPaths::new(&self.config.logs_dir, &task.name, false);
            tracing::info!(task = %task.name, role, "launching implementation job");

            launched.push((task, role, started_at));
            handles.push(self.spawn_job(prompt, paths));
        }

        for ((task, role, started_at), joined) in launched.into_iter().zip(join_all(handles).await)
        {
            let output = match joined {
                Ok(Ok(raw)) => output_from_parsed(task, role, started_at, self.parser.parse(&raw)),
                Ok(Err(err)) => failure_output(task, role, started_at, err.to_string()),
                Err(err) => {
                    failure_output(task, role, started_at, format!("job task panicked: {}", err))
                }
            };
            outputs.push(output);
        }
        outputs
    }

    fn spawn_job(&self, prompt: String, paths: JobPaths) -> JoinHandle<OrchestratorResult<String>> {
        let semaphore = self.semaphore.clone();
        let command = self.config.agent.clone();
        let project_dir = self.config.project_dir.clone();
        let poll = self.config.poll;
        tokio::spawn(async move {
            // The semaphore lives as long as the scheduler and is never closed.
            let _permit = semaphore.acquire_owned().await.ok();
            job::run_job(&command, &project_dir, &prompt, &paths, poll).await
        })
    }
}

fn output_from_parsed(
    task: &Task,
    role: &str,
    started_at: String,
    parsed: ParsedTranscript,
) -> WorkerOutput {
    WorkerOutput {
        task_name: task.name.clone(),
        status: parsed.status,
        started_at: Some(started_at),
        completed_at: Some(now_timestamp()),
        agent: Some(role.to_string()),
        verification: parsed.verification,
        work_log: Vec::new(),
        affected_files: parsed.affected_files,
        tokens_used: parsed.tokens_used,
        duration_ms: parsed.duration_ms,
        error: parsed.error,
    }
}

fn failure_output(task: &Task, role: &str, started_at: String, reason: String) -> WorkerOutput {
    WorkerOutput {
        task_name: task.name.clone(),
        status: WorkerStatus::Error,
        started_at: Some(started_at),
        completed_at: Some(now_timestamp()),
        agent: Some(role.to_string()),
        verification: None,
        work_log: Vec::new(),
        affected_files: Vec::new(),
        tokens_used: Vec::new(),
        duration_ms: None,
        error: Some(reason),
    }
}
