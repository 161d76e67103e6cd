//! External agent process launch and completion wait.
//!
//! A job is one invocation of the agent binary: prompt on standard input,
//! transcript streamed to a file on standard output, stderr captured
//! separately. The process exit code is not trusted as a verdict; the
//! transcript's terminal `result` event is, and stdout flushing can lag
//! process exit, so completion is "process exited AND the transcript file
//! contains a result event" with a bounded poll for the second half.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::config::ProjectConfig;
use crate::error::OrchestratorResult;

/// How the agent binary is invoked. The defaults match the `claude` CLI:
/// print mode, unattended, structured line output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentCommand {
    pub program: String,
    pub args: Vec<String>,
}

impl Default for AgentCommand {
    fn default() -> Self {
        Self {
            program: "claude".to_string(),
            args: vec![
                "-p".to_string(),
                "--dangerously-skip-permissions".to_string(),
                "--verbose".to_string(),
                "--output-format".to_string(),
                "stream-json".to_string(),
            ],
        }
    }
}

impl AgentCommand {
    /// Defaults with any project-config overrides applied.
    pub fn from_config(config: &ProjectConfig) -> Self {
        let mut command = Self::default();
        if let Some(program) = &config.agent.program {
            command.program = program.clone();
        }
        if let Some(args) = &config.agent.args {
            command.args = args.clone();
        }
        command
    }
}

/// Bounded wait for the transcript file to carry the terminal result event.
#[derive(Debug, Clone, Copy)]
pub struct PollConfig {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(10),
            interval: Duration::from_millis(250),
        }
    }
}

/// Where one job's prompt, transcript, and stderr land.
#[derive(Debug, Clone)]
pub struct JobPaths {
    pub prompt: PathBuf,
    pub transcript: PathBuf,
    pub stderr: PathBuf,
}

impl JobPaths {
    /// `<task>.prompt.md` / `<task>.jsonl` / `<task>.stderr.log` under the
    /// logs directory, with a `.tdd` infix for test-phase jobs.
    pub fn new(logs_dir: &Path, task_name: &str, test_phase: bool) -> Self {
        let mut stem = sanitize_name(task_name);
        if test_phase {
            stem.push_str(".tdd");
        }
        Self {
            prompt: logs_dir.join(format!("{}.prompt.md", stem)),
            transcript: logs_dir.join(format!("{}.jsonl", stem)),
            stderr: logs_dir.join(format!("{}.stderr.log", stem)),
        }
    }
}

fn sanitize_name(name: &str) -> String {
    name.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect()
}

/// Run one agent job to completion and return the raw transcript text.
///
/// The caller decides what the transcript means; spawn and I/O failures
/// surface as errors, a cleanly-exited agent that reported a failure does
/// not.
pub async fn run_job(
    command: &AgentCommand,
    project_dir: &Path,
    prompt: &str,
    paths: &JobPaths,
    poll: PollConfig,
) -> OrchestratorResult<String> {
    if let Some(parent) = paths.prompt.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    tokio::fs::write(&paths.prompt, prompt).await?;

    let transcript_file = std::fs::File::create(&paths.transcript)?;
    let stderr_file = std::fs::File::create(&paths.stderr)?;

    let mut child = Command::new(&command.program)
        .args(&command.args)
        .current_dir(project_dir)
        .stdin(Stdio::piped())
        .stdout(Stdio::from(transcript_file))
        .stderr(Stdio::from(stderr_file))
        .spawn()?;

    if let Some(mut stdin) = child.stdin.take() {
        stdin.write_all(prompt.as_bytes()).await?;
        stdin.shutdown().await?;
    }

    let status = child.wait().await?;
    if !status.success() {
        tracing::debug!(
            program = %command.program,
            code = ?status.code(),
            "agent exited non-zero; transcript decides the verdict"
        );
    }

    wait_for_result_event(&paths.transcript, poll).await
}

/// Re-read the transcript until a terminal result event shows up or the
/// timeout lapses. On timeout whatever is on disk is returned; the parser
/// reports the missing result event.
async fn wait_for_result_event(path: &Path, poll: PollConfig) -> OrchestratorResult<String> {
    let deadline = tokio::time::Instant::now() + poll.timeout;
    loop {
        let raw = tokio::fs::read_to_string(path).await.unwrap_or_default();
        if raw.contains("\"type\":\"result\"") || raw.contains("\"type\": \"result\"") {
            return Ok(raw);
        }
        if tokio::time::Instant::now() >= deadline {
            return Ok(raw);
        }
        tokio::time::sleep(poll.interval).await;
    }
}
