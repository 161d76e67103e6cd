//! Post-wave verification gate.
//!
//! Agents report their own success; the gate does not take their word for
//! it. After each wave it runs the project's type-check, lint auto-fix,
//! lint, and test commands and records pass/fail per command, with the
//! trailing output kept for failures. Commands come from `crew.json`
//! overrides, falling back to what the project's marker files suggest.

use std::path::Path;
use std::time::Duration;

use tokio::process::Command;

use crate::config::ProjectConfig;

/// One resolved gate command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateCommand {
    /// Slot name: `typecheck`, `lint-fix`, `lint`, or `test`.
    pub name: &'static str,
    pub command: String,
}

/// Outcome of one gate command.
#[derive(Debug, Clone)]
pub struct GateResult {
    pub name: &'static str,
    pub command: String,
    pub passed: bool,
    pub duration: Duration,
    /// Trailing combined output, kept only for failures.
    pub tail: Option<String>,
}

/// Outcome of the whole gate.
#[derive(Debug, Clone, Default)]
pub struct GateReport {
    pub results: Vec<GateResult>,
}

impl GateReport {
    pub fn passed(&self) -> bool {
        self.results.iter().all(|result| result.passed)
    }

    pub fn failed_names(&self) -> Vec<&'static str> {
        self.results
            .iter()
            .filter(|result| !result.passed)
            .map(|result| result.name)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Resolve the four gate slots: explicit override first, then stack
/// heuristics. Slots that resolve to nothing are skipped.
pub fn resolve_commands(config: &ProjectConfig, project_dir: &Path) -> Vec<GateCommand> {
    let fallback = detect_commands(project_dir);
    let overrides = &config.verification;

    let slots = [
        ("typecheck", overrides.typecheck.clone(), fallback.typecheck),
        ("lint-fix", overrides.lint_fix.clone(), fallback.lint_fix),
        ("lint", overrides.lint.clone(), fallback.lint),
        ("test", overrides.test.clone(), fallback.test),
    ];

    slots
        .into_iter()
        .filter_map(|(name, configured, detected)| {
            configured.or(detected).map(|command| GateCommand { name, command })
        })
        .collect()
}

#[derive(Debug, Default)]
struct DetectedCommands {
    typecheck: Option<String>,
    lint_fix: Option<String>,
    lint: Option<String>,
    test: Option<String>,
}

fn detect_commands(project_dir: &Path) -> DetectedCommands {
    if project_dir.join("package.json").exists() {
        return node_commands(project_dir);
    }
    if project_dir.join("Cargo.toml").exists() {
        return DetectedCommands {
            typecheck: Some("cargo check".to_string()),
            lint_fix: Some("cargo fmt".to_string()),
            lint: Some("cargo clippy -- -D warnings".to_string()),
            test: Some("cargo test".to_string()),
        };
    }
    if project_dir.join("pyproject.toml").exists() {
        return python_commands(project_dir);
    }
    DetectedCommands::default()
}

fn node_commands(project_dir: &Path) -> DetectedCommands {
    let scripts = std::fs::read_to_string(project_dir.join("package.json"))
        .ok()
        .and_then(|raw| serde_json::from_str::<serde_json::Value>(&raw).ok())
        .and_then(|manifest| manifest.get("scripts").cloned())
        .and_then(|scripts| scripts.as_object().cloned())
        .unwrap_or_default();

    let has = |name: &str| scripts.contains_key(name);

    DetectedCommands {
        typecheck: if has("typecheck") {
            Some("npm run typecheck".to_string())
        } else if project_dir.join("tsconfig.json").exists() {
            Some("npx tsc --noEmit".to_string())
        } else {
            None
        },
        lint_fix: has("lint:fix").then(|| "npm run lint:fix".to_string()),
        lint: has("lint").then(|| "npm run lint".to_string()),
        test: has("test").then(|| "npm test".to_string()),
    }
}

fn python_commands(project_dir: &Path) -> DetectedCommands {
    let raw = std::fs::read_to_string(project_dir.join("pyproject.toml")).unwrap_or_default();
    DetectedCommands {
        typecheck: raw.contains("mypy").then(|| "mypy .".to_string()),
        lint_fix: Some("ruff check --fix .".to_string()),
        lint: Some("ruff check .".to_string()),
        test: Some("pytest".to_string()),
    }
}

/// Run every gate command sequentially and record each result independently.
pub async fn run_gate(
    commands: &[GateCommand],
    project_dir: &Path,
    timeout: Duration,
) -> GateReport {
    let mut report = GateReport::default();
    for gate in commands {
        tracing::info!(name = gate.name, command = %gate.command, "running verification command");
        let result = run_command(gate, project_dir, timeout).await;
        if !result.passed {
            tracing::warn!(name = result.name, command = %result.command, "verification command failed");
        }
        report.results.push(result);
    }
    report
}

async fn run_command(gate: &GateCommand, project_dir: &Path, timeout: Duration) -> GateResult {
    let started = std::time::Instant::now();
    let output = tokio::time::timeout(
        timeout,
        shell_command(&gate.command).current_dir(project_dir).output(),
    )
    .await;

    let (passed, tail) = match output {
        Ok(Ok(output)) if output.status.success() => (true, None),
        Ok(Ok(output)) => {
            let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
            combined.push_str(&String::from_utf8_lossy(&output.stderr));
            (false, Some(tail_of(&combined, 2000)))
        }
        Ok(Err(err)) => (false, Some(format!("failed to run: {}", err))),
        Err(_) => (
            false,
            Some(format!("timed out after {}s", timeout.as_secs())),
        ),
    };

    GateResult {
        name: gate.name,
        command: gate.command.clone(),
        passed,
        duration: started.elapsed(),
        tail,
    }
}

fn shell_command(command: &str) -> Command {
    #[cfg(windows)]
    {
        let mut shell = Command::new("cmd");
        shell.arg("/C").arg(command);
        shell
    }
    #[cfg(not(windows))]
    {
        let mut shell = Command::new("sh");
        shell.arg("-c").arg(command);
        shell
    }
}

fn tail_of(text: &str, max: usize) -> String {
    let trimmed = text.trim_end();
    if trimmed.len() <= max {
        return trimmed.to_string();
    }
    let mut start = trimmed.len() - max;
    while start < trimmed.len() && !trimmed.is_char_boundary(start) {
        start += 1;
    }
    trimmed[start..].to_string()
}
