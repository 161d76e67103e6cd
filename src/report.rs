//! Run narrative printed to stdout.
//!
//! Everything a user reads during a run comes through here: the startup
//! header, wave banners, per-task verdict lines, gate results, and the final
//! summary. Diagnostics and warnings stay on stderr via `tracing` so stdout
//! remains a clean transcript of the run.

use std::time::Duration;

use owo_colors::OwoColorize;

use crate::store::progress::ProgressStore;
use crate::store::tasks::{Task, TaskBoard};
use crate::transcript::{WorkerOutput, WorkerStatus};
use crate::verify::GateReport;
use crate::waves::{self, DisplayStatus, FIRST_WAVE, LAST_WAVE};

/// Counters accumulated across every batch of a run.
#[derive(Debug, Default, Clone)]
pub struct RunSummary {
    pub passed: usize,
    pub failed: usize,
    pub blocked: usize,
    /// Total tokens across every agent turn in the run, both phases.
    pub tokens: u64,
}

impl RunSummary {
    pub fn record(&mut self, output: &WorkerOutput) {
        match output.status {
            WorkerStatus::Success => self.passed += 1,
            WorkerStatus::Blocked => self.blocked += 1,
            WorkerStatus::Error | WorkerStatus::Unknown => self.failed += 1,
        }
        self.tokens += output.tokens_used.iter().sum::<u64>();
    }

    pub fn total(&self) -> usize {
        self.passed + self.failed + self.blocked
    }
}

/// Stdout reporter. Colors follow the terminal unless overridden.
pub struct Reporter {
    use_colors: bool,
}

impl Default for Reporter {
    fn default() -> Self {
        Self::new()
    }
}

impl Reporter {
    pub fn new() -> Self {
        Self {
            use_colors: console::colors_enabled(),
        }
    }

    pub fn with_colors(use_colors: bool) -> Self {
        Self { use_colors }
    }

    /// Startup banner.
    pub fn run_header(&self, board: &TaskBoard, pending: usize, parallel: usize, dry_run: bool) {
        println!();
        println!("{}", self.style_header("crew run"));
        println!("  {} {}", self.style_dim("Project:"), board.project);
        if let Some(kind) = &board.project_type {
            println!("  {} {}", self.style_dim("Type:"), kind);
        }
        println!(
            "  {} {} total, {} pending",
            self.style_dim("Tasks:"),
            board.tasks.len(),
            pending
        );
        println!("  {} {}", self.style_dim("Parallel:"), parallel);
        if dry_run {
            println!(
                "  {}",
                self.style_blocked("Dry run: no agents will be launched")
            );
        }
    }

    pub fn wave_banner(&self, wave: u8, count: usize) {
        let categories: Vec<&str> = waves::wave_categories(wave)
            .iter()
            .map(|category| category.as_str())
            .collect();
        println!();
        println!(
            "{} {} ({} task{})",
            self.style_header(&format!("Wave {}", wave)),
            self.style_dim(&categories.join("/")),
            count,
            if count == 1 { "" } else { "s" },
        );
    }

    /// One line per task a dry run would have launched.
    pub fn dry_run_task(&self, task: &Task, role: &str) {
        println!(
            "  {} {} {}",
            self.style_dim("plan"),
            task.name,
            self.style_dim(&format!("({}, {})", task.category.as_str(), role)),
        );
    }

    /// Verdict line for one finished task.
    pub fn task_line(&self, output: &WorkerOutput, tdd: bool) {
        let verdict = match output.status {
            WorkerStatus::Success => self.style_pass("PASS   "),
            WorkerStatus::Blocked => self.style_blocked("BLOCKED"),
            WorkerStatus::Error | WorkerStatus::Unknown => self.style_fail("FAIL   "),
        };
        let mut detail: Vec<String> = Vec::new();
        if let Some(ms) = output.duration_ms {
            detail.push(format_duration(Duration::from_millis(ms)));
        }
        if let Some(tokens) = output.final_tokens() {
            detail.push(format!("{} tokens", tokens));
        }
        if tdd {
            detail.push("tdd".to_string());
        }
        let suffix = if detail.is_empty() {
            String::new()
        } else {
            format!(" ({})", detail.join(", "))
        };
        println!(
            "  {} {}{}",
            verdict,
            output.task_name,
            self.style_dim(&suffix)
        );
        if let Some(error) = &output.error {
            println!("          {} {}", self.style_fail("reason:"), error);
        }
    }

    /// Gate results for one wave.
    pub fn gate_report(&self, report: &GateReport) {
        if report.is_empty() {
            return;
        }
        println!();
        println!("{}", self.style_header("Verification"));
        for result in &report.results {
            let verdict = if result.passed {
                self.style_pass("ok    ")
            } else {
                self.style_fail("failed")
            };
            println!(
                "  {} {} {}",
                verdict,
                result.name,
                self.style_dim(&format!(
                    "({}, {})",
                    result.command,
                    format_duration(result.duration)
                )),
            );
            if let Some(tail) = &result.tail {
                for line in last_lines(tail, 6) {
                    println!("          {}", self.style_dim(line));
                }
            }
        }
    }

    pub fn run_summary(&self, summary: &RunSummary, elapsed: Duration) {
        println!();
        println!("{}", self.style_header("Run complete"));
        println!(
            "  {} {} passed, {} failed, {} blocked",
            self.style_dim("Tasks:"),
            summary.passed,
            summary.failed,
            summary.blocked
        );
        println!("  {} {}", self.style_dim("Tokens:"), summary.tokens);
        println!(
            "  {} {}",
            self.style_dim("Elapsed:"),
            format_duration(elapsed)
        );
    }

    pub fn nothing_to_do(&self) {
        println!(
            "{}",
            self.style_dim("Nothing to run: every task is completed, in review, or blocked.")
        );
    }

    /// Read-only board view for `crew status`.
    pub fn status_table(&self, board: &TaskBoard, progress: &ProgressStore) {
        println!();
        println!(
            "{} {}",
            self.style_header(&board.project),
            self.style_dim(board.project_type.as_deref().unwrap_or("")),
        );

        for wave in FIRST_WAVE..=LAST_WAVE {
            let tasks: Vec<&Task> = board
                .tasks
                .iter()
                .filter(|task| task.category.wave() == wave)
                .collect();
            if tasks.is_empty() {
                continue;
            }
            let categories: Vec<&str> = waves::wave_categories(wave)
                .iter()
                .map(|category| category.as_str())
                .collect();
            println!();
            println!(
                "{} {}",
                self.style_header(&format!("Wave {}", wave)),
                self.style_dim(&categories.join("/")),
            );
            for task in tasks {
                let status = waves::task_status(task, progress.entry(&task.name));
                // Pad before styling so escape codes do not skew the column.
                let label = format!("{:<12}", status.as_str());
                println!(
                    "  {} {}",
                    self.style_status(&label, status),
                    task.name
                );
            }
        }

        let mut counts: Vec<(DisplayStatus, usize)> = [
            DisplayStatus::Completed,
            DisplayStatus::CodeReview,
            DisplayStatus::InProgress,
            DisplayStatus::Blocked,
            DisplayStatus::Pending,
        ]
        .into_iter()
        .map(|status| (status, 0))
        .collect();
        for task in &board.tasks {
            let status = waves::task_status(task, progress.entry(&task.name));
            if let Some(slot) = counts.iter_mut().find(|(s, _)| *s == status) {
                slot.1 += 1;
            }
        }
        let parts: Vec<String> = counts
            .iter()
            .filter(|(_, count)| *count > 0)
            .map(|(status, count)| format!("{} {}", count, status.as_str()))
            .collect();
        println!();
        println!("  {} {}", self.style_dim("Summary:"), parts.join(", "));
    }

    // Style helpers
    fn style_header(&self, text: &str) -> String {
        if self.use_colors {
            text.bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn style_dim(&self, text: &str) -> String {
        if self.use_colors {
            text.dimmed().to_string()
        } else {
            text.to_string()
        }
    }

    fn style_pass(&self, text: &str) -> String {
        if self.use_colors {
            text.green().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn style_fail(&self, text: &str) -> String {
        if self.use_colors {
            text.red().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn style_blocked(&self, text: &str) -> String {
        if self.use_colors {
            text.yellow().bold().to_string()
        } else {
            text.to_string()
        }
    }

    fn style_status(&self, text: &str, status: DisplayStatus) -> String {
        if !self.use_colors {
            return text.to_string();
        }
        match status {
            DisplayStatus::Completed => text.green().to_string(),
            DisplayStatus::CodeReview => text.cyan().to_string(),
            DisplayStatus::InProgress => text.blue().to_string(),
            DisplayStatus::Blocked => text.yellow().to_string(),
            DisplayStatus::Pending => text.dimmed().to_string(),
        }
    }
}

/// `1.2s`, `45s`, `3m 12s`.
pub fn format_duration(duration: Duration) -> String {
    let secs = duration.as_secs();
    if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs >= 10 {
        format!("{}s", secs)
    } else {
        let tenths = duration.as_millis() / 100;
        format!("{}.{}s", tenths / 10, tenths % 10)
    }
}

fn last_lines(text: &str, keep: usize) -> Vec<&str> {
    let lines: Vec<&str> = text.lines().collect();
    let start = lines.len().saturating_sub(keep);
    lines[start..].to_vec()
}
