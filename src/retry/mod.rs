//! Batch failure policy.
//!
//! After a batch is reconciled, its results split into success-like
//! (completed, code-review) and failure-like (blocked, error) task states.
//! Failures go to an interactive prompt: retry them all, skip them, or quit
//! the run. In non-interactive mode (explicit flag, `CI` set, or no attended
//! terminal) a configured default applies without prompting.

use clap::ValueEnum;
use console::Term;

use crate::error::OrchestratorResult;
use crate::store::ProgressStatus;

/// What to do with a batch's failed tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FailAction {
    /// Leave the failures for manual follow-up and keep going.
    Skip,
    /// Re-enqueue the failed tasks at the front of the wave queue.
    Retry,
    /// Stop the run immediately.
    Quit,
}

/// A recorded progress status counts as success when the task ended in a
/// completed or reviewable state. Everything else, blocked included, needs
/// a decision.
pub fn is_success_like(status: ProgressStatus) -> bool {
    matches!(
        status,
        ProgressStatus::Completed | ProgressStatus::CodeReview
    )
}

#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    pub non_interactive: bool,
    pub default_action: FailAction,
}

impl RetryPolicy {
    pub fn new(non_interactive: bool, default_action: FailAction) -> Self {
        Self {
            non_interactive,
            default_action,
        }
    }

    /// Detect non-interactive mode: the explicit flag, the `CI` environment
    /// variable, or an unattended terminal.
    pub fn detect(flag: bool, default_action: FailAction) -> Self {
        let non_interactive = resolve_non_interactive(
            flag,
            std::env::var_os("CI").is_some(),
            console::user_attended(),
        );
        Self::new(non_interactive, default_action)
    }

    /// Decide what happens to this batch's failures. No failures means no
    /// decision to make.
    pub fn decide(&self, failures: &[String]) -> OrchestratorResult<FailAction> {
        if failures.is_empty() {
            return Ok(FailAction::Skip);
        }
        if self.non_interactive {
            tracing::info!(
                action = ?self.default_action,
                count = failures.len(),
                "non-interactive mode, applying default failure action"
            );
            return Ok(self.default_action);
        }
        prompt_action(failures)
    }
}

fn resolve_non_interactive(flag: bool, ci_set: bool, attended: bool) -> bool {
    flag || ci_set || !attended
}

fn prompt_action(failures: &[String]) -> OrchestratorResult<FailAction> {
    let term = Term::stderr();
    term.write_line(&format!(
        "{} task(s) did not finish cleanly: {}",
        failures.len(),
        failures.join(", ")
    ))?;
    loop {
        term.write_line("[r]etry all, [s]kip, or [q]uit?")?;
        let answer = term.read_line()?;
        match answer.trim().to_ascii_lowercase().as_str() {
            "r" | "retry" => return Ok(FailAction::Retry),
            "s" | "skip" | "" => return Ok(FailAction::Skip),
            "q" | "quit" => return Ok(FailAction::Quit),
            other => term.write_line(&format!("did not understand {:?}", other))?,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_like_states() {
        assert!(is_success_like(ProgressStatus::Completed));
        assert!(is_success_like(ProgressStatus::CodeReview));
        assert!(!is_success_like(ProgressStatus::Blocked));
        assert!(!is_success_like(ProgressStatus::Error));
        assert!(!is_success_like(ProgressStatus::Running));
    }

    #[test]
    fn test_non_interactive_resolution() {
        assert!(resolve_non_interactive(true, false, true));
        assert!(resolve_non_interactive(false, true, true));
        assert!(resolve_non_interactive(false, false, false));
        assert!(!resolve_non_interactive(false, false, true));
    }

    #[test]
    fn test_no_failures_needs_no_decision() {
        let policy = RetryPolicy::new(false, FailAction::Quit);
        let action = policy.decide(&[]).expect("decide");
        assert_eq!(action, FailAction::Skip);
    }

    #[test]
    fn test_non_interactive_applies_default() {
        let policy = RetryPolicy::new(true, FailAction::Retry);
        let action = policy
            .decide(&["build-api".to_string()])
            .expect("decide");
        assert_eq!(action, FailAction::Retry);
    }
}
