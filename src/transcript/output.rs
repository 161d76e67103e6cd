//! Normalized worker output.
//!
//! The single contract between transcript parsing and store reconciliation.
//! Whatever the agent claimed in prose, reconciliation only ever sees this.

use serde::{Deserialize, Serialize};

/// Overall outcome of one agent invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum WorkerStatus {
    Success,
    Blocked,
    Error,
    /// Nothing conclusive could be derived from the transcript.
    #[default]
    Unknown,
}

impl WorkerStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerStatus::Success => "success",
            WorkerStatus::Blocked => "blocked",
            WorkerStatus::Error => "error",
            WorkerStatus::Unknown => "unknown",
        }
    }
}

/// One verification step parsed from transcript evidence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VerificationStep {
    pub number: u32,
    pub passed: bool,
}

/// Structured verification evidence for one task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Verification {
    /// True only when at least one step was reported and none failed.
    pub passed: bool,
    pub steps: Vec<VerificationStep>,
}

impl Verification {
    pub fn from_steps(steps: Vec<VerificationStep>) -> Option<Self> {
        if steps.is_empty() {
            return None;
        }
        let passed = steps.iter().all(|step| step.passed);
        Some(Self { passed, steps })
    }
}

/// Canonical parsed summary of one task execution attempt.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerOutput {
    pub task_name: String,
    pub status: WorkerStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verification: Option<Verification>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub work_log: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub affected_files: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tokens_used: Vec<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl WorkerOutput {
    pub fn final_tokens(&self) -> Option<u64> {
        self.tokens_used.last().copied()
    }
}

/// Normalize a transcript path: forward slashes only, project-root prefix and
/// leading `./` stripped.
pub fn normalize_path(raw: &str, project_root: &str) -> String {
    let mut path = raw.replace('\\', "/");
    let root = project_root.replace('\\', "/");
    let root = root.trim_end_matches('/');
    if !root.is_empty() {
        if let Some(stripped) = path.strip_prefix(root) {
            path = stripped.trim_start_matches('/').to_string();
        }
    }
    path.trim_start_matches("./").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_backslashes() {
        assert_eq!(normalize_path(r"src\ui\App.tsx", ""), "src/ui/App.tsx");
    }

    #[test]
    fn test_normalize_strips_project_root() {
        assert_eq!(
            normalize_path("/home/dev/shop/src/api.ts", "/home/dev/shop"),
            "src/api.ts"
        );
        assert_eq!(
            normalize_path("/home/dev/shop/src/api.ts", "/home/dev/shop/"),
            "src/api.ts"
        );
    }

    #[test]
    fn test_normalize_leaves_foreign_paths() {
        assert_eq!(
            normalize_path("/elsewhere/file.ts", "/home/dev/shop"),
            "/elsewhere/file.ts"
        );
        assert_eq!(normalize_path("./src/db.ts", "/home/dev/shop"), "src/db.ts");
    }

    #[test]
    fn test_verification_from_steps() {
        assert!(Verification::from_steps(vec![]).is_none());

        let passing = Verification::from_steps(vec![
            VerificationStep { number: 1, passed: true },
            VerificationStep { number: 2, passed: true },
        ])
        .expect("verification");
        assert!(passing.passed);

        let failing = Verification::from_steps(vec![
            VerificationStep { number: 1, passed: true },
            VerificationStep { number: 2, passed: false },
        ])
        .expect("verification");
        assert!(!failing.passed);
    }
}
