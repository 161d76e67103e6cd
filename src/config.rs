//! Project-level configuration.
//!
//! An optional `crew.json` at the project root overrides the pieces of a run
//! that differ between projects: which commands the verification gate runs,
//! which agent program to launch, where logs land, and how long a shell
//! command may take. Everything has a working default; most projects never
//! write this file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{OrchestratorError, OrchestratorResult};

/// File name looked up in the project directory.
pub const CONFIG_FILE: &str = "crew.json";

/// Seconds a verification command may run before it is killed.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 600;

/// Shell commands for the post-wave verification gate. Any field left unset
/// falls back to stack detection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VerificationOverrides {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub typecheck: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lint_fix: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub test: Option<String>,
}

/// Which agent binary to launch and with what extra arguments.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub program: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub args: Option<Vec<String>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    #[serde(default)]
    pub verification: VerificationOverrides,
    #[serde(default)]
    pub agent: AgentOverride,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logs_dir: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command_timeout_secs: Option<u64>,
}

impl ProjectConfig {
    /// Load `crew.json` from the project directory. A missing file yields the
    /// defaults; a file that exists but does not parse is a structural error.
    pub fn load(project_dir: &Path) -> OrchestratorResult<Self> {
        let path = project_dir.join(CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        let raw = std::fs::read_to_string(&path)?;
        serde_json::from_str(&raw).map_err(|source| OrchestratorError::InvalidStore {
            path: path.clone(),
            source,
        })
    }

    /// Resolved log directory for a project.
    pub fn logs_dir(&self, project_dir: &Path) -> PathBuf {
        match &self.logs_dir {
            Some(dir) => project_dir.join(dir),
            None => project_dir.join(".crew").join("logs"),
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(
            self.command_timeout_secs
                .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_yields_defaults() {
        let dir = TempDir::new().expect("temp dir");
        let config = ProjectConfig::load(dir.path()).expect("load");
        assert!(config.verification.typecheck.is_none());
        assert!(config.agent.program.is_none());
        assert_eq!(config.command_timeout(), Duration::from_secs(600));
        assert_eq!(
            config.logs_dir(dir.path()),
            dir.path().join(".crew").join("logs")
        );
    }

    #[test]
    fn test_overrides_parse() {
        let dir = TempDir::new().expect("temp dir");
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{
                "verification": {"typecheck": "npx tsc --noEmit", "lintFix": "npx eslint --fix ."},
                "agent": {"program": "my-agent", "args": ["--fast"]},
                "logsDir": "build/agent-logs",
                "commandTimeoutSecs": 90
            }"#,
        )
        .expect("write config");

        let config = ProjectConfig::load(dir.path()).expect("load");
        assert_eq!(
            config.verification.typecheck.as_deref(),
            Some("npx tsc --noEmit")
        );
        assert_eq!(
            config.verification.lint_fix.as_deref(),
            Some("npx eslint --fix .")
        );
        assert_eq!(config.agent.program.as_deref(), Some("my-agent"));
        assert_eq!(config.command_timeout(), Duration::from_secs(90));
        assert_eq!(
            config.logs_dir(dir.path()),
            dir.path().join("build/agent-logs")
        );
    }

    #[test]
    fn test_malformed_config_is_an_error() {
        let dir = TempDir::new().expect("temp dir");
        std::fs::write(dir.path().join(CONFIG_FILE), "{not json").expect("write config");
        let err = ProjectConfig::load(dir.path()).expect_err("should fail");
        assert!(err.is_structural());
    }

    #[test]
    fn test_unknown_fields_tolerated() {
        let dir = TempDir::new().expect("temp dir");
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            r#"{"verification": {}, "futureKnob": true}"#,
        )
        .expect("write config");
        assert!(ProjectConfig::load(dir.path()).is_ok());
    }
}
