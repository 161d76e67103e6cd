//! Next-steps advisor.
//!
//! After a run, the union of files the agents touched is matched against a
//! small rule set (project-provided `next-steps.json`, else bundled
//! defaults) to suggest follow-up actions: run migrations after schema
//! changes, reinstall after a dependency bump, and so on. Advice only; when
//! nothing matches nothing is printed.

use std::path::Path;

use glob::Pattern;
use owo_colors::OwoColorize;
use serde::{Deserialize, Serialize};

use crate::store::ProgressStore;
use crate::transcript::normalize_path;

/// Rule file looked up in the project directory.
pub const RULES_FILE: &str = "next-steps.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NextStepRule {
    pub name: String,
    /// Glob matched against normalized affected-file paths.
    pub pattern: String,
    pub command: String,
    pub reason: String,
    #[serde(default)]
    pub priority: i32,
    #[serde(default)]
    pub critical: bool,
}

#[derive(Debug, Deserialize)]
struct RuleFile {
    #[serde(default)]
    rules: Vec<NextStepRule>,
}

/// Load project rules, falling back to the bundled defaults. The rule file
/// is advisory, so a malformed one is warned about rather than fatal.
pub fn load_rules(project_dir: &Path) -> Vec<NextStepRule> {
    let path = project_dir.join(RULES_FILE);
    if !path.exists() {
        return default_rules();
    }
    match std::fs::read_to_string(&path)
        .map_err(|err| err.to_string())
        .and_then(|raw| serde_json::from_str::<RuleFile>(&raw).map_err(|err| err.to_string()))
    {
        Ok(file) => file.rules,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "ignoring unreadable next-steps rule file");
            default_rules()
        }
    }
}

pub fn default_rules() -> Vec<NextStepRule> {
    vec![
        NextStepRule {
            name: "migrations".to_string(),
            pattern: "**/migrations/**".to_string(),
            command: "npm run db:migrate".to_string(),
            reason: "Schema migrations changed; apply them to your database".to_string(),
            priority: 10,
            critical: true,
        },
        NextStepRule {
            name: "dependencies".to_string(),
            pattern: "package.json".to_string(),
            command: "npm install".to_string(),
            reason: "Dependencies changed; reinstall before running anything".to_string(),
            priority: 20,
            critical: true,
        },
        NextStepRule {
            name: "environment".to_string(),
            pattern: ".env*".to_string(),
            command: "review .env changes".to_string(),
            reason: "Environment configuration changed; update your deployment secrets".to_string(),
            priority: 30,
            critical: false,
        },
        NextStepRule {
            name: "api".to_string(),
            pattern: "**/api/**".to_string(),
            command: "npm run dev".to_string(),
            reason: "API routes changed; restart the dev server and re-test clients".to_string(),
            priority: 40,
            critical: false,
        },
        NextStepRule {
            name: "ui".to_string(),
            pattern: "**/components/**".to_string(),
            command: "npm run dev".to_string(),
            reason: "UI components changed; review them in the browser".to_string(),
            priority: 50,
            critical: false,
        },
    ]
}

/// Rules whose pattern matches any affected file, ordered by ascending
/// priority. Each rule appears at most once.
pub fn matching_rules(
    progress: &ProgressStore,
    rules: &[NextStepRule],
    project_root: &str,
) -> Vec<NextStepRule> {
    let files: Vec<String> = progress
        .entries
        .values()
        .flat_map(|entry| entry.affected_files.iter())
        .map(|file| normalize_path(file, project_root))
        .collect();

    let mut matched: Vec<NextStepRule> = rules
        .iter()
        .filter(|rule| files.iter().any(|file| rule_matches(rule, file)))
        .cloned()
        .collect();
    matched.sort_by_key(|rule| rule.priority);
    matched
}

fn rule_matches(rule: &NextStepRule, file: &str) -> bool {
    let direct = Pattern::new(&rule.pattern)
        .map(|pattern| pattern.matches(file))
        .unwrap_or_else(|err| {
            tracing::warn!(rule = %rule.name, error = %err, "skipping rule with invalid pattern");
            false
        });
    if direct {
        return true;
    }
    // Bare file patterns like `package.json` should also hit nested copies.
    if !rule.pattern.contains('/') {
        return Pattern::new(&format!("**/{}", rule.pattern))
            .map(|pattern| pattern.matches(file))
            .unwrap_or(false);
    }
    false
}

/// Print the matched advice; silent when nothing matched.
pub fn print_next_steps(matches: &[NextStepRule]) {
    if matches.is_empty() {
        return;
    }
    println!();
    println!("{}", "Recommended next steps:".bold());
    for rule in matches {
        if rule.critical {
            println!(
                "  {} {}: {}",
                "!".red().bold(),
                rule.reason,
                rule.command.cyan()
            );
        } else {
            println!("  - {}: {}", rule.reason, rule.command.cyan());
        }
    }
}
