//! Stack detection and agent role selection.
//!
//! Job prompts address the agent in a role ("You are the project's
//! database-engineer..."). The implementation role for a category depends on
//! what the project is built with, so marker files are inspected once at
//! startup and turned into a fixed role table that the scheduler carries for
//! the whole run.

use std::path::Path;

use crate::store::tasks::Category;

/// Role used for every test-authoring (phase A) job.
pub const TEST_AUTHOR_ROLE: &str = "test-author";

/// Role used when no stack signal suggests anything more specific.
pub const FALLBACK_ROLE: &str = "software-engineer";

/// Marker-file signals read from the project directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StackSignals {
    pub node: bool,
    pub react: bool,
    pub vue: bool,
    pub svelte: bool,
    pub rust: bool,
    pub python: bool,
    pub go: bool,
}

/// Inspect marker files once. Unreadable or unparsable markers simply leave
/// their signals unset; detection never fails a run.
pub fn detect_stack(project_dir: &Path) -> StackSignals {
    let mut signals = StackSignals::default();

    let package_json = project_dir.join("package.json");
    if package_json.exists() {
        signals.node = true;
        if let Ok(raw) = std::fs::read_to_string(&package_json) {
            if let Ok(manifest) = serde_json::from_str::<serde_json::Value>(&raw) {
                let mut packages: Vec<String> = Vec::new();
                for table in ["dependencies", "devDependencies"] {
                    if let Some(map) = manifest.get(table).and_then(|value| value.as_object()) {
                        packages.extend(map.keys().cloned());
                    }
                }
                signals.react = packages
                    .iter()
                    .any(|name| name == "react" || name == "next");
                signals.vue = packages.iter().any(|name| name == "vue" || name == "nuxt");
                signals.svelte = packages
                    .iter()
                    .any(|name| name == "svelte" || name.starts_with("@sveltejs/"));
            }
        }
    }

    signals.rust = project_dir.join("Cargo.toml").exists();
    signals.python = project_dir.join("pyproject.toml").exists();
    signals.go = project_dir.join("go.mod").exists();
    signals
}

/// Category to implementation role, built once from [`StackSignals`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleTable {
    data: String,
    config: String,
    api: String,
    integration: String,
    ui: String,
    testing: String,
}

impl RoleTable {
    pub fn from_signals(signals: &StackSignals) -> Self {
        let ui = if signals.react {
            "react-developer"
        } else if signals.vue {
            "vue-developer"
        } else if signals.svelte {
            "svelte-developer"
        } else if signals.node {
            "frontend-developer"
        } else {
            FALLBACK_ROLE
        };

        let api = if signals.node {
            "backend-developer"
        } else if signals.rust {
            "rust-engineer"
        } else if signals.python {
            "python-engineer"
        } else if signals.go {
            "go-engineer"
        } else {
            FALLBACK_ROLE
        };

        Self {
            data: "database-engineer".to_string(),
            config: "platform-engineer".to_string(),
            api: api.to_string(),
            integration: "integration-engineer".to_string(),
            ui: ui.to_string(),
            testing: "qa-engineer".to_string(),
        }
    }

    /// The phase B role for a task of this category.
    pub fn implementation_role(&self, category: Category) -> &str {
        match category {
            Category::Data => &self.data,
            Category::Config => &self.config,
            Category::Api => &self.api,
            Category::Integration => &self.integration,
            Category::Ui => &self.ui,
            Category::Testing => &self.testing,
        }
    }
}

impl Default for RoleTable {
    fn default() -> Self {
        Self::from_signals(&StackSignals::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_empty_project_falls_back() {
        let dir = TempDir::new().expect("temp dir");
        let signals = detect_stack(dir.path());
        assert_eq!(signals, StackSignals::default());

        let roles = RoleTable::from_signals(&signals);
        assert_eq!(roles.implementation_role(Category::Ui), FALLBACK_ROLE);
        assert_eq!(roles.implementation_role(Category::Api), FALLBACK_ROLE);
        assert_eq!(
            roles.implementation_role(Category::Data),
            "database-engineer"
        );
        assert_eq!(roles.implementation_role(Category::Testing), "qa-engineer");
    }

    #[test]
    fn test_react_project() {
        let dir = TempDir::new().expect("temp dir");
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"dependencies": {"react": "^18.2.0", "express": "^4.18.0"}}"#,
        )
        .expect("write package.json");

        let signals = detect_stack(dir.path());
        assert!(signals.node);
        assert!(signals.react);

        let roles = RoleTable::from_signals(&signals);
        assert_eq!(roles.implementation_role(Category::Ui), "react-developer");
        assert_eq!(roles.implementation_role(Category::Api), "backend-developer");
    }

    #[test]
    fn test_svelte_in_dev_dependencies() {
        let dir = TempDir::new().expect("temp dir");
        std::fs::write(
            dir.path().join("package.json"),
            r#"{"devDependencies": {"@sveltejs/kit": "^2.0.0"}}"#,
        )
        .expect("write package.json");

        let signals = detect_stack(dir.path());
        assert!(signals.svelte);
        assert_eq!(
            RoleTable::from_signals(&signals).implementation_role(Category::Ui),
            "svelte-developer"
        );
    }

    #[test]
    fn test_rust_project() {
        let dir = TempDir::new().expect("temp dir");
        std::fs::write(dir.path().join("Cargo.toml"), "[package]\nname = \"x\"\n")
            .expect("write Cargo.toml");

        let signals = detect_stack(dir.path());
        assert!(signals.rust);
        assert!(!signals.node);
        assert_eq!(
            RoleTable::from_signals(&signals).implementation_role(Category::Api),
            "rust-engineer"
        );
    }

    #[test]
    fn test_malformed_package_json_still_detects_node() {
        let dir = TempDir::new().expect("temp dir");
        std::fs::write(dir.path().join("package.json"), "{oops").expect("write package.json");
        let signals = detect_stack(dir.path());
        assert!(signals.node);
        assert!(!signals.react);
    }
}
