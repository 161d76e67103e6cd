//! End-to-end tests for the crew binary.
//!
//! Agent launches are stubbed through the crew.json agent override: a shell
//! one-liner swallows the prompt on stdin and prints a canned stream-json
//! transcript, so a whole run exercises planning, both phases, reconciliation
//! and reporting without any real agent.

use std::path::Path;
use std::time::Duration;

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Board with one task per wave, chained by blockedBy.
const CHAINED_BOARD: &str = r#"{
    "project": "shop",
    "created": "2026-08-01T00:00:00.000Z",
    "projectType": "web",
    "tasks": [
        {
            "name": "init-schema",
            "category": "data",
            "description": "Create the database schema",
            "steps": ["Write the schema", "Verify it loads"],
            "passes": false
        },
        {
            "name": "build-api",
            "category": "api",
            "description": "Expose the schema over HTTP",
            "steps": ["Add routes"],
            "passes": false,
            "blockedBy": ["init-schema"]
        },
        {
            "name": "build-ui",
            "category": "ui",
            "description": "Render the data",
            "steps": ["Add a page"],
            "passes": false,
            "blockedBy": ["build-api"]
        }
    ]
}"#;

const SINGLE_TASK_BOARD: &str = r#"{
    "project": "shop",
    "tasks": [
        {
            "name": "init-schema",
            "category": "data",
            "description": "Create the database schema",
            "steps": ["Write the schema"],
            "passes": false
        }
    ]
}"#;

/// Transcript a well-behaved agent would stream: one working turn with a
/// file write and token usage, then a success result.
const SUCCESS_SCRIPT: &str = r#"cat > /dev/null; echo '{"type":"assistant","message":{"content":[{"type":"tool_use","name":"Write","input":{"file_path":"src/db/schema.sql"}}],"usage":{"input_tokens":200,"output_tokens":80}}}'; echo '{"type":"result","subtype":"success","is_error":false,"duration_ms":1200,"result":"All steps PASS"}'"#;

/// Result event that errored even though its prose claims success. The
/// explicit flag must win.
const LYING_ERROR_SCRIPT: &str = r#"cat > /dev/null; echo '{"type":"result","subtype":"error_during_execution","is_error":true,"duration_ms":400,"result":"Completed successfully"}'"#;

fn crew_cmd() -> Command {
    Command::cargo_bin("crew").expect("crew binary")
}

fn write_stub_agent(dir: &Path, script: &str) {
    let config = serde_json::json!({
        "agent": {"program": "/bin/sh", "args": ["-c", script]}
    });
    fs::write(dir.join("crew.json"), config.to_string()).expect("write crew.json");
}

fn read_json(path: &Path) -> serde_json::Value {
    let raw = fs::read_to_string(path).expect("read store");
    serde_json::from_str(&raw).expect("parse store")
}

/// A full run over a three-wave dependency chain: each wave unlocks the next
/// by flipping passes, and every task lands in code-review.
#[cfg(unix)]
#[test]
fn test_run_executes_waves_in_dependency_order() {
    let temp = TempDir::new().expect("temp dir");
    fs::write(temp.path().join("tasks.json"), CHAINED_BOARD).expect("write board");
    write_stub_agent(temp.path(), SUCCESS_SCRIPT);

    let output = crew_cmd()
        .current_dir(temp.path())
        .args(["run", "--non-interactive"])
        .timeout(Duration::from_secs(60))
        .output()
        .expect("run crew");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    let wave1 = stdout.find("Wave 1").expect("wave 1 banner");
    let wave2 = stdout.find("Wave 2").expect("wave 2 banner");
    let wave4 = stdout.find("Wave 4").expect("wave 4 banner");
    assert!(wave1 < wave2 && wave2 < wave4, "waves out of order:\n{}", stdout);
    assert!(stdout.contains("PASS"), "no pass lines:\n{}", stdout);
    assert!(stdout.contains("Run complete"), "no summary:\n{}", stdout);

    let board = read_json(&temp.path().join("tasks.json"));
    for task in board["tasks"].as_array().expect("tasks") {
        assert_eq!(task["passes"], true, "task did not pass: {}", task["name"]);
    }

    let progress = read_json(&temp.path().join("progress.json"));
    for name in ["init-schema", "build-api", "build-ui"] {
        assert_eq!(progress[name]["status"], "code-review", "task {}", name);
        assert_eq!(progress[name]["affectedFiles"][0], "src/db/schema.sql");
    }
    // Both phases contribute to the token series: one turn each at 280.
    assert_eq!(progress["build-api"]["tokensUsed"][0], 280);
    assert_eq!(progress["build-api"]["tokensUsed"][1], 280);

    // Transcripts for both phases were persisted.
    let logs = temp.path().join(".crew").join("logs");
    assert!(logs.join("init-schema.tdd.jsonl").exists());
    assert!(logs.join("init-schema.jsonl").exists());
}

/// Two data tasks chained inside wave 1: the second is not ready when the
/// wave is first planned, and must be picked up by a re-plan of the same
/// wave once the first flips passes.
#[cfg(unix)]
#[test]
fn test_same_wave_dependency_completes_in_one_run() {
    let temp = TempDir::new().expect("temp dir");
    fs::write(
        temp.path().join("tasks.json"),
        r#"{
            "project": "shop",
            "tasks": [
                {"name": "create-db", "category": "data", "description": "d", "steps": ["s"], "passes": false},
                {"name": "seed-db", "category": "data", "description": "d", "steps": ["s"], "passes": false, "blockedBy": ["create-db"]}
            ]
        }"#,
    )
    .expect("write board");
    write_stub_agent(temp.path(), SUCCESS_SCRIPT);

    let output = crew_cmd()
        .current_dir(temp.path())
        .args(["run", "--non-interactive"])
        .timeout(Duration::from_secs(60))
        .output()
        .expect("run crew");
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout.matches("Wave 1").count(), 1, "one banner:\n{}", stdout);

    let board = read_json(&temp.path().join("tasks.json"));
    assert_eq!(board["tasks"][0]["passes"], true);
    assert_eq!(board["tasks"][1]["passes"], true);
    let progress = read_json(&temp.path().join("progress.json"));
    assert_eq!(progress["create-db"]["status"], "code-review");
    assert_eq!(progress["seed-db"]["status"], "code-review");
}

/// is_error wins over success-sounding prose: the task records an error and
/// passes stays false, but the run itself still exits cleanly under the
/// default skip policy.
#[cfg(unix)]
#[test]
fn test_error_result_overrides_success_prose() {
    let temp = TempDir::new().expect("temp dir");
    fs::write(temp.path().join("tasks.json"), SINGLE_TASK_BOARD).expect("write board");
    write_stub_agent(temp.path(), LYING_ERROR_SCRIPT);

    let output = crew_cmd()
        .current_dir(temp.path())
        .args(["run", "--non-interactive"])
        .timeout(Duration::from_secs(30))
        .output()
        .expect("run crew");
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("FAIL"), "no failure line:\n{}", stdout);

    let board = read_json(&temp.path().join("tasks.json"));
    assert_eq!(board["tasks"][0]["passes"], false);
    let progress = read_json(&temp.path().join("progress.json"));
    assert_eq!(progress["init-schema"]["status"], "error");
}

/// A blockedBy cycle is rejected before anything is scheduled.
#[test]
fn test_dependency_cycle_exits_nonzero() {
    let temp = TempDir::new().expect("temp dir");
    fs::write(
        temp.path().join("tasks.json"),
        r#"{
            "project": "shop",
            "tasks": [
                {"name": "a", "category": "api", "steps": [], "passes": false, "blockedBy": ["b"]},
                {"name": "b", "category": "api", "steps": [], "passes": false, "blockedBy": ["a"]}
            ]
        }"#,
    )
    .expect("write board");

    crew_cmd()
        .current_dir(temp.path())
        .args(["run", "--non-interactive"])
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("dependency cycle"));
    assert!(!temp.path().join("progress.json").exists());
}

#[test]
fn test_missing_board_exits_nonzero() {
    let temp = TempDir::new().expect("temp dir");

    crew_cmd()
        .current_dir(temp.path())
        .args(["run", "--non-interactive"])
        .timeout(Duration::from_secs(10))
        .assert()
        .failure()
        .stderr(predicate::str::contains("task store not found"));
}

/// Dry runs print the plan and leave both stores untouched.
#[test]
fn test_dry_run_leaves_stores_unchanged() {
    let temp = TempDir::new().expect("temp dir");
    fs::write(temp.path().join("tasks.json"), SINGLE_TASK_BOARD).expect("write board");

    crew_cmd()
        .current_dir(temp.path())
        .args(["run", "--dry-run", "--non-interactive"])
        .timeout(Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("init-schema"))
        .stdout(predicate::str::contains("plan"));

    assert!(!temp.path().join("progress.json").exists());
    assert!(!temp.path().join(".crew").exists());
    let board = read_json(&temp.path().join("tasks.json"));
    assert_eq!(board["tasks"][0]["passes"], false);
}

/// The status view derives the board table from both stores without
/// mutating anything.
#[test]
fn test_status_reports_each_wave() {
    let temp = TempDir::new().expect("temp dir");
    fs::write(
        temp.path().join("tasks.json"),
        r#"{
            "project": "shop",
            "tasks": [
                {"name": "init-schema", "category": "data", "steps": [], "passes": true},
                {"name": "build-api", "category": "api", "steps": [], "passes": false, "blockedBy": ["init-schema"]}
            ]
        }"#,
    )
    .expect("write board");
    fs::write(
        temp.path().join("progress.json"),
        r#"{"init-schema": {"status": "completed"}}"#,
    )
    .expect("write progress");

    crew_cmd()
        .current_dir(temp.path())
        .args(["status"])
        .timeout(Duration::from_secs(10))
        .assert()
        .success()
        .stdout(predicate::str::contains("init-schema"))
        .stdout(predicate::str::contains("completed"))
        .stdout(predicate::str::contains("build-api"))
        .stdout(predicate::str::contains("pending"))
        .stdout(predicate::str::contains("Wave 1"))
        .stdout(predicate::str::contains("Wave 2"));

    assert!(!temp.path().join(".crew").exists());
}
