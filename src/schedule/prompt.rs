//! Prompt rendering for agent jobs.
//!
//! Prompts are plain markdown handed to the agent on standard input. The
//! reporting section matters: it asks for the verification table the
//! transcript parser later reads, and establishes the `BLOCKED:` protocol
//! for tasks the agent cannot finish.

use crate::schedule::roles::TEST_AUTHOR_ROLE;
use crate::store::tasks::Task;

/// Phase A: author tests for the task, touch nothing else.
pub fn render_test_prompt(task: &Task, project: &str) -> String {
    let mut prompt = role_header(TEST_AUTHOR_ROLE, project);
    prompt.push_str(&task_section(task));
    prompt.push_str("\n### Scope\n\n");
    prompt.push_str(
        "Write tests only. Do not modify implementation code, configuration, or \
         migrations. An implementation agent runs after you and must make your \
         tests pass; cover every step above with at least one failing test.\n",
    );
    prompt.push_str(&reporting_section(task));
    prompt
}

/// Phase B: implement the task in the given role, satisfying any tests the
/// phase A agent wrote.
pub fn render_implementation_prompt(
    task: &Task,
    role: &str,
    project: &str,
    tdd_files: &[String],
) -> String {
    let mut prompt = role_header(role, project);
    prompt.push_str(&task_section(task));

    if !tdd_files.is_empty() {
        prompt.push_str("\n### Tests the implementation must satisfy\n\n");
        prompt.push_str(
            "A test-authoring agent already wrote these test files. Make them pass \
             without weakening or deleting them:\n\n",
        );
        for file in tdd_files {
            prompt.push_str(&format!("- `{}`\n", file));
        }
    }

    prompt.push_str(&reporting_section(task));
    prompt
}

fn role_header(role: &str, project: &str) -> String {
    format!(
        "You are the {} for the project \"{}\". Work inside the current \
         directory; do not ask questions, the session is unattended.\n",
        role, project
    )
}

fn task_section(task: &Task) -> String {
    let mut section = format!(
        "\n## Task: {}\n\nCategory: {}\n\n{}\n",
        task.name,
        task.category.as_str(),
        task.description.trim()
    );

    if !task.steps.is_empty() {
        section.push_str("\n### Steps\n\n");
        for (index, step) in task.steps.iter().enumerate() {
            section.push_str(&format!("{}. {}\n", index + 1, step));
        }
    }

    section
}

fn reporting_section(task: &Task) -> String {
    let mut section = String::from("\n### Reporting\n\n");
    section.push_str(
        "When you are done, print a verification table with one row per step, \
         using exactly this shape:\n\n\
         | Step | Description | Result |\n\
         |------|-------------|--------|\n",
    );
    for (index, step) in task.steps.iter().enumerate() {
        section.push_str(&format!("| {} | {} | PASS or FAIL |\n", index + 1, step));
    }
    section.push_str(
        "\nMark a step FAIL if you could not verify it. If something outside \
         your control prevents progress, print `BLOCKED: <reason>` and stop.\n",
    );
    section
}
