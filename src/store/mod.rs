//! Shared JSON stores.
//!
//! The task board and the progress file are the only mutable state this tool
//! shares with other writers (the board viewer, concurrent orchestrator
//! processes). Both are plain JSON documents on disk; every mutation goes
//! through [`atomic::update_store`] so concurrent writers never observe a
//! partial write.

pub mod atomic;
pub mod progress;
pub mod tasks;

pub use progress::{task_state, ProgressEntry, ProgressStatus, ProgressStore, TaskState};
pub use tasks::{Category, Task, TaskBoard};

/// Task store file name, relative to the project root.
pub const TASKS_FILE: &str = "tasks.json";

/// Progress store file name, relative to the project root.
pub const PROGRESS_FILE: &str = "progress.json";

/// Store timestamps are RFC 3339 with millisecond precision, UTC.
pub fn now_timestamp() -> String {
    chrono::Utc::now().to_rfc3339_opts(chrono::SecondsFormat::Millis, true)
}
