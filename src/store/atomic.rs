//! Atomic read-modify-write for shared store files.
//!
//! Writers may be separate OS processes (the board viewer saves too), so an
//! in-process lock is not enough. Every update re-reads the file, applies the
//! change, stages the result in a temp file, and renames it over the target.
//! Failures are retried with jittered backoff; exhausting the ceiling
//! surfaces the underlying I/O error instead of dropping the write.

use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;

use rand::Rng;
use serde::Serialize;

use crate::error::{OrchestratorError, OrchestratorResult};

/// Retry ceiling for contended store writes.
pub const MAX_WRITE_ATTEMPTS: u32 = 5;

/// Base delay between attempts; the actual delay doubles per attempt and
/// carries up to 100% random jitter so contending writers desynchronize.
const RETRY_BASE_DELAY_MS: u64 = 40;

/// Read `path` fresh, apply `apply`, and atomically replace the file,
/// retrying on I/O failure. Returns the value that was written.
///
/// `load` runs on every attempt so a concurrent writer's update is never
/// overwritten with stale data. Structural errors from `load` (bad JSON)
/// propagate immediately; only I/O failures are treated as contention.
pub async fn update_store<T, L, F>(path: &Path, load: L, apply: F) -> OrchestratorResult<T>
where
    T: Serialize,
    L: Fn(&Path) -> OrchestratorResult<T>,
    F: Fn(&mut T),
{
    let mut last_err: Option<io::Error> = None;

    for attempt in 1..=MAX_WRITE_ATTEMPTS {
        let mut value = match load(path) {
            Ok(value) => value,
            Err(OrchestratorError::Io(err)) => {
                tracing::debug!(
                    path = %path.display(),
                    attempt,
                    error = %err,
                    "store read contended, retrying"
                );
                last_err = Some(err);
                tokio::time::sleep(jittered_delay(attempt)).await;
                continue;
            }
            Err(other) => return Err(other),
        };

        apply(&mut value);

        let json = serde_json::to_string_pretty(&value)?;
        match write_atomic(path, &json) {
            Ok(()) => return Ok(value),
            Err(err) => {
                tracing::debug!(
                    path = %path.display(),
                    attempt,
                    error = %err,
                    "store write contended, retrying"
                );
                last_err = Some(err);
                tokio::time::sleep(jittered_delay(attempt)).await;
            }
        }
    }

    Err(OrchestratorError::StoreContention {
        path: path.to_path_buf(),
        attempts: MAX_WRITE_ATTEMPTS,
        source: last_err
            .unwrap_or_else(|| io::Error::other("store update failed with no recorded cause")),
    })
}

/// Stage the serialized document next to the target and rename it into place.
fn write_atomic(path: &Path, json: &str) -> io::Result<()> {
    let temp_path = temp_sibling(path);
    let mut file = fs::File::create(&temp_path)?;
    file.write_all(json.as_bytes())?;
    file.write_all(b"\n")?;
    file.sync_all()?;
    drop(file);

    if let Err(err) = fs::rename(&temp_path, path) {
        let _ = fs::remove_file(&temp_path);
        return Err(err);
    }
    Ok(())
}

/// Temp name carries the pid so concurrent writers do not clobber each
/// other's staging file before the rename.
fn temp_sibling(path: &Path) -> PathBuf {
    let file_name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "store".to_string());
    path.with_file_name(format!(".{}.{}.tmp", file_name, std::process::id()))
}

fn jittered_delay(attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(4);
    let base = RETRY_BASE_DELAY_MS << shift;
    let jitter = rand::thread_rng().gen_range(0..=base);
    Duration::from_millis(base + jitter)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::progress::{ProgressStatus, ProgressStore};
    use std::sync::Arc;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_update_creates_missing_progress_store() {
        let temp_dir = TempDir::new().expect("temp dir");
        let path = temp_dir.path().join("progress.json");

        let written = update_store(&path, ProgressStore::load, |store: &mut ProgressStore| {
            store.entry_mut("init-schema").status = Some(ProgressStatus::Running);
        })
        .await
        .expect("update");

        assert!(path.exists());
        assert_eq!(
            written.entry("init-schema").expect("entry").status,
            Some(ProgressStatus::Running)
        );

        let reloaded = ProgressStore::load(&path).expect("reload");
        assert_eq!(
            reloaded.entry("init-schema").expect("entry").status,
            Some(ProgressStatus::Running)
        );
    }

    #[tokio::test]
    async fn test_concurrent_updates_both_land() {
        let temp_dir = TempDir::new().expect("temp dir");
        let path = Arc::new(temp_dir.path().join("progress.json"));

        let mut handles = Vec::new();
        for name in ["alpha", "beta", "gamma", "delta"] {
            let path = Arc::clone(&path);
            handles.push(tokio::spawn(async move {
                update_store(&path, ProgressStore::load, |store: &mut ProgressStore| {
                    store.entry_mut(name).status = Some(ProgressStatus::CodeReview);
                })
                .await
            }));
        }

        for handle in handles {
            handle.await.expect("join").expect("update");
        }

        let store = ProgressStore::load(&path).expect("reload");
        for name in ["alpha", "beta", "gamma", "delta"] {
            assert_eq!(
                store.entry(name).expect("entry").status,
                Some(ProgressStatus::CodeReview),
                "entry for {} lost",
                name
            );
        }
    }

    #[tokio::test]
    async fn test_exhausted_retries_surface_contention_error() {
        let temp_dir = TempDir::new().expect("temp dir");
        // A directory at the store path makes every read attempt fail.
        let path = temp_dir.path().join("progress.json");
        fs::create_dir(&path).expect("mkdir");

        let err = update_store(&path, ProgressStore::load, |_: &mut ProgressStore| {})
            .await
            .expect_err("should exhaust retries");

        match err {
            OrchestratorError::StoreContention { attempts, .. } => {
                assert_eq!(attempts, MAX_WRITE_ATTEMPTS);
            }
            other => panic!("expected StoreContention, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_invalid_json_fails_without_retry() {
        let temp_dir = TempDir::new().expect("temp dir");
        let path = temp_dir.path().join("progress.json");
        fs::write(&path, "{broken").expect("write");

        let err = update_store(&path, ProgressStore::load, |_: &mut ProgressStore| {})
            .await
            .expect_err("bad JSON is structural");
        assert!(err.is_structural());
    }
}
