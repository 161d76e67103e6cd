//! Wave-scheduling task orchestrator.
//!
//! Tasks live on a JSON board and are grouped into category waves: data and
//! config land first, then api, integration, ui, and finally testing. Each
//! eligible task is dispatched to an external code-generation agent process;
//! the agent's stream-json transcript is parsed into a normalized outcome and
//! reconciled into the progress store, and a verification gate runs the
//! project's own typecheck/lint/test commands between waves.
//!
//! The `crew` binary drives [`runner::run`]; everything else is a library
//! surface so the loop stays testable piece by piece.

pub mod advisor;
pub mod config;
pub mod error;
pub mod graph;
pub mod reconcile;
pub mod report;
pub mod retry;
pub mod runner;
pub mod schedule;
pub mod store;
pub mod transcript;
pub mod verify;
pub mod waves;

pub use error::{OrchestratorError, OrchestratorResult};
pub use runner::{run, RunOutcome, RunnerConfig};
