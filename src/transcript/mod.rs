//! Agent transcript handling: worker output records and the defensive
//! parser that extracts them from raw event streams.
//!
//! The transcript is the only channel back from a worker. Everything the
//! orchestrator knows about a finished task (status, touched files, token
//! spend, step-by-step verification) comes out of [`parser::TranscriptParser`]
//! and is carried as a [`output::WorkerOutput`] into reconciliation.

pub mod output;
pub mod parser;

pub use output::{normalize_path, Verification, VerificationStep, WorkerOutput, WorkerStatus};
pub use parser::{ParsedTranscript, TranscriptParser};
