//! Error types for curation runs.
//!
//! Only structural problems are errors. A malformed record is never an
//! error: it becomes a [`DropReason`](crate::validate::DropReason) and the
//! run continues.

use sieve_core::SieveError;
use thiserror::Error;

/// Errors that can occur during a curation run.
#[derive(Error, Debug)]
pub enum CurateError {
    /// Invalid configuration. Fatal at startup; nothing is written.
    #[error("Configuration error: {0}")]
    Config(String),

    /// An upstream source failed. Logged and reported; the run continues.
    #[error("source '{source_id}' is unavailable: {reason}")]
    SourceUnavailable { source_id: String, reason: String },

    /// A group key landed in both partitions.
    #[error("leakage invariant violated: {groups} group(s) present in both train and val")]
    LeakageInvariant { groups: usize },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Structural parse failure (e.g. a `.json` input that is not an array).
    #[error("Parse error at line {line}: {message}")]
    Parse { line: usize, message: String },

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Core(#[from] SieveError),
}

/// Result type for curation operations.
pub type Result<T> = std::result::Result<T, CurateError>;
