use std::path::PathBuf;

use slicer_core::error::CoreError;
use slicer_core::framing::FramingError;

/// Failures that abort a binder or partitioner operation.
///
/// Per-slice problems (a missing bundle, a failed merge) are not errors:
/// they are recorded as bad ranges on the binding.
#[derive(Debug, thiserror::Error)]
pub enum BinderError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Framing error in {path}: {source}")]
    Framing {
        path: PathBuf,
        #[source]
        source: FramingError,
    },

    #[error("{path} does not match its registered record: {}", mismatches.join(", "))]
    Verification {
        path: PathBuf,
        mismatches: Vec<String>,
    },

    #[error("Bundle {path} is unreadable: {reason}")]
    Bundle { path: PathBuf, reason: String },

    #[error("Transfer of {path} failed after {attempts} attempts: {source}")]
    Transfer {
        path: PathBuf,
        attempts: u32,
        #[source]
        source: std::io::Error,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}
