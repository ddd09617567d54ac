//! Per-project progress summary.

use serde::Serialize;
use sqlx::FromRow;

/// Aggregate counts describing how far a project's processing has come.
#[derive(Debug, Clone, Default, FromRow, Serialize, PartialEq, Eq)]
pub struct ProjectProgress {
    pub raw_files: i64,
    pub slices: i64,
    pub unassigned: i64,
    pub running: i64,
    pub finished: i64,
    pub bound_ok: i64,
    pub bound_failed: i64,
    pub binding: i64,
}
