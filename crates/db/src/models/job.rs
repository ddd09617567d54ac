//! Job entity model and DTOs.

use serde::Serialize;
use slicer_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub project_id: DbId,
    pub cluster_id: i64,
    pub process_id: i64,
    pub worker_addr: String,
    pub cpus: i32,
    pub restarts: i32,
    pub started_at: Option<Timestamp>,
    pub ended_at: Option<Timestamp>,
    pub exit_code: Option<i32>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Job {
    /// A job is open until either its end time or its exit code is set.
    pub fn is_open(&self) -> bool {
        self.ended_at.is_none() && self.exit_code.is_none()
    }
}

/// DTO for a worker checking out work.
#[derive(Debug, Clone)]
pub struct StartJob {
    pub project_id: DbId,
    pub cluster_id: i64,
    pub process_id: i64,
    pub worker_addr: String,
    pub cpus: i32,
}

/// DTO for a worker reporting completion.
#[derive(Debug, Clone)]
pub struct FinishJob {
    pub project_id: DbId,
    pub cluster_id: i64,
    pub process_id: i64,
    pub worker_addr: String,
    pub exit_code: i32,
}
