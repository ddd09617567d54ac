//! Repository for the `jobs` table.
//!
//! A job is keyed by `(project_id, cluster_id, process_id)`. It is open until
//! either `ended_at` or `exit_code` is set, and nothing here ever reopens a
//! closed job.

use slicer_core::types::DbId;
use sqlx::PgPool;

use crate::models::job::{FinishJob, Job, StartJob};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, project_id, cluster_id, process_id, worker_addr, cpus, restarts, \
    started_at, ended_at, exit_code, created_at, updated_at";

/// Provides the job lifecycle operations used by the dispatcher.
pub struct JobRepo;

impl JobRepo {
    /// Find a job by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Job>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a job by its natural key.
    pub async fn find_by_key(
        pool: &PgPool,
        project_id: DbId,
        cluster_id: i64,
        process_id: i64,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE project_id = $1 AND cluster_id = $2 AND process_id = $3"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(project_id)
            .bind(cluster_id)
            .bind(process_id)
            .fetch_optional(pool)
            .await
    }

    /// Open a job, or restart an open one.
    ///
    /// Inserts a new job with `restarts = 1`, or bumps the restart counter of
    /// an existing open job and restamps its worker address, parallelism and
    /// start time. Returns `None` when the job exists but is already closed.
    pub async fn start(pool: &PgPool, input: &StartJob) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (project_id, cluster_id, process_id, worker_addr, cpus, restarts, started_at) \
             VALUES ($1, $2, $3, $4, $5, 1, NOW()) \
             ON CONFLICT ON CONSTRAINT uq_jobs_project_cluster_process DO UPDATE SET \
                 restarts = jobs.restarts + 1, \
                 worker_addr = EXCLUDED.worker_addr, \
                 cpus = EXCLUDED.cpus, \
                 started_at = NOW() \
             WHERE jobs.ended_at IS NULL AND jobs.exit_code IS NULL \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(input.project_id)
            .bind(input.cluster_id)
            .bind(input.process_id)
            .bind(&input.worker_addr)
            .bind(input.cpus)
            .fetch_optional(pool)
            .await
    }

    /// Close an open job with its exit code.
    ///
    /// Only an open job whose key and worker address all match is closed.
    /// Returns `None` when nothing matched, which includes a repeated report.
    pub async fn finish(pool: &PgPool, input: &FinishJob) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs SET ended_at = NOW(), exit_code = $5 \
             WHERE project_id = $1 AND cluster_id = $2 AND process_id = $3 \
               AND worker_addr = $4 \
               AND ended_at IS NULL AND exit_code IS NULL \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(input.project_id)
            .bind(input.cluster_id)
            .bind(input.process_id)
            .bind(&input.worker_addr)
            .bind(input.exit_code)
            .fetch_optional(pool)
            .await
    }
}
