//! Repository for the `projects` table.

use slicer_core::types::DbId;
use sqlx::PgPool;

use crate::models::progress::ProjectProgress;
use crate::models::project::{CreateProject, Project};

/// Column list for `projects` queries. The CIDR column is read as text.
const COLUMNS: &str = "\
    id, name, allowed_subnet::text AS allowed_subnet, template_name, template, \
    archive_prefix, storage_root, input_prefix, max_blocks_per_core, created_at, updated_at";

/// Provides read access to projects plus registration for operators.
pub struct ProjectRepo;

impl ProjectRepo {
    /// Register a new project.
    pub async fn create(pool: &PgPool, input: &CreateProject) -> Result<Project, sqlx::Error> {
        let query = format!(
            "INSERT INTO projects \
                 (name, allowed_subnet, template_name, template, archive_prefix, \
                  storage_root, input_prefix, max_blocks_per_core) \
             VALUES ($1, $2::cidr, $3, $4, $5, $6, $7, $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Project>(&query)
            .bind(&input.name)
            .bind(&input.allowed_subnet)
            .bind(&input.template_name)
            .bind(&input.template)
            .bind(&input.archive_prefix)
            .bind(&input.storage_root)
            .bind(&input.input_prefix)
            .bind(input.max_blocks_per_core)
            .fetch_one(pool)
            .await
    }

    /// Find a project by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Project>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM projects WHERE id = $1");
        sqlx::query_as::<_, Project>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a project by its unique name.
    pub async fn find_by_name(pool: &PgPool, name: &str) -> Result<Option<Project>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM projects WHERE name = $1");
        sqlx::query_as::<_, Project>(&query)
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    /// Number of registered projects.
    pub async fn count(pool: &PgPool) -> Result<i64, sqlx::Error> {
        let (n,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM projects")
            .fetch_one(pool)
            .await?;
        Ok(n)
    }

    /// Whether `addr` lies inside the project's allowed network range.
    ///
    /// Returns `false` for unknown projects.
    pub async fn admits(pool: &PgPool, project_id: DbId, addr: &str) -> Result<bool, sqlx::Error> {
        let row: Option<(bool,)> = sqlx::query_as(
            "SELECT $2::inet <<= allowed_subnet FROM projects WHERE id = $1",
        )
        .bind(project_id)
        .bind(addr)
        .fetch_optional(pool)
        .await?;
        Ok(row.is_some_and(|(inside,)| inside))
    }

    /// Summarise slice and binding progress for a project.
    pub async fn progress(pool: &PgPool, project_id: DbId) -> Result<ProjectProgress, sqlx::Error> {
        sqlx::query_as::<_, ProjectProgress>(
            "SELECT \
                 (SELECT COUNT(*) FROM raw_files WHERE project_id = $1) AS raw_files, \
                 COUNT(s.id) AS slices, \
                 COUNT(s.id) FILTER (WHERE s.job_id IS NULL) AS unassigned, \
                 COUNT(s.id) FILTER (WHERE j.id IS NOT NULL \
                     AND j.ended_at IS NULL AND j.exit_code IS NULL) AS running, \
                 COUNT(s.id) FILTER (WHERE j.id IS NOT NULL \
                     AND (j.ended_at IS NOT NULL OR j.exit_code IS NOT NULL)) AS finished, \
                 (SELECT COUNT(*) FROM bindings b JOIN raw_files rf ON rf.id = b.raw_file_id \
                     WHERE rf.project_id = $1 AND b.status = 0) AS bound_ok, \
                 (SELECT COUNT(*) FROM bindings b JOIN raw_files rf ON rf.id = b.raw_file_id \
                     WHERE rf.project_id = $1 AND b.status <> 0) AS bound_failed, \
                 (SELECT COUNT(*) FROM bindings b JOIN raw_files rf ON rf.id = b.raw_file_id \
                     WHERE rf.project_id = $1 AND b.status IS NULL) AS binding \
             FROM slices s \
             JOIN raw_files r ON r.id = s.raw_file_id \
             LEFT JOIN jobs j ON j.id = s.job_id \
             WHERE r.project_id = $1",
        )
        .bind(project_id)
        .fetch_one(pool)
        .await
    }
}
