//! Repository for the `raw_files` table.
//!
//! A raw file and its initial whole-file slice are always created together,
//! so every registered file starts out with `[0, nblocks)` in the work pool.

use slicer_core::types::DbId;
use sqlx::PgPool;

use crate::error::is_unique_violation;
use crate::models::raw_file::{CreateRawFile, RawFile};

/// Column list for `raw_files` queries.
const COLUMNS: &str = "\
    id, project_id, run, seqno, path, size_bytes, nblocks, created_at, updated_at";

/// Outcome of [`RawFileRepo::register`].
#[derive(Debug, Clone)]
pub enum Registration {
    /// The path was new; the file and its initial slice were inserted.
    Created(RawFile),
    /// The path was already registered. Nothing was written.
    Existing(RawFile),
}

impl Registration {
    pub fn raw_file(&self) -> &RawFile {
        match self {
            Registration::Created(f) | Registration::Existing(f) => f,
        }
    }
}

/// Provides registration and lookup of raw files.
pub struct RawFileRepo;

impl RawFileRepo {
    /// Find a raw file by its ID.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<RawFile>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM raw_files WHERE id = $1");
        sqlx::query_as::<_, RawFile>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a raw file by its storage path.
    pub async fn find_by_path(pool: &PgPool, path: &str) -> Result<Option<RawFile>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM raw_files WHERE path = $1");
        sqlx::query_as::<_, RawFile>(&query)
            .bind(path)
            .fetch_optional(pool)
            .await
    }

    /// List a project's raw files, lowest run and sequence first.
    pub async fn list_by_project(
        pool: &PgPool,
        project_id: DbId,
    ) -> Result<Vec<RawFile>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM raw_files WHERE project_id = $1 ORDER BY run, seqno"
        );
        sqlx::query_as::<_, RawFile>(&query)
            .bind(project_id)
            .fetch_all(pool)
            .await
    }

    /// Register a raw file together with its single unassigned slice
    /// `[0, nblocks)`.
    ///
    /// A path that is already known is returned as [`Registration::Existing`]
    /// without touching the stored row; the caller decides whether the stored
    /// values still agree. A concurrent registration of the same path is
    /// resolved the same way.
    pub async fn register(
        pool: &PgPool,
        input: &CreateRawFile,
    ) -> Result<Registration, sqlx::Error> {
        if let Some(existing) = Self::find_by_path(pool, &input.path).await? {
            return Ok(Registration::Existing(existing));
        }

        match Self::insert_with_slice(pool, input).await {
            Ok(created) => Ok(Registration::Created(created)),
            Err(e) if is_unique_violation(&e, Some("uq_raw_files_path")) => {
                Self::find_by_path(pool, &input.path)
                    .await?
                    .map(Registration::Existing)
                    .ok_or(sqlx::Error::RowNotFound)
            }
            Err(e) => Err(e),
        }
    }

    async fn insert_with_slice(
        pool: &PgPool,
        input: &CreateRawFile,
    ) -> Result<RawFile, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!(
            "INSERT INTO raw_files (project_id, run, seqno, path, size_bytes, nblocks) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             RETURNING {COLUMNS}"
        );
        let file = sqlx::query_as::<_, RawFile>(&query)
            .bind(input.project_id)
            .bind(input.run)
            .bind(input.seqno)
            .bind(&input.path)
            .bind(input.size_bytes)
            .bind(input.nblocks)
            .fetch_one(&mut *tx)
            .await?;

        sqlx::query("INSERT INTO slices (raw_file_id, block1, block2) VALUES ($1, 0, $2)")
            .bind(file.id)
            .bind(file.nblocks)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(file)
    }
}
