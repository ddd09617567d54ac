//! Repository for the `slices` table.
//!
//! Allocation is the only place slices are split. Shrinking the claimed
//! slice and inserting the remainder happen in one transaction, so the
//! slices of a file cover `[0, nblocks)` exactly at every commit.

use slicer_core::slicing::{split, BlockRange};
use slicer_core::types::{BlockIndex, DbId};
use sqlx::PgPool;

use crate::models::slice::{CompletedSlice, Slice};

/// Column list for `slices` queries.
const COLUMNS: &str = "id, raw_file_id, block1, block2, job_id, created_at, updated_at";

/// Same columns qualified with the `s` alias, for joins.
const S_COLUMNS: &str = "\
    s.id, s.raw_file_id, s.block1, s.block2, s.job_id, s.created_at, s.updated_at";

/// Constraint that allows a job to own at most one slice.
pub const JOB_SLICE_CONSTRAINT: &str = "uq_slices_job_id";

/// Outcome of [`SliceRepo::allocate`].
#[derive(Debug, Clone)]
pub enum Allocation {
    /// The job already owned this slice; it is handed out again unchanged.
    Resumed(Slice),
    /// A slice was claimed for the job, with the unassigned remainder if it
    /// had to be split.
    Granted {
        slice: Slice,
        remainder: Option<Slice>,
    },
    /// No unassigned slice exists under the project.
    NoWork,
}

/// Provides slice allocation and per-file listings.
pub struct SliceRepo;

impl SliceRepo {
    /// The slice owned by a job, if any.
    pub async fn find_by_job(pool: &PgPool, job_id: DbId) -> Result<Option<Slice>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM slices WHERE job_id = $1");
        sqlx::query_as::<_, Slice>(&query)
            .bind(job_id)
            .fetch_optional(pool)
            .await
    }

    /// All slices of a raw file, in block order.
    pub async fn list_for_file(
        pool: &PgPool,
        raw_file_id: DbId,
    ) -> Result<Vec<Slice>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM slices WHERE raw_file_id = $1 ORDER BY block1"
        );
        sqlx::query_as::<_, Slice>(&query)
            .bind(raw_file_id)
            .fetch_all(pool)
            .await
    }

    /// Slices of a raw file joined with their jobs, in block order.
    ///
    /// Unassigned slices are omitted; the binder only asks once every slice
    /// has a closed job.
    pub async fn completed_for_file(
        pool: &PgPool,
        raw_file_id: DbId,
    ) -> Result<Vec<CompletedSlice>, sqlx::Error> {
        sqlx::query_as::<_, CompletedSlice>(
            "SELECT s.id AS slice_id, s.block1, s.block2, j.id AS job_id, \
                    j.cluster_id, j.process_id, j.exit_code \
             FROM slices s \
             JOIN jobs j ON j.id = s.job_id \
             WHERE s.raw_file_id = $1 \
             ORDER BY s.block1",
        )
        .bind(raw_file_id)
        .fetch_all(pool)
        .await
    }

    /// Allocate work for a job, in one transaction.
    ///
    /// If the job already owns a slice it is resumed. Otherwise the
    /// lowest-id unassigned slice of any raw file under the project is
    /// claimed with `FOR UPDATE SKIP LOCKED`, cut down to `quota` blocks and
    /// linked to the job; any blocks beyond the quota are inserted as a new
    /// unassigned slice.
    ///
    /// Two concurrent calls for the same job can both find nothing to resume
    /// and claim different slices; the second link then fails on
    /// [`JOB_SLICE_CONSTRAINT`] and its transaction rolls back untouched.
    pub async fn allocate(
        pool: &PgPool,
        project_id: DbId,
        job_id: DbId,
        quota: BlockIndex,
    ) -> Result<Allocation, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let query = format!("SELECT {COLUMNS} FROM slices WHERE job_id = $1");
        let owned = sqlx::query_as::<_, Slice>(&query)
            .bind(job_id)
            .fetch_optional(&mut *tx)
            .await?;
        if let Some(slice) = owned {
            tx.commit().await?;
            return Ok(Allocation::Resumed(slice));
        }

        let query = format!(
            "SELECT {S_COLUMNS} FROM slices s \
             JOIN raw_files r ON r.id = s.raw_file_id \
             WHERE r.project_id = $1 AND s.job_id IS NULL \
             ORDER BY s.id \
             LIMIT 1 \
             FOR UPDATE OF s SKIP LOCKED"
        );
        let claimed = sqlx::query_as::<_, Slice>(&query)
            .bind(project_id)
            .fetch_optional(&mut *tx)
            .await?;
        let Some(claimed) = claimed else {
            tx.commit().await?;
            return Ok(Allocation::NoWork);
        };

        let grant = split(claimed.range(), quota);

        let query = format!(
            "UPDATE slices SET block2 = $2, job_id = $3 WHERE id = $1 RETURNING {COLUMNS}"
        );
        let slice = sqlx::query_as::<_, Slice>(&query)
            .bind(claimed.id)
            .bind(grant.granted.block2)
            .bind(job_id)
            .fetch_one(&mut *tx)
            .await?;

        let remainder = match grant.remainder {
            Some(rest) => Some(Self::insert_unassigned(&mut tx, claimed.raw_file_id, rest).await?),
            None => None,
        };

        tx.commit().await?;
        Ok(Allocation::Granted { slice, remainder })
    }

    async fn insert_unassigned(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        raw_file_id: DbId,
        range: BlockRange,
    ) -> Result<Slice, sqlx::Error> {
        let query = format!(
            "INSERT INTO slices (raw_file_id, block1, block2) VALUES ($1, $2, $3) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Slice>(&query)
            .bind(raw_file_id)
            .bind(range.block1)
            .bind(range.block2)
            .fetch_one(&mut **tx)
            .await
    }
}
