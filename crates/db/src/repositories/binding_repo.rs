//! Repository for the `bindings` table.
//!
//! The binding row is the binder's exclusivity token: whoever inserts it
//! owns reconciliation of that raw file. A failed binding stays in place,
//! blocking another attempt, until recycling releases its bad ranges and
//! deletes it.

use slicer_core::slicing::BlockRange;
use slicer_core::types::DbId;
use sqlx::PgPool;

use crate::error::is_unique_violation;
use crate::models::binding::{Binding, FailedBinding};

/// Column list for `bindings` queries.
const COLUMNS: &str = "\
    id, raw_file_id, started_at, ended_at, status, detail, created_at, updated_at";

/// Outcome of [`BindingRepo::claim`].
#[derive(Debug, Clone)]
pub enum BindingClaim {
    Claimed(Binding),
    /// Another binder inserted the binding first.
    Collision,
}

/// Provides claim, finalize and recycle operations for bindings.
pub struct BindingRepo;

impl BindingRepo {
    /// The binding of a raw file, if any.
    pub async fn find_by_raw_file(
        pool: &PgPool,
        raw_file_id: DbId,
    ) -> Result<Option<Binding>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM bindings WHERE raw_file_id = $1");
        sqlx::query_as::<_, Binding>(&query)
            .bind(raw_file_id)
            .fetch_optional(pool)
            .await
    }

    /// The lowest-id raw file that is ready to reconcile.
    ///
    /// Ready means no binding exists, no slice is unassigned or held by an
    /// open job, and the slices sum to exactly `nblocks`.
    pub async fn find_ready(pool: &PgPool) -> Result<Option<DbId>, sqlx::Error> {
        let row: Option<(DbId,)> = sqlx::query_as(
            "SELECT r.id FROM raw_files r \
             WHERE NOT EXISTS (SELECT 1 FROM bindings b WHERE b.raw_file_id = r.id) \
               AND NOT EXISTS ( \
                   SELECT 1 FROM slices s \
                   LEFT JOIN jobs j ON j.id = s.job_id \
                   WHERE s.raw_file_id = r.id \
                     AND (s.job_id IS NULL OR (j.ended_at IS NULL AND j.exit_code IS NULL)) \
               ) \
               AND (SELECT COALESCE(SUM(s.block2 - s.block1), 0) \
                    FROM slices s WHERE s.raw_file_id = r.id) = r.nblocks \
             ORDER BY r.id \
             LIMIT 1",
        )
        .fetch_optional(pool)
        .await?;
        Ok(row.map(|(id,)| id))
    }

    /// Claim a raw file by inserting its binding.
    pub async fn claim(pool: &PgPool, raw_file_id: DbId) -> Result<BindingClaim, sqlx::Error> {
        let mut tx = pool.begin().await?;
        let query = format!(
            "INSERT INTO bindings (raw_file_id, started_at) VALUES ($1, NOW()) RETURNING {COLUMNS}"
        );
        let inserted = sqlx::query_as::<_, Binding>(&query)
            .bind(raw_file_id)
            .fetch_one(&mut *tx)
            .await;

        match inserted {
            Ok(binding) => {
                tx.commit().await?;
                Ok(BindingClaim::Claimed(binding))
            }
            Err(e) if is_unique_violation(&e, Some("uq_bindings_raw_file_id")) => {
                Ok(BindingClaim::Collision)
            }
            Err(e) => Err(e),
        }
    }

    /// Record the outcome of reconciliation.
    pub async fn finalize(
        pool: &PgPool,
        binding_id: DbId,
        status: i32,
        detail: &str,
    ) -> Result<Binding, sqlx::Error> {
        let query = format!(
            "UPDATE bindings SET ended_at = NOW(), status = $2, detail = $3 \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Binding>(&query)
            .bind(binding_id)
            .bind(status)
            .bind(detail)
            .fetch_one(pool)
            .await
    }

    /// Failed bindings whose raw file's run lies in `[run_lo, run_hi]`.
    pub async fn failed_in_runs(
        pool: &PgPool,
        run_lo: i32,
        run_hi: i32,
    ) -> Result<Vec<FailedBinding>, sqlx::Error> {
        sqlx::query_as::<_, FailedBinding>(
            "SELECT b.id AS binding_id, b.raw_file_id, r.run, r.seqno, b.status, b.detail \
             FROM bindings b \
             JOIN raw_files r ON r.id = b.raw_file_id \
             WHERE b.status IS NOT NULL AND b.status <> 0 \
               AND r.run BETWEEN $1 AND $2 \
             ORDER BY r.run, r.seqno",
        )
        .bind(run_lo)
        .bind(run_hi)
        .fetch_all(pool)
        .await
    }

    /// Return a failed binding's bad ranges to the work pool and delete the
    /// binding, in one transaction.
    ///
    /// Only slices whose `[block1, block2)` equals one of `ranges` exactly
    /// are released. Returns the number of slices released, or `None` if the
    /// binding no longer exists or is not a failure.
    pub async fn release_failed(
        pool: &PgPool,
        binding_id: DbId,
        ranges: &[BlockRange],
    ) -> Result<Option<u64>, sqlx::Error> {
        let mut tx = pool.begin().await?;

        let locked: Option<(DbId,)> = sqlx::query_as(
            "SELECT raw_file_id FROM bindings \
             WHERE id = $1 AND status IS NOT NULL AND status <> 0 \
             FOR UPDATE",
        )
        .bind(binding_id)
        .fetch_optional(&mut *tx)
        .await?;
        let Some((raw_file_id,)) = locked else {
            tx.commit().await?;
            return Ok(None);
        };

        let starts: Vec<i32> = ranges.iter().map(|r| r.block1).collect();
        let ends: Vec<i32> = ranges.iter().map(|r| r.block2).collect();
        let released = sqlx::query(
            "UPDATE slices SET job_id = NULL \
             WHERE raw_file_id = $1 \
               AND (block1, block2) IN (SELECT * FROM UNNEST($2::int4[], $3::int4[]))",
        )
        .bind(raw_file_id)
        .bind(&starts)
        .bind(&ends)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        sqlx::query("DELETE FROM bindings WHERE id = $1")
            .bind(binding_id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(Some(released))
    }

    /// Delete an in-progress binding, used when the binder itself fails
    /// before finalizing.
    pub async fn abandon(pool: &PgPool, binding_id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query("DELETE FROM bindings WHERE id = $1 AND status IS NULL")
            .bind(binding_id)
            .execute(pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
