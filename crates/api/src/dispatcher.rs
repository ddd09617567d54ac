//! Slice checkout and completion reporting.
//!
//! The dispatcher is stateless: every decision is taken inside short
//! database transactions, so any number of server processes can answer
//! workers concurrently.
//!
//! Checkout runs in two steps. The job upsert commits first; slice
//! allocation follows in its own transaction. A crash between the two
//! leaves an open job with no slice, which the job's next checkout repairs
//! by allocating afresh.

use std::net::IpAddr;

use slicer_core::error::CoreError;
use slicer_core::slicing::quota;
use slicer_core::workscript::{render, ScriptContext};
use slicer_db::error::is_unique_violation;
use slicer_db::models::job::{FinishJob, Job, StartJob};
use slicer_db::models::progress::ProjectProgress;
use slicer_db::models::project::Project;
use slicer_db::models::slice::Slice;
use slicer_db::repositories::slice_repo::JOB_SLICE_CONSTRAINT;
use slicer_db::repositories::{Allocation, JobRepo, ProjectRepo, RawFileRepo, SliceRepo};
use slicer_db::{DbPool, StoreError};

use crate::error::{AppError, AppResult};

/// Attempts made at allocation when the store reports contention.
const ALLOCATE_ATTEMPTS: u32 = 3;

/// A worker asking for work.
#[derive(Debug, Clone)]
pub struct CheckoutRequest<'a> {
    pub project: &'a str,
    pub worker_addr: IpAddr,
    pub cluster_id: i64,
    pub process_id: i64,
    pub cpus: i32,
}

/// A worker reporting that it finished.
#[derive(Debug, Clone)]
pub struct ReportRequest<'a> {
    pub project: &'a str,
    pub worker_addr: IpAddr,
    pub cluster_id: i64,
    pub process_id: i64,
    pub exit_code: i32,
}

/// Outcome of [`checkout`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Checkout {
    /// A rendered worker script for the job's slice.
    Script(String),
    /// The job already reported completion; nothing was allocated.
    AlreadyComplete,
    /// No unassigned slice exists under the project.
    NoWork,
}

/// Outcome of [`report`].
#[derive(Debug, Clone)]
pub enum Report {
    Recorded(Job),
    /// No open job matched; the report is acknowledged and ignored.
    Unrecognized,
}

// ---------------------------------------------------------------------------
// Authorization
// ---------------------------------------------------------------------------

/// Resolve a project by name and check that `addr` may act for it.
pub async fn authorize(pool: &DbPool, project: &str, addr: IpAddr) -> AppResult<Project> {
    let found = ProjectRepo::find_by_name(pool, project)
        .await?
        .ok_or_else(|| CoreError::UnknownName {
            entity: "project",
            name: project.to_string(),
        })?;

    if !ProjectRepo::admits(pool, found.id, &addr.to_string()).await? {
        tracing::warn!(project, %addr, "Worker outside project subnet");
        return Err(CoreError::Forbidden(format!(
            "Address {addr} is not allowed for project '{project}'"
        ))
        .into());
    }
    Ok(found)
}

// ---------------------------------------------------------------------------
// Checkout
// ---------------------------------------------------------------------------

/// Hand a worker its slice of work as a rendered script.
///
/// Repeated calls for the same open job return the same slice.
pub async fn checkout(pool: &DbPool, req: &CheckoutRequest<'_>) -> AppResult<Checkout> {
    if req.cpus < 1 {
        return Err(CoreError::Validation(format!("cpus must be positive, got {}", req.cpus)).into());
    }
    let project = authorize(pool, req.project, req.worker_addr).await?;

    if let Some(existing) =
        JobRepo::find_by_key(pool, project.id, req.cluster_id, req.process_id).await?
    {
        if !existing.is_open() {
            tracing::info!(job_id = existing.id, "Checkout for completed job");
            return Ok(Checkout::AlreadyComplete);
        }
    }

    let started = JobRepo::start(
        pool,
        &StartJob {
            project_id: project.id,
            cluster_id: req.cluster_id,
            process_id: req.process_id,
            worker_addr: req.worker_addr.to_string(),
            cpus: req.cpus,
        },
    )
    .await?;
    let Some(job) = started else {
        tracing::info!(
            cluster_id = req.cluster_id,
            process_id = req.process_id,
            "Job closed during checkout"
        );
        return Ok(Checkout::AlreadyComplete);
    };

    let quota = quota(project.max_blocks_per_core, job.cpus);
    let Some(slice) = allocate(pool, project.id, job.id, quota).await? else {
        tracing::info!(job_id = job.id, project = %project.name, "No work available");
        return Ok(Checkout::NoWork);
    };

    let raw_file = RawFileRepo::find_by_id(pool, slice.raw_file_id)
        .await?
        .ok_or(CoreError::NotFound {
            entity: "RawFile",
            id: slice.raw_file_id,
        })?;

    let ctx = ScriptContext {
        project: &project.name,
        template_name: &project.template_name,
        cluster_id: job.cluster_id,
        process_id: job.process_id,
        restarts: job.restarts,
        cpus: job.cpus,
        started_at: job.started_at.unwrap_or(job.updated_at),
        raw_path: &raw_file.path,
        storage_root: &project.storage_root,
        input_prefix: &project.input_prefix,
        run: raw_file.run,
        seqno: raw_file.seqno,
        range: slice.range(),
    };
    Ok(Checkout::Script(render(&project.template, &ctx)))
}

/// Resolve the job's slice, retrying on contention.
///
/// Returns `None` when the project has no unassigned work.
async fn allocate(
    pool: &DbPool,
    project_id: i64,
    job_id: i64,
    quota: i32,
) -> AppResult<Option<Slice>> {
    let mut attempt = 1;
    loop {
        match SliceRepo::allocate(pool, project_id, job_id, quota).await {
            Ok(Allocation::Resumed(slice)) => {
                tracing::info!(job_id, slice_id = slice.id, range = %slice.range(), "Resumed slice");
                return Ok(Some(slice));
            }
            Ok(Allocation::Granted { slice, remainder }) => {
                tracing::info!(
                    job_id,
                    slice_id = slice.id,
                    range = %slice.range(),
                    split = remainder.is_some(),
                    "Granted slice"
                );
                return Ok(Some(slice));
            }
            Ok(Allocation::NoWork) => {
                // A concurrent checkout for this job may have linked the
                // only free slice while we skipped past its lock.
                return Ok(SliceRepo::find_by_job(pool, job_id).await?);
            }
            Err(e) if is_unique_violation(&e, Some(JOB_SLICE_CONSTRAINT)) => {
                // A concurrent checkout for the same job won the link.
                tracing::debug!(job_id, "Lost slice link race, re-reading");
                return SliceRepo::find_by_job(pool, job_id)
                    .await?
                    .map(Some)
                    .ok_or_else(|| {
                        AppError::InternalError(format!("job {job_id} lost its slice race but owns none"))
                    });
            }
            Err(e) => {
                let err = StoreError::from(e);
                if err.is_transient() && attempt < ALLOCATE_ATTEMPTS {
                    tracing::warn!(job_id, attempt, error = %err, "Transient allocation failure, retrying");
                    attempt += 1;
                    continue;
                }
                return Err(err.into());
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Record a worker's exit code, closing its job.
pub async fn report(pool: &DbPool, req: &ReportRequest<'_>) -> AppResult<Report> {
    let project = authorize(pool, req.project, req.worker_addr).await?;

    let finished = JobRepo::finish(
        pool,
        &FinishJob {
            project_id: project.id,
            cluster_id: req.cluster_id,
            process_id: req.process_id,
            worker_addr: req.worker_addr.to_string(),
            exit_code: req.exit_code,
        },
    )
    .await?;

    match finished {
        Some(job) => {
            tracing::info!(job_id = job.id, exit_code = req.exit_code, "Job finished");
            Ok(Report::Recorded(job))
        }
        None => {
            tracing::info!(
                cluster_id = req.cluster_id,
                process_id = req.process_id,
                worker = %req.worker_addr,
                "Report from unrecognized job"
            );
            Ok(Report::Unrecognized)
        }
    }
}

// ---------------------------------------------------------------------------
// Status
// ---------------------------------------------------------------------------

/// Progress summary for a project.
pub async fn status(pool: &DbPool, project: &str, addr: IpAddr) -> AppResult<ProjectProgress> {
    let project = authorize(pool, project, addr).await?;
    Ok(ProjectRepo::progress(pool, project.id).await?)
}
