//! Registration of raw files.
//!
//! Ingestion is never destructive: a path seen before is re-scanned and
//! compared with its stored row, and a disagreement is reported, not fixed.

use std::path::Path;

use slicer_core::error::CoreError;
use slicer_core::framing::scan_file;
use slicer_core::naming::parse_run_seqno;
use slicer_db::models::raw_file::{CreateRawFile, RawFile};
use slicer_db::repositories::{ProjectRepo, RawFileRepo, Registration};
use slicer_db::DbPool;

use crate::error::BinderError;

/// Outcome of ingesting one raw file.
#[derive(Debug, Clone)]
pub enum Ingested {
    /// New path: the file and its initial slice were inserted.
    Created(RawFile),
    /// Known path whose stored record matches the file on disk.
    Verified(RawFile),
}

impl Ingested {
    pub fn raw_file(&self) -> &RawFile {
        match self {
            Ingested::Created(f) | Ingested::Verified(f) => f,
        }
    }
}

/// Scan `path` and register it under `project`.
///
/// `run_seqno` overrides the run and sequence numbers otherwise derived from
/// the file name.
pub async fn ingest(
    pool: &DbPool,
    project: &str,
    path: &Path,
    run_seqno: Option<(i32, i32)>,
) -> Result<Ingested, BinderError> {
    let project = ProjectRepo::find_by_name(pool, project)
        .await?
        .ok_or_else(|| CoreError::UnknownName {
            entity: "project",
            name: project.to_string(),
        })?;

    let (run, seqno) = run_seqno.or_else(|| parse_run_seqno(path)).ok_or_else(|| {
        CoreError::Validation(format!(
            "Cannot derive run and sequence number from {}",
            path.display()
        ))
    })?;

    let scan = scan_file(path).await.map_err(|source| BinderError::Framing {
        path: path.to_path_buf(),
        source,
    })?;
    let nblocks = i32::try_from(scan.nblocks)
        .map_err(|_| CoreError::Validation(format!("{} blocks is too many", scan.nblocks)))?;
    let size_bytes = i64::try_from(scan.size_bytes)
        .map_err(|_| CoreError::Validation(format!("{} bytes is too large", scan.size_bytes)))?;

    let input = CreateRawFile {
        project_id: project.id,
        run,
        seqno,
        path: path.to_string_lossy().into_owned(),
        size_bytes,
        nblocks,
    };

    match RawFileRepo::register(pool, &input).await? {
        Registration::Created(file) => {
            tracing::info!(raw_file_id = file.id, run, seqno, nblocks, "Registered raw file");
            Ok(Ingested::Created(file))
        }
        Registration::Existing(file) => {
            let mismatches = file.mismatches(&input);
            if mismatches.is_empty() {
                tracing::debug!(raw_file_id = file.id, "Raw file already registered");
                Ok(Ingested::Verified(file))
            } else {
                Err(BinderError::Verification {
                    path: path.to_path_buf(),
                    mismatches,
                })
            }
        }
    }
}
