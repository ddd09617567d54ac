//! Fixtures shared by the binder integration tests.

#![allow(dead_code)]

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use slicer_binder::binder::Binder;
use slicer_binder::config::BinderConfig;
use slicer_binder::error::BinderError;
use slicer_binder::merge::{MergeOutcome, Merger};
use slicer_binder::transfer::LocalTransfer;
use slicer_core::naming::{bundle_name, output_suffix};
use slicer_core::registry::{self, OutputCategory};
use slicer_core::slicing::BlockRange;
use slicer_core::types::DbId;
use slicer_db::models::job::{FinishJob, Job, StartJob};
use slicer_db::models::project::{CreateProject, Project};
use slicer_db::models::raw_file::{CreateRawFile, RawFile};
use slicer_db::repositories::{Allocation, JobRepo, ProjectRepo, RawFileRepo, SliceRepo};
use sqlx::PgPool;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;

pub const RUN: i32 = 71000;
pub const SEQNO: i32 = 3;
pub const CLUSTER: i64 = 881;

/// Marker a staged file can contain to make [`FakeMerger`] reject it.
pub const CORRUPT: &[u8] = b"CORRUPT";

// ---------------------------------------------------------------------------
// Filesystem layout
// ---------------------------------------------------------------------------

/// Temporary staging, scratch and archive roots for one test.
pub struct Dirs {
    pub staging: TempDir,
    pub scratch: TempDir,
    pub archive: TempDir,
}

impl Dirs {
    pub fn new() -> Self {
        Self {
            staging: tempfile::tempdir().unwrap(),
            scratch: tempfile::tempdir().unwrap(),
            archive: tempfile::tempdir().unwrap(),
        }
    }

    pub fn config(&self) -> BinderConfig {
        BinderConfig {
            staging_dir: self.staging.path().to_path_buf(),
            scratch_dir: self.scratch.path().to_path_buf(),
            poll_interval: Duration::from_millis(10),
            transfer_attempts: 1,
            merge_timeout: Duration::from_secs(10),
        }
    }

    /// Archived artifact for `category`, if it was written.
    pub fn archived(&self, category: &str) -> Option<Vec<u8>> {
        let ext = registry::find(category).unwrap().dest_ext;
        let path = self
            .archive
            .path()
            .join(category)
            .join(format!("{RUN:06}"))
            .join(format!("{category}_{RUN:06}_{SEQNO:03}.{ext}"));
        std::fs::read(path).ok()
    }

    /// Write the bundle job `(CLUSTER, process)` would leave for `range`,
    /// holding one file per `(category, contents)` entry plus the job's
    /// stdout log unless `files` already lists `job_info`.
    pub fn stage_bundle(&self, process: i64, range: BlockRange, files: &[(&str, &[u8])]) {
        let log = job_log(process);
        let mut files = files.to_vec();
        if !files.iter().any(|(category, _)| *category == "job_info") {
            files.push(("job_info", log.as_bytes()));
        }
        self.stage_bundle_exact(process, range, &files);
    }

    /// Like [`Dirs::stage_bundle`] but with exactly the listed files.
    pub fn stage_bundle_exact(&self, process: i64, range: BlockRange, files: &[(&str, &[u8])]) {
        let suffix = output_suffix(RUN, SEQNO, range);
        let path = self.staging.path().join(bundle_name(CLUSTER, process));
        let mut zip = zip::ZipWriter::new(std::fs::File::create(path).unwrap());
        for (category, contents) in files {
            let name = registry::find(category).unwrap().source_name(&suffix);
            zip.start_file(name, SimpleFileOptions::default()).unwrap();
            zip.write_all(contents).unwrap();
        }
        zip.finish().unwrap();
    }
}

/// Stdout log [`Dirs::stage_bundle`] stages for `process`.
pub fn job_log(process: i64) -> String {
    format!("process {process} done\n")
}

pub fn binder(pool: &PgPool, dirs: &Dirs, merger: Arc<FakeMerger>) -> Binder {
    let config = dirs.config();
    Binder::new(
        pool.clone(),
        config.clone(),
        Arc::new(LocalTransfer::new(config.staging_dir)),
        merger,
    )
}

// ---------------------------------------------------------------------------
// Merge tool stand-in
// ---------------------------------------------------------------------------

/// Concatenates inputs in order. An input containing [`CORRUPT`] fails the
/// merge, with a diagnostic naming that input's path unless `silent`.
#[derive(Default)]
pub struct FakeMerger {
    pub silent: bool,
    pub calls: Mutex<Vec<(&'static str, usize)>>,
}

impl FakeMerger {
    pub fn silent() -> Self {
        Self {
            silent: true,
            ..Self::default()
        }
    }

    pub fn calls(&self) -> Vec<(&'static str, usize)> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Merger for FakeMerger {
    async fn merge(
        &self,
        category: &OutputCategory,
        output: &Path,
        inputs: &[PathBuf],
    ) -> Result<MergeOutcome, BinderError> {
        self.calls.lock().unwrap().push((category.name, inputs.len()));

        let mut merged = Vec::new();
        let mut diagnostics = String::new();
        for input in inputs {
            let contents = std::fs::read(input)?;
            if contents.windows(CORRUPT.len()).any(|w| w == CORRUPT) {
                diagnostics.push_str(&format!("Error: {} is not readable\n", input.display()));
            }
            merged.extend_from_slice(&contents);
        }
        if !diagnostics.is_empty() {
            if self.silent {
                diagnostics = "*** Break *** segmentation violation\n".to_string();
            }
            return Ok(MergeOutcome::Failed {
                exit_code: 1,
                diagnostics,
            });
        }
        std::fs::write(output, merged)?;
        Ok(MergeOutcome::Merged)
    }
}

// ---------------------------------------------------------------------------
// Store fixtures
// ---------------------------------------------------------------------------

pub async fn create_project(pool: &PgPool, archive: &Path) -> Project {
    ProjectRepo::create(
        pool,
        &CreateProject {
            name: "recon".to_string(),
            allowed_subnet: "10.1.0.0/16".to_string(),
            template_name: "recon.sh".to_string(),
            template: "#!/bin/sh\nrecon {{INPUT_FILES}}\n".to_string(),
            archive_prefix: archive.to_string_lossy().into_owned(),
            storage_root: String::new(),
            input_prefix: String::new(),
            max_blocks_per_core: 2,
        },
    )
    .await
    .unwrap()
}

pub async fn register(pool: &PgPool, project_id: DbId, nblocks: i32) -> RawFile {
    RawFileRepo::register(
        pool,
        &CreateRawFile {
            project_id,
            run: RUN,
            seqno: SEQNO,
            path: format!("/raw/hd_rawdata_{RUN:06}_{SEQNO:03}.evio"),
            size_bytes: i64::from(nblocks) * 4096,
            nblocks,
        },
    )
    .await
    .unwrap()
    .raw_file()
    .clone()
}

/// Start job `(CLUSTER, process)`, grant it up to `quota` blocks and close
/// it with `exit_code`. Returns the granted range.
pub async fn run_job(pool: &PgPool, project_id: DbId, process: i64, quota: i32, exit_code: i32) -> BlockRange {
    let job: Job = JobRepo::start(
        pool,
        &StartJob {
            project_id,
            cluster_id: CLUSTER,
            process_id: process,
            worker_addr: "10.1.2.3".to_string(),
            cpus: 1,
        },
    )
    .await
    .unwrap()
    .expect("job should be open");

    let range = match SliceRepo::allocate(pool, project_id, job.id, quota).await.unwrap() {
        Allocation::Granted { slice, .. } => slice.range(),
        other => panic!("expected a grant, got {other:?}"),
    };

    JobRepo::finish(
        pool,
        &FinishJob {
            project_id,
            cluster_id: CLUSTER,
            process_id: process,
            worker_addr: job.worker_addr.clone(),
            exit_code,
        },
    )
    .await
    .unwrap()
    .expect("job should close");
    range
}

/// A 10-block file processed as `[0,6)` by process 0 and `[6,10)` by
/// process 1, both exiting 0. Bundles are not staged.
pub async fn processed_file(pool: &PgPool, dirs: &Dirs) -> (Project, RawFile) {
    let project = create_project(pool, dirs.archive.path()).await;
    let file = register(pool, project.id, 10).await;
    assert_eq!(run_job(pool, project.id, 0, 6, 0).await, r(0, 6));
    assert_eq!(run_job(pool, project.id, 1, 6, 0).await, r(6, 10));
    (project, file)
}

pub fn r(block1: i32, block2: i32) -> BlockRange {
    BlockRange::new(block1, block2).unwrap()
}

// ---------------------------------------------------------------------------
// Raw files on disk
// ---------------------------------------------------------------------------

/// Write a framed raw file of `nblocks` blocks, each `words` words long.
pub fn write_raw_file(path: &Path, nblocks: u32, words: u32) {
    let mut bytes = Vec::new();
    for _ in 0..nblocks {
        bytes.extend_from_slice(&words.to_be_bytes());
        bytes.resize(bytes.len() + (words as usize - 1) * 4, 0xab);
    }
    std::fs::write(path, bytes).unwrap();
}
