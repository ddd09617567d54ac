//! Fixtures shared by the repository integration tests.

#![allow(dead_code)]

use slicer_core::slicing::BlockRange;
use slicer_core::types::DbId;
use slicer_db::models::job::{FinishJob, Job, StartJob};
use slicer_db::models::project::{CreateProject, Project};
use slicer_db::models::raw_file::{CreateRawFile, RawFile};
use slicer_db::repositories::{JobRepo, ProjectRepo, RawFileRepo, SliceRepo};
use sqlx::PgPool;

pub const WORKER_ADDR: &str = "10.1.2.3";

pub fn new_project(name: &str) -> CreateProject {
    CreateProject {
        name: name.to_string(),
        allowed_subnet: "10.1.0.0/16".to_string(),
        template_name: "recon.sh".to_string(),
        template: "#!/bin/sh\nrecon {{INPUT_FILES}} -o {{OUTPUT_SUFFIX}}\n".to_string(),
        archive_prefix: "/archive/recon".to_string(),
        storage_root: String::new(),
        input_prefix: String::new(),
        max_blocks_per_core: 2,
    }
}

pub async fn create_project(pool: &PgPool, name: &str) -> Project {
    ProjectRepo::create(pool, &new_project(name)).await.unwrap()
}

pub fn new_raw_file(project_id: DbId, run: i32, seqno: i32, nblocks: i32) -> CreateRawFile {
    CreateRawFile {
        project_id,
        run,
        seqno,
        path: format!("/raw/hd_rawdata_{run:06}_{seqno:03}.evio"),
        size_bytes: i64::from(nblocks) * 4096,
        nblocks,
    }
}

pub async fn register(pool: &PgPool, project_id: DbId, run: i32, seqno: i32, nblocks: i32) -> RawFile {
    RawFileRepo::register(pool, &new_raw_file(project_id, run, seqno, nblocks))
        .await
        .unwrap()
        .raw_file()
        .clone()
}

pub fn start_input(project_id: DbId, cluster_id: i64, process_id: i64, cpus: i32) -> StartJob {
    StartJob {
        project_id,
        cluster_id,
        process_id,
        worker_addr: WORKER_ADDR.to_string(),
        cpus,
    }
}

pub async fn start_job(pool: &PgPool, project_id: DbId, cluster_id: i64, process_id: i64, cpus: i32) -> Job {
    JobRepo::start(pool, &start_input(project_id, cluster_id, process_id, cpus))
        .await
        .unwrap()
        .expect("job should be open")
}

pub async fn finish_job(pool: &PgPool, job: &Job, exit_code: i32) {
    let finished = JobRepo::finish(
        pool,
        &FinishJob {
            project_id: job.project_id,
            cluster_id: job.cluster_id,
            process_id: job.process_id,
            worker_addr: job.worker_addr.clone(),
            exit_code,
        },
    )
    .await
    .unwrap();
    assert!(finished.is_some(), "job {} should have been open", job.id);
}

pub async fn ranges(pool: &PgPool, raw_file_id: DbId) -> Vec<BlockRange> {
    SliceRepo::list_for_file(pool, raw_file_id)
        .await
        .unwrap()
        .iter()
        .map(|s| s.range())
        .collect()
}

pub fn r(block1: i32, block2: i32) -> BlockRange {
    BlockRange::new(block1, block2).unwrap()
}
