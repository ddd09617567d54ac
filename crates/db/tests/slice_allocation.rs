//! Integration tests for raw-file registration, job lifecycle and slice
//! allocation.

mod common;

use assert_matches::assert_matches;
use common::*;
use slicer_core::slicing::check_partition;
use slicer_db::error::is_unique_violation;
use slicer_db::models::job::FinishJob;
use slicer_db::repositories::{Allocation, JobRepo, ProjectRepo, RawFileRepo, Registration, SliceRepo};
use sqlx::PgPool;

// ---------------------------------------------------------------------------
// Registration
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn register_creates_whole_file_slice(pool: PgPool) {
    let project = create_project(&pool, "recon").await;
    let registration = RawFileRepo::register(&pool, &new_raw_file(project.id, 71000, 3, 10))
        .await
        .unwrap();

    let file = assert_matches!(registration, Registration::Created(f) => f);
    assert_eq!(file.nblocks, 10);
    assert_eq!(ranges(&pool, file.id).await, vec![r(0, 10)]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn register_same_path_returns_existing(pool: PgPool) {
    let project = create_project(&pool, "recon").await;
    let first = register(&pool, project.id, 71000, 3, 10).await;

    let mut changed = new_raw_file(project.id, 71000, 3, 12);
    changed.size_bytes += 1;
    let again = RawFileRepo::register(&pool, &changed).await.unwrap();

    let existing = assert_matches!(again, Registration::Existing(f) => f);
    assert_eq!(existing.id, first.id);
    assert_eq!(existing.nblocks, 10, "stored row must not be overwritten");
    assert_eq!(existing.mismatches(&changed).len(), 2);
    assert_eq!(ranges(&pool, first.id).await, vec![r(0, 10)]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn register_duplicate_run_seqno_on_new_path_fails(pool: PgPool) {
    let project = create_project(&pool, "recon").await;
    register(&pool, project.id, 71000, 3, 10).await;

    let mut dup = new_raw_file(project.id, 71000, 3, 10);
    dup.path = "/elsewhere/copy_071000_003.evio".to_string();
    let err = RawFileRepo::register(&pool, &dup).await.unwrap_err();
    assert!(is_unique_violation(&err, Some("uq_raw_files_run_seqno")));
}

// ---------------------------------------------------------------------------
// Jobs
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn restart_of_open_job_bumps_counter(pool: PgPool) {
    let project = create_project(&pool, "recon").await;
    let first = start_job(&pool, project.id, 881, 4, 3).await;
    assert_eq!(first.restarts, 1);

    let second = start_job(&pool, project.id, 881, 4, 2).await;
    assert_eq!(second.id, first.id);
    assert_eq!(second.restarts, 2);
    assert_eq!(second.cpus, 2);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn closed_job_is_never_reopened(pool: PgPool) {
    let project = create_project(&pool, "recon").await;
    let job = start_job(&pool, project.id, 881, 4, 3).await;
    finish_job(&pool, &job, 0).await;

    let restarted = JobRepo::start(&pool, &start_input(project.id, 881, 4, 3))
        .await
        .unwrap();
    assert!(restarted.is_none());

    let stored = JobRepo::find_by_id(&pool, job.id).await.unwrap().unwrap();
    assert!(!stored.is_open());
    assert_eq!(stored.exit_code, Some(0));
    assert_eq!(stored.restarts, 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn finish_is_idempotent_and_checks_worker_address(pool: PgPool) {
    let project = create_project(&pool, "recon").await;
    let job = start_job(&pool, project.id, 881, 4, 3).await;

    let mut report = FinishJob {
        project_id: project.id,
        cluster_id: 881,
        process_id: 4,
        worker_addr: "10.1.9.9".to_string(),
        exit_code: 0,
    };
    assert!(JobRepo::finish(&pool, &report).await.unwrap().is_none());

    report.worker_addr = job.worker_addr.clone();
    assert!(JobRepo::finish(&pool, &report).await.unwrap().is_some());
    assert!(JobRepo::finish(&pool, &report).await.unwrap().is_none());
}

// ---------------------------------------------------------------------------
// Allocation
// ---------------------------------------------------------------------------

#[sqlx::test(migrations = "../../db/migrations")]
async fn ten_block_file_splits_then_drains(pool: PgPool) {
    let project = create_project(&pool, "recon").await;
    let file = register(&pool, project.id, 71000, 3, 10).await;

    // max_blocks_per_core = 2, 3 cores -> 6 blocks.
    let a = start_job(&pool, project.id, 1, 0, 3).await;
    let first = SliceRepo::allocate(&pool, project.id, a.id, 6).await.unwrap();
    let (slice, remainder) = assert_matches!(first, Allocation::Granted { slice, remainder } => (slice, remainder));
    assert_eq!(slice.range(), r(0, 6));
    assert_eq!(slice.job_id, Some(a.id));
    let remainder = remainder.expect("remainder slice");
    assert_eq!(remainder.range(), r(6, 10));
    assert_eq!(remainder.job_id, None);
    check_partition(file.nblocks, &ranges(&pool, file.id).await).unwrap();

    // 4 cores -> 8 blocks, but only 4 are left.
    let b = start_job(&pool, project.id, 1, 1, 4).await;
    let second = SliceRepo::allocate(&pool, project.id, b.id, 8).await.unwrap();
    let (slice, remainder) = assert_matches!(second, Allocation::Granted { slice, remainder } => (slice, remainder));
    assert_eq!(slice.range(), r(6, 10));
    assert!(remainder.is_none());
    check_partition(file.nblocks, &ranges(&pool, file.id).await).unwrap();

    let c = start_job(&pool, project.id, 1, 2, 1).await;
    assert_matches!(
        SliceRepo::allocate(&pool, project.id, c.id, 2).await.unwrap(),
        Allocation::NoWork
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn repeated_allocation_resumes_same_slice(pool: PgPool) {
    let project = create_project(&pool, "recon").await;
    register(&pool, project.id, 71000, 3, 10).await;
    let job = start_job(&pool, project.id, 5, 0, 1).await;

    let first = SliceRepo::allocate(&pool, project.id, job.id, 2).await.unwrap();
    let granted = assert_matches!(first, Allocation::Granted { slice, .. } => slice);

    let again = SliceRepo::allocate(&pool, project.id, job.id, 2).await.unwrap();
    let resumed = assert_matches!(again, Allocation::Resumed(slice) => slice);
    assert_eq!(resumed.id, granted.id);
    assert_eq!(resumed.range(), granted.range());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn allocation_stays_within_project(pool: PgPool) {
    let recon = create_project(&pool, "recon").await;
    let other = ProjectRepo::create(&pool, &new_project("calib")).await.unwrap();
    register(&pool, recon.id, 71000, 3, 10).await;

    let job = start_job(&pool, other.id, 9, 0, 1).await;
    assert_matches!(
        SliceRepo::allocate(&pool, other.id, job.id, 2).await.unwrap(),
        Allocation::NoWork
    );
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn lowest_slice_id_is_claimed_first(pool: PgPool) {
    let project = create_project(&pool, "recon").await;
    let early = register(&pool, project.id, 71000, 1, 4).await;
    let late = register(&pool, project.id, 71000, 2, 4).await;

    let job = start_job(&pool, project.id, 2, 0, 2).await;
    let slice = assert_matches!(
        SliceRepo::allocate(&pool, project.id, job.id, 4).await.unwrap(),
        Allocation::Granted { slice, .. } => slice
    );
    assert_eq!(slice.raw_file_id, early.id);
    assert_eq!(ranges(&pool, late.id).await, vec![r(0, 4)]);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn concurrent_allocations_never_overlap(pool: PgPool) {
    let project = create_project(&pool, "recon").await;
    let file = register(&pool, project.id, 71000, 3, 40).await;

    let mut jobs = Vec::new();
    for process in 0..8 {
        jobs.push(start_job(&pool, project.id, 7, process, 1).await);
    }

    let handles: Vec<_> = jobs
        .iter()
        .map(|job| {
            let pool = pool.clone();
            let job_id = job.id;
            let project_id = project.id;
            tokio::spawn(async move { SliceRepo::allocate(&pool, project_id, job_id, 3).await })
        })
        .collect();

    // SKIP LOCKED lets losers see no work rather than wait; they retry.
    let mut retry = Vec::new();
    for (job, handle) in jobs.iter().zip(handles) {
        if let Allocation::NoWork = handle.await.unwrap().unwrap() {
            retry.push(job.id);
        }
    }
    for job_id in retry {
        assert_matches!(
            SliceRepo::allocate(&pool, project.id, job_id, 3).await.unwrap(),
            Allocation::Granted { .. }
        );
    }

    let slices = SliceRepo::list_for_file(&pool, file.id).await.unwrap();
    let covered: Vec<_> = slices.iter().map(|s| s.range()).collect();
    check_partition(file.nblocks, &covered).unwrap();
    let assigned = slices.iter().filter(|s| s.job_id.is_some()).count();
    assert_eq!(assigned, 8);
}
