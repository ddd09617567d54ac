//! Completion detection and reconciliation of raw files.
//!
//! One call to [`Binder::next`] claims at most one ready raw file, merges
//! the per-slice outputs of every registry category and records either
//! success or the exact set of bad block ranges on the file's binding.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use slicer_core::diagnostics::implicated_ranges;
use slicer_core::error::CoreError;
use slicer_core::naming::{archive_path, bundle_name, output_suffix};
use slicer_core::registry::{OutputCategory, CATEGORIES};
use slicer_core::slicing::{format_bad_ranges, BlockRange};
use slicer_core::types::DbId;
use slicer_db::models::binding::Binding;
use slicer_db::models::raw_file::RawFile;
use slicer_db::models::slice::CompletedSlice;
use slicer_db::repositories::{BindingClaim, BindingRepo, ProjectRepo, RawFileRepo, SliceRepo};
use slicer_db::DbPool;

use crate::bundle;
use crate::config::BinderConfig;
use crate::error::BinderError;
use crate::merge::{MergeOutcome, Merger};
use crate::scratch::ScratchDir;
use crate::transfer::{retrying, Transfer};

/// Result of one reconciliation attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NextOutcome {
    /// A file was claimed and its binding finalized with `status`.
    Bound { raw_file_id: DbId, status: i32 },
    /// No raw file is ready.
    NothingReady,
    /// Another binder claimed the ready file first.
    Collision,
}

pub struct Binder {
    pool: DbPool,
    config: BinderConfig,
    transfer: Arc<dyn Transfer>,
    merger: Arc<dyn Merger>,
}

impl Binder {
    pub fn new(
        pool: DbPool,
        config: BinderConfig,
        transfer: Arc<dyn Transfer>,
        merger: Arc<dyn Merger>,
    ) -> Self {
        Self {
            pool,
            config,
            transfer,
            merger,
        }
    }

    /// Claim and reconcile the next ready raw file, if any.
    ///
    /// If processing fails outright (store unreachable, scratch unusable) the
    /// in-progress binding is deleted again so the file stays ready.
    pub async fn next(&self) -> Result<NextOutcome, BinderError> {
        let Some(raw_file_id) = BindingRepo::find_ready(&self.pool).await? else {
            return Ok(NextOutcome::NothingReady);
        };

        let binding = match BindingRepo::claim(&self.pool, raw_file_id).await? {
            BindingClaim::Claimed(binding) => binding,
            BindingClaim::Collision => {
                tracing::info!(raw_file_id, "Binding collision, another binder won");
                return Ok(NextOutcome::Collision);
            }
        };
        tracing::info!(raw_file_id, binding_id = binding.id, "Claimed raw file");

        match self.process(&binding).await {
            Ok(finalized) => Ok(NextOutcome::Bound {
                raw_file_id,
                status: finalized.status.unwrap_or_default(),
            }),
            Err(e) => {
                tracing::error!(raw_file_id, error = %e, "Reconciliation failed, releasing binding");
                if let Err(release) = BindingRepo::abandon(&self.pool, binding.id).await {
                    tracing::error!(raw_file_id, error = %release, "Failed to release binding");
                }
                Err(e)
            }
        }
    }

    async fn process(&self, binding: &Binding) -> Result<Binding, BinderError> {
        let raw_file = RawFileRepo::find_by_id(&self.pool, binding.raw_file_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "raw_file",
                id: binding.raw_file_id,
            })?;
        let project = ProjectRepo::find_by_id(&self.pool, raw_file.project_id)
            .await?
            .ok_or(CoreError::NotFound {
                entity: "project",
                id: raw_file.project_id,
            })?;
        let slices = SliceRepo::completed_for_file(&self.pool, raw_file.id).await?;

        let scratch = ScratchDir::create(&self.config.scratch_dir, raw_file.id).await?;
        let mut bad = BTreeSet::new();

        let fetched = self.fetch_slices(&raw_file, &slices, &scratch, &mut bad).await;

        for category in CATEGORIES {
            self.reconcile_category(
                category,
                &raw_file,
                Path::new(&project.archive_prefix),
                &fetched,
                &scratch,
                &mut bad,
            )
            .await?;
        }

        let status = -i32::try_from(bad.len()).unwrap_or(i32::MAX);
        let detail = format_bad_ranges(&bad);
        let finalized = BindingRepo::finalize(&self.pool, binding.id, status, &detail).await?;

        if bad.is_empty() {
            tracing::info!(raw_file_id = raw_file.id, "Raw file bound");
        } else {
            tracing::warn!(raw_file_id = raw_file.id, status, bad = %detail, "Raw file bound with bad ranges");
        }
        Ok(finalized)
    }

    /// Fetch and unpack each slice's bundle. Returns the ranges whose bundle
    /// is available in scratch; every other range is added to `bad`.
    async fn fetch_slices(
        &self,
        raw_file: &RawFile,
        slices: &[CompletedSlice],
        scratch: &ScratchDir,
        bad: &mut BTreeSet<BlockRange>,
    ) -> Vec<BlockRange> {
        let mut fetched = Vec::with_capacity(slices.len());
        for slice in slices {
            let range = slice.range();
            if slice.exit_code != Some(0) {
                tracing::warn!(
                    raw_file_id = raw_file.id,
                    job_id = slice.job_id,
                    exit_code = slice.exit_code,
                    range = %range,
                    "Slice job did not succeed"
                );
                bad.insert(range);
                continue;
            }

            let name = bundle_name(slice.cluster_id, slice.process_id);
            match self.fetch_bundle(&name, &scratch.slice_dir(range), scratch.path()).await {
                Ok(files) => {
                    tracing::debug!(raw_file_id = raw_file.id, range = %range, files, "Unpacked bundle");
                    fetched.push(range);
                }
                Err(e) => {
                    tracing::warn!(raw_file_id = raw_file.id, range = %range, error = %e, "Slice bundle unavailable");
                    bad.insert(range);
                }
            }
        }
        fetched
    }

    async fn fetch_bundle(
        &self,
        name: &str,
        slice_dir: &Path,
        scratch: &Path,
    ) -> Result<usize, BinderError> {
        let local = scratch.join(name);
        retrying(&local, self.config.transfer_attempts, || {
            self.transfer.fetch(name, &local)
        })
        .await?;
        let unpacked = bundle::unpack(&local, slice_dir).await;
        tokio::fs::remove_file(&local).await?;
        unpacked
    }

    async fn reconcile_category(
        &self,
        category: &OutputCategory,
        raw_file: &RawFile,
        archive_prefix: &Path,
        fetched: &[BlockRange],
        scratch: &ScratchDir,
        bad: &mut BTreeSet<BlockRange>,
    ) -> Result<(), BinderError> {
        let mut inputs: Vec<PathBuf> = Vec::new();
        let mut contributing: Vec<BlockRange> = Vec::new();
        for &range in fetched {
            let suffix = output_suffix(raw_file.run, raw_file.seqno, range);
            let source = scratch.slice_dir(range).join(category.source_name(&suffix));
            if tokio::fs::try_exists(&source).await? {
                inputs.push(source);
                contributing.push(range);
            } else if category.required {
                tracing::warn!(
                    raw_file_id = raw_file.id,
                    category = category.name,
                    range = %range,
                    "Required output missing"
                );
                bad.insert(range);
            }
        }
        if inputs.is_empty() {
            return Ok(());
        }

        let file_name = format!(
            "{}_{:06}_{:03}.{}",
            category.name, raw_file.run, raw_file.seqno, category.dest_ext
        );
        let output = scratch.path().join(&file_name);

        match self.merger.merge(category, &output, &inputs).await? {
            MergeOutcome::Merged => {}
            MergeOutcome::Failed {
                exit_code,
                diagnostics,
            } => {
                let named = implicated_ranges(&diagnostics, raw_file.run, raw_file.seqno);
                let mut culprits: Vec<BlockRange> = contributing
                    .iter()
                    .copied()
                    .filter(|r| named.contains(r))
                    .collect();
                if culprits.is_empty() {
                    culprits = contributing;
                }
                tracing::warn!(
                    raw_file_id = raw_file.id,
                    category = category.name,
                    exit_code,
                    culprits = culprits.len(),
                    "Merge failed"
                );
                bad.extend(culprits);
                return Ok(());
            }
        }

        let dest = archive_path(
            archive_prefix,
            category.name,
            raw_file.run,
            raw_file.seqno,
            category.dest_ext,
        );
        let uploaded = retrying(&dest, self.config.transfer_attempts, || {
            self.transfer.upload(&output, &dest)
        })
        .await;
        match uploaded {
            Ok(()) => {
                tracing::info!(
                    raw_file_id = raw_file.id,
                    category = category.name,
                    dest = %dest.display(),
                    "Archived merged output"
                );
            }
            Err(e) => {
                tracing::error!(raw_file_id = raw_file.id, category = category.name, error = %e, "Upload failed");
                bad.extend(contributing);
            }
        }
        Ok(())
    }
}
