//! Returning failed ranges to the work pool.

use serde::Serialize;
use slicer_core::slicing::{parse_bad_ranges, BlockRange};
use slicer_core::types::DbId;
use slicer_db::repositories::BindingRepo;
use slicer_db::DbPool;

use crate::error::BinderError;

/// What recycling did for one raw file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Recycled {
    pub raw_file_id: DbId,
    pub run: i32,
    pub seqno: i32,
    pub ranges: Vec<BlockRange>,
    /// Slices whose job link was cleared.
    pub released: u64,
}

/// Recycle every failed binding whose raw file's run is in `[run_lo, run_hi]`.
///
/// Each file is released in its own transaction. A binding that disappears
/// or is re-bound between listing and release is skipped.
pub async fn recycle(pool: &DbPool, run_lo: i32, run_hi: i32) -> Result<Vec<Recycled>, BinderError> {
    let failed = BindingRepo::failed_in_runs(pool, run_lo, run_hi).await?;
    let mut out = Vec::with_capacity(failed.len());

    for binding in failed {
        let ranges: Vec<BlockRange> = binding
            .detail
            .as_deref()
            .map(parse_bad_ranges)
            .unwrap_or_default()
            .into_iter()
            .collect();
        if ranges.is_empty() {
            tracing::warn!(
                raw_file_id = binding.raw_file_id,
                status = binding.status,
                "Failed binding names no ranges, releasing binding only"
            );
        }

        let Some(released) = BindingRepo::release_failed(pool, binding.binding_id, &ranges).await?
        else {
            continue;
        };
        tracing::info!(
            raw_file_id = binding.raw_file_id,
            run = binding.run,
            seqno = binding.seqno,
            released,
            "Recycled failed binding"
        );
        out.push(Recycled {
            raw_file_id: binding.raw_file_id,
            run: binding.run,
            seqno: binding.seqno,
            ranges,
            released,
        });
    }
    Ok(out)
}
