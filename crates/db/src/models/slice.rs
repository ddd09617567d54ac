//! Slice entity model.

use serde::Serialize;
use slicer_core::slicing::BlockRange;
use slicer_core::types::{BlockIndex, DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `slices` table: the half-open range `[block1, block2)`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Slice {
    pub id: DbId,
    pub raw_file_id: DbId,
    pub block1: BlockIndex,
    pub block2: BlockIndex,
    pub job_id: Option<DbId>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Slice {
    pub fn range(&self) -> BlockRange {
        BlockRange {
            block1: self.block1,
            block2: self.block2,
        }
    }
}

/// A slice joined with the job that produced it, as the binder needs it.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct CompletedSlice {
    pub slice_id: DbId,
    pub block1: BlockIndex,
    pub block2: BlockIndex,
    pub job_id: DbId,
    pub cluster_id: i64,
    pub process_id: i64,
    pub exit_code: Option<i32>,
}

impl CompletedSlice {
    pub fn range(&self) -> BlockRange {
        BlockRange {
            block1: self.block1,
            block2: self.block2,
        }
    }
}
