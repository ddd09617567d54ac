//! Raw file entity model and DTOs.

use serde::Serialize;
use slicer_core::types::{BlockIndex, DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `raw_files` table. Immutable once inserted.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct RawFile {
    pub id: DbId,
    pub project_id: DbId,
    pub run: i32,
    pub seqno: i32,
    pub path: String,
    pub size_bytes: i64,
    pub nblocks: BlockIndex,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for registering a freshly scanned raw file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateRawFile {
    pub project_id: DbId,
    pub run: i32,
    pub seqno: i32,
    pub path: String,
    pub size_bytes: i64,
    pub nblocks: BlockIndex,
}

impl RawFile {
    /// Fields of `input` that disagree with this stored row.
    pub fn mismatches(&self, input: &CreateRawFile) -> Vec<String> {
        let mut out = Vec::new();
        if self.project_id != input.project_id {
            out.push(format!("project_id {} != {}", self.project_id, input.project_id));
        }
        if self.run != input.run {
            out.push(format!("run {} != {}", self.run, input.run));
        }
        if self.seqno != input.seqno {
            out.push(format!("seqno {} != {}", self.seqno, input.seqno));
        }
        if self.size_bytes != input.size_bytes {
            out.push(format!("size_bytes {} != {}", self.size_bytes, input.size_bytes));
        }
        if self.nblocks != input.nblocks {
            out.push(format!("nblocks {} != {}", self.nblocks, input.nblocks));
        }
        out
    }
}
