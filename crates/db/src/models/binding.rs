//! Binding entity model.

use serde::Serialize;
use slicer_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `bindings` table.
///
/// `status` is `None` while reconciliation is in progress, `0` on success
/// and minus the number of bad ranges on failure.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Binding {
    pub id: DbId,
    pub raw_file_id: DbId,
    pub started_at: Timestamp,
    pub ended_at: Option<Timestamp>,
    pub status: Option<i32>,
    pub detail: Option<String>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

impl Binding {
    pub fn is_failed(&self) -> bool {
        self.status.is_some_and(|s| s != 0)
    }
}

/// A failed binding joined with the run of its raw file, for recycling.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct FailedBinding {
    pub binding_id: DbId,
    pub raw_file_id: DbId,
    pub run: i32,
    pub seqno: i32,
    pub status: i32,
    pub detail: Option<String>,
}
