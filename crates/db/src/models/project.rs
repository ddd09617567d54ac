//! Project entity model and DTOs.

use serde::{Deserialize, Serialize};
use slicer_core::types::{DbId, Timestamp};
use sqlx::FromRow;

/// A row from the `projects` table.
///
/// `allowed_subnet` is stored as CIDR and read back as text.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Project {
    pub id: DbId,
    pub name: String,
    pub allowed_subnet: String,
    pub template_name: String,
    pub template: String,
    pub archive_prefix: String,
    /// Leading part of raw paths rewritten to `input_prefix` in worker scripts.
    pub storage_root: String,
    pub input_prefix: String,
    pub max_blocks_per_core: i32,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for registering a project.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateProject {
    pub name: String,
    pub allowed_subnet: String,
    pub template_name: String,
    pub template: String,
    pub archive_prefix: String,
    #[serde(default)]
    pub storage_root: String,
    #[serde(default)]
    pub input_prefix: String,
    pub max_blocks_per_core: i32,
}
