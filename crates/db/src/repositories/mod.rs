//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument. Multi-statement operations that
//! must be atomic open their own transaction.

pub mod binding_repo;
pub mod job_repo;
pub mod project_repo;
pub mod raw_file_repo;
pub mod slice_repo;

pub use binding_repo::{BindingClaim, BindingRepo};
pub use job_repo::JobRepo;
pub use project_repo::ProjectRepo;
pub use raw_file_repo::{RawFileRepo, Registration};
pub use slice_repo::{Allocation, SliceRepo};
