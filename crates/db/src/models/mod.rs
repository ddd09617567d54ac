//! Domain model structs and DTOs.
//!
//! Each submodule contains a `FromRow` + `Serialize` entity struct matching
//! the database row and, where rows are created from outside, a create DTO.

pub mod binding;
pub mod job;
pub mod progress;
pub mod project;
pub mod raw_file;
pub mod slice;
