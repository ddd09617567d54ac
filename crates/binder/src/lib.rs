//! Partitioning and reconciliation of raw files.
//!
//! The partitioner registers raw files and their initial slice. The binder
//! waits until every slice of a file has been processed, merges the
//! per-slice outputs category by category and archives the result.
//! Recycling returns the ranges a failed reconciliation named to the work
//! pool.

pub mod binder;
pub mod bundle;
pub mod config;
pub mod error;
pub mod merge;
pub mod partitioner;
pub mod recycle;
pub mod scratch;
pub mod transfer;
