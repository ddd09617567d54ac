//! Pure domain logic for the block-slice dispatcher and reconciler.
//!
//! Nothing in this crate touches the database. Range arithmetic, raw-file
//! framing, worker-script rendering and the output-category registry live
//! here so both the HTTP dispatcher and the binder can share them.

pub mod diagnostics;
pub mod error;
pub mod evio;
pub mod framing;
pub mod naming;
pub mod registry;
pub mod slicing;
pub mod types;
pub mod workscript;
