//! Slice dispatcher HTTP server library.
//!
//! Exposes config, state, error handling, the dispatcher service and the
//! routes so integration tests and the binary entrypoint share them.

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod handlers;
pub mod router;
pub mod routes;
pub mod state;
