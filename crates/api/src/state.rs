use std::sync::Arc;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable. The dispatcher keeps no other in-process state; all
/// coordination happens in the database.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: slicer_db::DbPool,
    /// Server configuration.
    pub config: Arc<ServerConfig>,
}
