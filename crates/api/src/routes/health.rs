//! Liveness endpoint for operators and load balancers.
//!
//! Always answers 200; an unreachable store is reported as
//! `"status": "degraded"`.

use std::time::Instant;

use axum::extract::State;
use axum::{routing::get, Json, Router};
use serde::Serialize;
use slicer_db::repositories::ProjectRepo;
use slicer_db::DbPool;

use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct StoreHealth {
    pub reachable: bool,
    /// Round-trip time of the store query.
    pub latency_ms: u64,
    /// Registered projects; absent when the store is unreachable.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub projects: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub store: StoreHealth,
}

async fn store_health(pool: &DbPool) -> StoreHealth {
    let start = Instant::now();
    let projects = ProjectRepo::count(pool).await;
    let latency_ms = start.elapsed().as_millis() as u64;

    match projects {
        Ok(n) => StoreHealth {
            reachable: true,
            latency_ms,
            projects: Some(n),
        },
        Err(e) => {
            tracing::warn!(error = %e, latency_ms, "Store health query failed");
            StoreHealth {
                reachable: false,
                latency_ms,
                projects: None,
            }
        }
    }
}

/// GET /health
async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let store = store_health(&state.pool).await;
    Json(HealthResponse {
        status: if store.reachable { "ok" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        store,
    })
}

pub fn router() -> Router<AppState> {
    Router::new().route("/health", get(health))
}
