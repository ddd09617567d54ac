//! Integration tests for the health check endpoint and general HTTP behaviour.

mod common;

use axum::http::StatusCode;
use common::{body_json, get};
use sqlx::PgPool;

#[sqlx::test(migrations = "../../db/migrations")]
async fn health_reports_store_round_trip(pool: PgPool) {
    common::seed_project(&pool).await;
    let app = common::build_test_app(pool);
    let response = get(app, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert!(json["version"].is_string());
    assert_eq!(json["store"]["reachable"], true);
    assert!(json["store"]["latency_ms"].is_u64());
    assert_eq!(json["store"]["projects"], 1);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn closed_store_is_degraded_not_an_error(pool: PgPool) {
    let app = common::build_test_app(pool.clone());
    pool.close().await;
    let response = get(app, "/health").await;

    assert_eq!(response.status(), StatusCode::OK);

    let json = body_json(response).await;
    assert_eq!(json["status"], "degraded");
    assert_eq!(json["store"]["reachable"], false);
    assert!(json["store"].get("projects").is_none());
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn unknown_route_returns_404(pool: PgPool) {
    let app = common::build_test_app(pool);
    let response = get(app, "/this-route-does-not-exist").await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[sqlx::test(migrations = "../../db/migrations")]
async fn response_contains_x_request_id_header(pool: PgPool) {
    let app = common::build_test_app(pool);
    let response = get(app, "/health").await;

    let request_id = response.headers().get("x-request-id");
    assert!(
        request_id.is_some(),
        "Response must contain an x-request-id header"
    );
    assert_eq!(request_id.unwrap().to_str().unwrap().len(), 36);
}
