#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use axum::body::Body;
use axum::extract::connect_info::MockConnectInfo;
use axum::http::{Request, StatusCode};
use axum::response::Response;
use axum::Router;
use http_body_util::BodyExt;
use sqlx::PgPool;
use tower::ServiceExt;

use slicer_api::config::ServerConfig;
use slicer_api::router::build_app_router;
use slicer_api::state::AppState;
use slicer_db::models::project::{CreateProject, Project};
use slicer_db::models::raw_file::{CreateRawFile, RawFile};
use slicer_db::repositories::{ProjectRepo, RawFileRepo};

pub const MAGIC: &str = "test-magic";

/// An address inside the test project's subnet.
pub const INSIDE: [u8; 4] = [10, 1, 2, 3];

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        request_timeout_secs: 30,
        shutdown_timeout_secs: 30,
        magic: MAGIC.to_string(),
    }
}

/// Build the full application router, with every request appearing to come
/// from `peer`.
pub fn build_test_app_from(pool: PgPool, peer: [u8; 4]) -> Router {
    let config = test_config();
    let state = AppState {
        pool,
        config: Arc::new(config.clone()),
    };
    build_app_router(state, &config).layer(MockConnectInfo(SocketAddr::from((peer, 40000))))
}

pub fn build_test_app(pool: PgPool) -> Router {
    build_test_app_from(pool, INSIDE)
}

pub async fn get(app: Router, uri: &str) -> Response {
    app.oneshot(Request::get(uri).body(Body::empty()).unwrap())
        .await
        .unwrap()
}

pub async fn body_text(response: Response) -> String {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    String::from_utf8(bytes.to_vec()).unwrap()
}

pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

pub async fn get_text(app: Router, uri: &str) -> (StatusCode, String) {
    let response = get(app, uri).await;
    let status = response.status();
    (status, body_text(response).await)
}

// ---------------------------------------------------------------------------
// Fixtures
// ---------------------------------------------------------------------------

pub const TEMPLATE: &str = "#!/bin/bash\n\
    hd_root {{INPUT_FILES}} -PNTHREADS={{CPUS}}\n\
    mv hd_root.root hd_root_{{OUTPUT_SUFFIX}}.root\n";

/// A project named `recon` admitting `10.1.0.0/16`, 2 blocks per core,
/// reading `/raw` through an xrootd prefix.
pub async fn seed_project(pool: &PgPool) -> Project {
    ProjectRepo::create(
        pool,
        &CreateProject {
            name: "recon".to_string(),
            allowed_subnet: "10.1.0.0/16".to_string(),
            template_name: "recon.sh".to_string(),
            template: TEMPLATE.to_string(),
            archive_prefix: "/archive/recon".to_string(),
            storage_root: "/raw".to_string(),
            input_prefix: "root://xrd.example.org/store".to_string(),
            max_blocks_per_core: 2,
        },
    )
    .await
    .unwrap()
}

pub async fn seed_raw_file(pool: &PgPool, project_id: i64, nblocks: i32) -> RawFile {
    RawFileRepo::register(
        pool,
        &CreateRawFile {
            project_id,
            run: 71000,
            seqno: 3,
            path: "/raw/Run071000/hd_rawdata_071000_003.evio".to_string(),
            size_bytes: i64::from(nblocks) * 1024,
            nblocks,
        },
    )
    .await
    .unwrap()
    .raw_file()
    .clone()
}

pub fn checkout_uri(process: i64, cpus: i32) -> String {
    format!("/workscript?magic={MAGIC}&project=recon&cluster=881&process={process}&cpus={cpus}")
}

pub fn exit_uri(process: i64, exitcode: i32) -> String {
    format!("/workscript/exit?magic={MAGIC}&project=recon&cluster=881&process={process}&exitcode={exitcode}")
}
