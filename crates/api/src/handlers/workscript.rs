//! Handlers for the worker-facing endpoints.
//!
//! Workers talk to the dispatcher with plain `curl`, so every request is a
//! GET with query parameters and every response is plain text. Soft outcomes
//! (no work, already complete, unrecognized report) are 200 with a body the
//! worker can execute or log.

use std::net::{IpAddr, SocketAddr};

use axum::extract::{ConnectInfo, Query, State};
use axum::http::header::CONTENT_TYPE;
use axum::response::IntoResponse;
use serde::Deserialize;
use slicer_core::error::CoreError;

use crate::dispatcher::{self, Checkout, CheckoutRequest, Report, ReportRequest};
use crate::error::AppResult;
use crate::state::AppState;

const TEXT_PLAIN: &str = "text/plain; charset=utf-8";

/// Query parameters for `GET /workscript`.
#[derive(Debug, Deserialize)]
pub struct CheckoutParams {
    #[serde(default)]
    pub magic: String,
    pub project: String,
    pub cluster: i64,
    pub process: i64,
    pub cpus: i32,
}

/// Query parameters for `GET /workscript/exit`.
#[derive(Debug, Deserialize)]
pub struct ExitParams {
    #[serde(default)]
    pub magic: String,
    pub project: String,
    pub cluster: i64,
    pub process: i64,
    pub exitcode: i32,
}

/// Query parameters for `GET /workscript/status`.
#[derive(Debug, Deserialize)]
pub struct StatusParams {
    #[serde(default)]
    pub magic: String,
    pub project: String,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn check_magic(state: &AppState, magic: &str) -> AppResult<()> {
    if magic != state.config.magic {
        return Err(CoreError::Unauthorized("Bad or missing token".into()).into());
    }
    Ok(())
}

/// The caller's address, with IPv4-mapped IPv6 folded back to IPv4.
fn caller(peer: SocketAddr) -> IpAddr {
    peer.ip().to_canonical()
}

fn text(body: String) -> impl IntoResponse {
    ([(CONTENT_TYPE, TEXT_PLAIN)], body)
}

// ---------------------------------------------------------------------------
// GET /workscript
// ---------------------------------------------------------------------------

/// GET /workscript
///
/// Check out (or resume) the job's slice and return its worker script.
pub async fn checkout(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(params): Query<CheckoutParams>,
) -> AppResult<impl IntoResponse> {
    check_magic(&state, &params.magic)?;

    let req = CheckoutRequest {
        project: &params.project,
        worker_addr: caller(peer),
        cluster_id: params.cluster,
        process_id: params.process,
        cpus: params.cpus,
    };
    let body = match dispatcher::checkout(&state.pool, &req).await? {
        Checkout::Script(script) => script,
        Checkout::AlreadyComplete => "echo Job already complete, nothing to do.\n".to_string(),
        Checkout::NoWork => "echo No work available, quitting.\n".to_string(),
    };
    Ok(text(body))
}

// ---------------------------------------------------------------------------
// GET /workscript/exit
// ---------------------------------------------------------------------------

/// GET /workscript/exit
///
/// Record the job's exit code. Repeated or unknown reports are acknowledged.
pub async fn report(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(params): Query<ExitParams>,
) -> AppResult<impl IntoResponse> {
    check_magic(&state, &params.magic)?;

    let req = ReportRequest {
        project: &params.project,
        worker_addr: caller(peer),
        cluster_id: params.cluster,
        process_id: params.process,
        exit_code: params.exitcode,
    };
    let body = match dispatcher::report(&state.pool, &req).await? {
        Report::Recorded(_) => "Recorded.\n",
        Report::Unrecognized => "Unrecognized job, ignored.\n",
    };
    Ok(text(body.to_string()))
}

// ---------------------------------------------------------------------------
// GET /workscript/status
// ---------------------------------------------------------------------------

/// GET /workscript/status
///
/// Plain-text progress summary for a project.
pub async fn status(
    State(state): State<AppState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    Query(params): Query<StatusParams>,
) -> AppResult<impl IntoResponse> {
    check_magic(&state, &params.magic)?;

    let p = dispatcher::status(&state.pool, &params.project, caller(peer)).await?;
    let body = format!(
        "project: {}\n\
         raw_files: {}\n\
         slices: {}\n\
         unassigned: {}\n\
         running: {}\n\
         finished: {}\n\
         bound_ok: {}\n\
         bound_failed: {}\n\
         binding: {}\n",
        params.project,
        p.raw_files,
        p.slices,
        p.unassigned,
        p.running,
        p.finished,
        p.bound_ok,
        p.bound_failed,
        p.binding,
    );
    Ok(text(body))
}
