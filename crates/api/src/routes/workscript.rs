use axum::routing::get;
use axum::Router;

use crate::handlers::workscript;
use crate::state::AppState;

/// Worker-facing routes.
///
/// ```text
/// GET /workscript          -> checkout
/// GET /workscript/exit     -> report
/// GET /workscript/status   -> status
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/workscript", get(workscript::checkout))
        .route("/workscript/exit", get(workscript::report))
        .route("/workscript/status", get(workscript::status))
}
