//! Route definitions for the `/georectify` resource.

use axum::routing::post;
use axum::Router;

use crate::handlers::georectify;
use crate::state::AppState;

/// Routes mounted at `/georectify`.
///
/// ```text
/// POST /match      -> run_match (synchronous, caches the outcome)
/// POST /estimate   -> run_estimate (synchronous camera solution preview)
/// POST /process    -> start_process (202, job id)
/// POST /export     -> start_export (202, job id)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/match", post(georectify::run_match))
        .route("/estimate", post(georectify::run_estimate))
        .route("/process", post(georectify::start_process))
        .route("/export", post(georectify::start_export))
}
