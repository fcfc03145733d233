//! Route definitions for the `/jobs` resource.

use axum::routing::get;
use axum::Router;

use crate::handlers::jobs;
use crate::state::AppState;
use crate::ws;

/// Routes mounted at `/jobs`.
///
/// ```text
/// GET    /{id}       -> get_job
/// DELETE /{id}       -> cancel_job
/// GET    /{id}/ws    -> progress WebSocket
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/{id}", get(jobs::get_job).delete(jobs::cancel_job))
        .route("/{id}/ws", get(ws::job_progress_ws))
}
