//! Route definitions for the `/recovery` resource.

use axum::routing::{delete, get, post};
use axum::Router;

use crate::handlers::recovery;
use crate::state::AppState;

/// Routes mounted at `/recovery`.
///
/// ```text
/// GET    /check        -> check_recovery (GC, then list)
/// POST   /restore      -> restore_checkpoint
/// DELETE /{filename}   -> delete_checkpoint
/// DELETE /             -> delete_all_checkpoints
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/check", get(recovery::check_recovery))
        .route("/restore", post(recovery::restore_checkpoint))
        .route("/{filename}", delete(recovery::delete_checkpoint))
        .route("/", delete(recovery::delete_all_checkpoints))
}
