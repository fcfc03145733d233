//! Route definitions for the `/projects` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::projects;
use crate::state::AppState;

/// Routes mounted at `/projects`.
///
/// ```text
/// GET    /             -> list_projects
/// POST   /             -> create_project
/// GET    /{id}         -> get_project
/// PUT    /{id}         -> update_project
/// DELETE /{id}         -> delete_project
/// GET    /{id}/report  -> get_project_report (json or text)
/// POST   /{id}/save    -> save_project (archive to disk)
/// POST   /load         -> load_project (archive from disk)
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route(
            "/",
            get(projects::list_projects).post(projects::create_project),
        )
        .route(
            "/{id}",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        )
        .route("/{id}/report", get(projects::get_project_report))
        .route("/{id}/save", post(projects::save_project))
        .route("/load", post(projects::load_project))
}
