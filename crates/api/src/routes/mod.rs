pub mod georectify;
pub mod health;
pub mod jobs;
pub mod projects;
pub mod recovery;

use axum::Router;

use crate::state::AppState;

/// Build the `/api` route tree.
///
/// Route hierarchy:
///
/// ```text
/// /projects                    list, create
/// /projects/{id}               get, update, delete
/// /projects/{id}/report        processing report, json or text (GET)
/// /projects/{id}/save          save archive (POST)
/// /projects/load               load archive (POST)
///
/// /georectify/match            run matching, cache the outcome (POST)
/// /georectify/estimate         run camera estimation inline (POST)
/// /georectify/process          submit a georectification job (POST)
/// /georectify/export           submit a GeoTIFF export job (POST)
///
/// /jobs/{id}                   job snapshot (GET)
/// /jobs/{id}                   cancel (DELETE)
/// /jobs/{id}/ws                progress stream (WebSocket)
///
/// /recovery/check              GC stale checkpoints, then list (GET)
/// /recovery/restore            restore a checkpoint (POST)
/// /recovery/{filename}         delete one checkpoint (DELETE)
/// /recovery                    delete all checkpoints (DELETE)
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .nest("/projects", projects::router())
        .nest("/georectify", georectify::router())
        .nest("/jobs", jobs::router())
        .nest("/recovery", recovery::router())
}
