use std::sync::Arc;

use photerra_core::engine::GeorectifyEngine;
use photerra_core::jobs::JobQueue;
use photerra_core::match_cache::MatchCache;
use photerra_core::project::ProjectStore;
use photerra_core::recovery::RecoveryStore;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheaply cloneable; every field is behind `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration.
    pub config: Arc<ServerConfig>,
    /// Background job queue.
    pub jobs: Arc<JobQueue>,
    /// In-memory project registry.
    pub projects: Arc<ProjectStore>,
    /// Crash-recovery checkpoint store.
    pub recovery: Arc<RecoveryStore>,
    /// Cache of match outcomes keyed by match id.
    pub match_cache: Arc<MatchCache>,
    /// Computer-vision engine. `None` when no engine command is configured.
    pub engine: Option<Arc<dyn GeorectifyEngine>>,
}
