use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use photerra_api::config::ServerConfig;
use photerra_api::router::build_app_router;
use photerra_api::state::AppState;
use photerra_core::engine::{GeorectifyEngine, ToolEngine};
use photerra_core::jobs::JobQueue;
use photerra_core::match_cache::MatchCache;
use photerra_core::project::ProjectStore;
use photerra_core::recovery::RecoveryStore;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "photerra_api=debug,photerra_core=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(host = %config.host, port = %config.port, "Loaded server configuration");

    // --- Stores ---
    let recovery = RecoveryStore::new(config.recovery_dir.clone())
        .expect("Failed to create recovery directory");
    let pending = recovery.list_checkpoints().len();
    if pending > 0 {
        tracing::info!(pending, "Recovery checkpoints found from a previous session");
    }

    let match_cache = MatchCache::new(Some(config.temp_dir.join("match_cache")));

    // --- Engine ---
    let engine: Option<Arc<dyn GeorectifyEngine>> = match &config.engine_command {
        Some(command) => {
            let engine =
                ToolEngine::from_command_line(command, Duration::from_secs(config.job_timeout_secs))
                    .expect("Invalid PHOTERRA_ENGINE_COMMAND");
            tracing::info!(command = %command, "Engine configured");
            Some(Arc::new(engine))
        }
        None => {
            tracing::warn!("No engine configured; processing endpoints will reject requests");
            None
        }
    };

    // --- App state ---
    let state = AppState {
        jobs: Arc::new(JobQueue::new(config.max_concurrent_jobs)),
        projects: Arc::new(ProjectStore::new()),
        recovery: Arc::new(recovery),
        match_cache: Arc::new(match_cache),
        engine,
        config: Arc::new(config.clone()),
    };

    // --- Router ---
    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid PHOTERRA_HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Graceful shutdown complete");
}

/// Wait for a termination signal to initiate graceful shutdown.
///
/// Handles both SIGINT (Ctrl-C) and SIGTERM (on Unix) so the server shuts
/// down cleanly whether stopped interactively or by the desktop app that
/// spawned it.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            tracing::info!("Received Ctrl-C, shutting down");
        }
        _ = terminate => {
            tracing::info!("Received SIGTERM, shutting down");
        }
    }
}
