use std::path::PathBuf;

/// Server configuration loaded from environment variables.
///
/// All fields have defaults suitable for the local desktop deployment: the
/// server binds to loopback and is consumed by the bundled frontend.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Bind address (default: `127.0.0.1`).
    pub host: String,
    /// Bind port (default: `8765`).
    pub port: u16,
    /// Allowed CORS origins, parsed from comma-separated `PHOTERRA_CORS_ORIGINS`.
    pub cors_origins: Vec<String>,
    /// HTTP request timeout in seconds (default: `30`). Long-running work
    /// goes through the job queue, never through a request body.
    pub request_timeout_secs: u64,
    /// Jobs allowed to execute simultaneously (default: `1` -- the engine
    /// saturates a workstation on its own).
    pub max_concurrent_jobs: usize,
    /// Per-engine-operation wall-clock ceiling in seconds (default: `3600`).
    pub job_timeout_secs: u64,
    /// Scratch space for intermediate rasters and the match cache.
    pub temp_dir: PathBuf,
    /// Crash-recovery checkpoint directory.
    pub recovery_dir: PathBuf,
    /// External engine command line (`PHOTERRA_ENGINE_COMMAND`), split on
    /// whitespace. `None` means no engine is configured and processing
    /// endpoints fail with a validation error.
    pub engine_command: Option<String>,
}

impl ServerConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                        | Default                          |
    /// |--------------------------------|----------------------------------|
    /// | `PHOTERRA_HOST`                | `127.0.0.1`                      |
    /// | `PHOTERRA_PORT`                | `8765`                           |
    /// | `PHOTERRA_CORS_ORIGINS`        | tauri + localhost dev origins    |
    /// | `PHOTERRA_REQUEST_TIMEOUT_SECS`| `30`                             |
    /// | `PHOTERRA_MAX_CONCURRENT_JOBS` | `1`                              |
    /// | `PHOTERRA_JOB_TIMEOUT_SECS`    | `3600`                           |
    /// | `PHOTERRA_TEMP_DIR`            | `{system temp}/photerra`         |
    /// | `PHOTERRA_RECOVERY_DIR`        | `~/.photerra/recovery`           |
    /// | `PHOTERRA_ENGINE_COMMAND`      | unset                            |
    pub fn from_env() -> Self {
        let host = std::env::var("PHOTERRA_HOST").unwrap_or_else(|_| "127.0.0.1".into());

        let port: u16 = std::env::var("PHOTERRA_PORT")
            .unwrap_or_else(|_| "8765".into())
            .parse()
            .expect("PHOTERRA_PORT must be a valid u16");

        let cors_origins: Vec<String> = std::env::var("PHOTERRA_CORS_ORIGINS")
            .unwrap_or_else(|_| {
                "tauri://localhost,http://localhost:1420,http://localhost:5173".into()
            })
            .split(',')
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let request_timeout_secs: u64 = std::env::var("PHOTERRA_REQUEST_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("PHOTERRA_REQUEST_TIMEOUT_SECS must be a valid u64");

        let max_concurrent_jobs: usize = std::env::var("PHOTERRA_MAX_CONCURRENT_JOBS")
            .unwrap_or_else(|_| "1".into())
            .parse()
            .expect("PHOTERRA_MAX_CONCURRENT_JOBS must be a valid usize");

        let job_timeout_secs: u64 = std::env::var("PHOTERRA_JOB_TIMEOUT_SECS")
            .unwrap_or_else(|_| "3600".into())
            .parse()
            .expect("PHOTERRA_JOB_TIMEOUT_SECS must be a valid u64");

        let temp_dir = std::env::var("PHOTERRA_TEMP_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| std::env::temp_dir().join("photerra"));

        let recovery_dir = std::env::var("PHOTERRA_RECOVERY_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|_| photerra_core::recovery::RecoveryStore::default_dir());

        let engine_command = std::env::var("PHOTERRA_ENGINE_COMMAND")
            .ok()
            .filter(|s| !s.trim().is_empty());

        Self {
            host,
            port,
            cors_origins,
            request_timeout_secs,
            max_concurrent_jobs,
            job_timeout_secs,
            temp_dir,
            recovery_dir,
            engine_command,
        }
    }
}
