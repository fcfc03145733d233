//! Subprocess-backed engine.
//!
//! `ToolEngine` shells out to a configurable CLI once per operation: the
//! operation name goes on the command line, the spec as JSON on stdin, and
//! the outcome comes back as JSON on stdout. The child runs with
//! `kill_on_drop(true)`, so cancelling the job (which drops the in-flight
//! future) kills the engine process instead of orphaning it.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

use crate::error::CoreError;

use super::{
    EstimateOutcome, EstimateSpec, ExportOutcome, ExportSpec, GeorectifyEngine, MatchOutcome,
    MatchSpec, RectifyOutcome, RectifySpec,
};

/// Cap on captured stdout/stderr per stream (10 MiB). A runaway engine
/// must not exhaust server memory.
const MAX_CAPTURED_BYTES: u64 = 10 * 1024 * 1024;

/// How much stderr to carry into an error message.
const STDERR_SNIPPET_LEN: usize = 2000;

pub struct ToolEngine {
    /// Program plus leading arguments; the operation name is appended.
    command: Vec<String>,
    /// Per-operation wall-clock ceiling.
    timeout: Duration,
}

impl ToolEngine {
    pub fn new(command: Vec<String>, timeout: Duration) -> Result<Self, CoreError> {
        if command.is_empty() || command[0].trim().is_empty() {
            return Err(CoreError::Validation(
                "Engine command must not be empty".to_string(),
            ));
        }
        Ok(Self { command, timeout })
    }

    /// Build from a whitespace-separated command line (how the engine
    /// command arrives from configuration).
    pub fn from_command_line(line: &str, timeout: Duration) -> Result<Self, CoreError> {
        Self::new(line.split_whitespace().map(str::to_string).collect(), timeout)
    }

    /// Run one engine operation end to end.
    async fn invoke<S, O>(&self, operation: &str, spec: &S) -> Result<O, CoreError>
    where
        S: Serialize + Sync,
        O: DeserializeOwned,
    {
        let mut cmd = Command::new(&self.command[0]);
        cmd.args(&self.command[1..])
            .arg(operation)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        tracing::debug!(operation, program = %self.command[0], "Invoking engine");
        let mut child = cmd.spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            let payload = serde_json::to_vec(spec)
                .map_err(|e| CoreError::processing(operation, format!("Cannot encode spec: {e}")))?;
            // If the engine exits before reading its spec, the exit status
            // carries the real error; ignore the broken pipe here.
            let _ = stdin.write_all(&payload).await;
            drop(stdin);
        }

        let stdout_handle = child.stdout.take();
        let stderr_handle = child.stderr.take();
        let stdout_task = tokio::spawn(capture(stdout_handle));
        let stderr_task = tokio::spawn(capture(stderr_handle));

        // On timeout `child` drops here and kill_on_drop reaps it.
        let status = match tokio::time::timeout(self.timeout, child.wait()).await {
            Ok(result) => result?,
            Err(_) => {
                return Err(CoreError::processing(
                    operation,
                    format!("Engine timed out after {}s", self.timeout.as_secs()),
                ));
            }
        };

        let stdout = stdout_task.await.unwrap_or_default();
        let stderr = stderr_task.await.unwrap_or_default();

        if !status.success() {
            let snippet: String = String::from_utf8_lossy(&stderr)
                .trim()
                .chars()
                .take(STDERR_SNIPPET_LEN)
                .collect();
            let message = if snippet.is_empty() {
                format!("Engine exited with status {}", status.code().unwrap_or(-1))
            } else {
                snippet
            };
            return Err(CoreError::processing(operation, message));
        }

        let stdout = String::from_utf8_lossy(&stdout);
        serde_json::from_str(stdout.trim()).map_err(|e| {
            CoreError::processing(operation, format!("Engine produced invalid output: {e}"))
        })
    }
}

#[async_trait]
impl GeorectifyEngine for ToolEngine {
    async fn match_images(&self, spec: MatchSpec) -> Result<MatchOutcome, CoreError> {
        self.invoke("match", &spec).await
    }

    async fn estimate(&self, spec: EstimateSpec) -> Result<EstimateOutcome, CoreError> {
        self.invoke("estimate", &spec).await
    }

    async fn rectify(&self, spec: RectifySpec) -> Result<RectifyOutcome, CoreError> {
        self.invoke("rectify", &spec).await
    }

    async fn export_geotiff(&self, spec: ExportSpec) -> Result<ExportOutcome, CoreError> {
        self.invoke("export", &spec).await
    }
}

/// Drain a child stream into memory, capped at [`MAX_CAPTURED_BYTES`].
async fn capture<R: AsyncRead + Unpin>(handle: Option<R>) -> Vec<u8> {
    let mut buf = Vec::new();
    if let Some(mut handle) = handle {
        let _ = (&mut handle)
            .take(MAX_CAPTURED_BYTES)
            .read_to_end(&mut buf)
            .await;
    }
    buf
}
