//! Crash-recovery checkpoints.
//!
//! Before a long-running job mutates a project, the pipeline writes the
//! project to a checkpoint file; on clean completion the checkpoint is
//! cleared. Checkpoints that survive a restart are offered back to the user
//! at startup. Files live under one flat directory, one per project, named
//! `{project_id}.photerra.tmp`.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Serialize;
use serde_json::json;

use crate::error::CoreError;
use crate::project::{Project, PROJECT_VERSION};
use crate::types::{ProjectId, Timestamp};

/// Checkpoint filename suffix. The `.tmp` marks these as transient state,
/// distinct from user-facing `.photerra` archives.
pub const CHECKPOINT_SUFFIX: &str = ".photerra.tmp";

/// Default retention for stale checkpoints.
pub const DEFAULT_MAX_AGE: Duration = Duration::from_secs(7 * 24 * 60 * 60);

/// Listing entry for one recoverable checkpoint.
#[derive(Debug, Clone, Serialize)]
pub struct RecoveryInfo {
    pub path: PathBuf,
    pub project_id: ProjectId,
    pub project_name: String,
    pub saved_at: Timestamp,
    pub file_size: u64,
}

/// Filesystem-backed checkpoint store.
///
/// All I/O is small synchronous file work; async callers should treat these
/// as quick blocking calls (checkpoints are a few kilobytes of JSON).
pub struct RecoveryStore {
    dir: PathBuf,
}

impl RecoveryStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn new(dir: impl Into<PathBuf>) -> Result<Self, CoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Default location: `~/.photerra/recovery`, falling back to the system
    /// temp dir when no home directory is resolvable.
    pub fn default_dir() -> PathBuf {
        dirs::home_dir()
            .map(|home| home.join(".photerra").join("recovery"))
            .unwrap_or_else(|| std::env::temp_dir().join("photerra-recovery"))
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Canonical checkpoint path for a project.
    pub fn checkpoint_path(&self, project_id: ProjectId) -> PathBuf {
        self.dir.join(format!("{project_id}{CHECKPOINT_SUFFIX}"))
    }

    /// Write (or overwrite) the checkpoint for `project`.
    ///
    /// The payload goes to an anonymous temp file in the same directory and
    /// is renamed onto the canonical path, so a crash mid-write can never
    /// leave a truncated checkpoint behind.
    pub fn save_checkpoint(&self, project: &Project) -> Result<PathBuf, CoreError> {
        let path = self.checkpoint_path(project.id);
        let payload = json!({
            "version": PROJECT_VERSION,
            "saved_at": chrono::Utc::now(),
            "project": project,
        });

        let mut tmp = tempfile::NamedTempFile::new_in(&self.dir)?;
        serde_json::to_writer_pretty(&mut tmp, &payload)
            .map_err(|e| CoreError::Io(std::io::Error::other(e)))?;
        tmp.flush()?;
        tmp.persist(&path).map_err(|e| CoreError::Io(e.error))?;

        tracing::debug!(project_id = %project.id, path = %path.display(), "Checkpoint saved");
        Ok(path)
    }

    /// Remove the checkpoint for `project_id`. Returns whether one existed.
    pub fn clear_checkpoint(&self, project_id: ProjectId) -> Result<bool, CoreError> {
        let path = self.checkpoint_path(project_id);
        match fs::remove_file(&path) {
            Ok(()) => {
                tracing::debug!(project_id = %project_id, "Checkpoint cleared");
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    /// All readable checkpoints, newest first. Files that cannot be read or
    /// parsed are logged and skipped rather than failing the listing.
    pub fn list_checkpoints(&self) -> Vec<RecoveryInfo> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!(dir = %self.dir.display(), error = %e, "Cannot read recovery dir");
                return Vec::new();
            }
        };

        let mut checkpoints = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            match Self::read_info(&path) {
                Some(info) => checkpoints.push(info),
                None => continue,
            }
        }
        checkpoints.sort_by(|a, b| b.saved_at.cmp(&a.saved_at));
        checkpoints
    }

    /// Raw checkpoint payload, or `None` when the file is missing or
    /// unparsable.
    pub fn load_checkpoint(&self, path: &Path) -> Option<serde_json::Value> {
        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Cannot read checkpoint");
                return None;
            }
        };
        match serde_json::from_str(&data) {
            Ok(value) => Some(value),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Corrupt checkpoint");
                None
            }
        }
    }

    /// Delete checkpoints whose recorded `saved_at` is older than `max_age`.
    /// Unparsable files are left alone (a human may still want them).
    /// Returns the number of files removed.
    pub fn cleanup_old(&self, max_age: Duration) -> usize {
        let max_age = chrono::Duration::from_std(max_age).unwrap_or(chrono::Duration::MAX);
        let Some(cutoff) = chrono::Utc::now().checked_sub_signed(max_age) else {
            return 0;
        };

        let mut removed = 0;
        for info in self.list_checkpoints() {
            if info.saved_at < cutoff {
                match fs::remove_file(&info.path) {
                    Ok(()) => removed += 1,
                    Err(e) => {
                        tracing::warn!(path = %info.path.display(), error = %e, "Cannot remove stale checkpoint");
                    }
                }
            }
        }
        if removed > 0 {
            tracing::info!(removed, "Removed stale recovery checkpoints");
        }
        removed
    }

    fn read_info(path: &Path) -> Option<RecoveryInfo> {
        let name = path.file_name()?.to_str()?;
        let stem = name.strip_suffix(CHECKPOINT_SUFFIX)?;
        let project_id: ProjectId = match stem.parse() {
            Ok(id) => id,
            Err(_) => {
                tracing::warn!(path = %path.display(), "Checkpoint filename is not a project id");
                return None;
            }
        };

        let data = match fs::read_to_string(path) {
            Ok(data) => data,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping unreadable checkpoint");
                return None;
            }
        };
        let payload: serde_json::Value = match serde_json::from_str(&data) {
            Ok(payload) => payload,
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Skipping corrupt checkpoint");
                return None;
            }
        };

        let saved_at = payload
            .get("saved_at")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse::<Timestamp>().ok())?;
        let project_name = payload
            .get("project")
            .and_then(|p| p.get("name"))
            .and_then(|n| n.as_str())
            .unwrap_or("(unnamed)")
            .to_string();
        let file_size = fs::metadata(path).map(|m| m.len()).unwrap_or(0);

        Some(RecoveryInfo {
            path: path.to_path_buf(),
            project_id,
            project_name,
            saved_at,
            file_size,
        })
    }
}
