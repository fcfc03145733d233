//! `.photerra` project archives.
//!
//! The user-facing save format: a JSON document `{version, saved_at,
//! project}`. Loading gates on the version *before* touching the project
//! payload, so a format bump can never be half-parsed into the wrong shape.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use serde_json::json;

use crate::error::CoreError;
use crate::project::Project;

/// Version written into new archives.
pub const CURRENT_VERSION: &str = "1.0.0";

/// Versions this build can load.
pub const SUPPORTED_VERSIONS: &[&str] = &["1.0.0"];

/// Canonical archive extension. Paths with any other extension are
/// normalized on save.
pub const ARCHIVE_EXTENSION: &str = "photerra";

/// Normalize `path` to carry the `.photerra` extension.
pub fn normalize_path(path: &Path) -> PathBuf {
    if path.extension().and_then(|e| e.to_str()) == Some(ARCHIVE_EXTENSION) {
        path.to_path_buf()
    } else {
        path.with_extension(ARCHIVE_EXTENSION)
    }
}

/// Save `project` to `path` (extension normalized). Writes a temp file in
/// the destination directory and renames it into place, so an interrupted
/// save never clobbers an existing archive. Returns the normalized path.
pub fn save_project(project: &Project, path: &Path) -> Result<PathBuf, CoreError> {
    let path = normalize_path(path);
    let dir = path.parent().filter(|p| !p.as_os_str().is_empty());
    if let Some(dir) = dir {
        fs::create_dir_all(dir)?;
    }

    let payload = json!({
        "version": CURRENT_VERSION,
        "saved_at": chrono::Utc::now(),
        "project": project,
    });

    let mut tmp = tempfile::NamedTempFile::new_in(dir.unwrap_or(Path::new(".")))?;
    serde_json::to_writer_pretty(&mut tmp, &payload)
        .map_err(|e| CoreError::Io(std::io::Error::other(e)))?;
    tmp.flush()?;
    tmp.persist(&path).map_err(|e| CoreError::Io(e.error))?;

    tracing::info!(project_id = %project.id, path = %path.display(), "Project saved");
    Ok(path)
}

/// Load a project archive.
///
/// Errors: `NotFound` for a missing file, `Validation` for malformed JSON,
/// a wrong document shape, or an unsupported version.
pub fn load_project(path: &Path) -> Result<Project, CoreError> {
    let data = match fs::read_to_string(path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            return Err(CoreError::not_found("Project file", path.display()));
        }
        Err(e) => return Err(e.into()),
    };

    let payload: serde_json::Value = serde_json::from_str(&data)
        .map_err(|e| CoreError::Validation(format!("Invalid project file: {e}")))?;

    let version = payload
        .get("version")
        .and_then(|v| v.as_str())
        .ok_or_else(|| CoreError::Validation("Project file has no version field".to_string()))?;
    if !SUPPORTED_VERSIONS.contains(&version) {
        return Err(CoreError::Validation(format!(
            "Unsupported project file version: {version}"
        )));
    }

    let project = payload
        .get("project")
        .cloned()
        .ok_or_else(|| CoreError::Validation("Project file has no project payload".to_string()))?;
    let project: Project = serde_json::from_value(project)
        .map_err(|e| CoreError::Validation(format!("Invalid project payload: {e}")))?;

    tracing::info!(project_id = %project.id, path = %path.display(), "Project loaded");
    Ok(project)
}
