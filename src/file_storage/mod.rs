//! File-based state for trackflow
//!
//! Everything the engine needs to resume lives in `.trackflow/` under the
//! workspace root:
//! - `checkpoints/` - one mutable checkpoint per track
//! - `markers/` - one write-once completion marker per track
//! - `audit/` - merge rounds and run reports, one directory per run
//! - `resolutions/` - proposed conflict syntheses, supplied externally
//! - `worktrees/` - isolated workspaces, one per track
//!
//! The directory carries a `.gitignore` so none of it is ever merged.

pub mod audit;
pub mod checkpoints;
pub mod markers;

pub use audit::AuditTrail;
pub use checkpoints::CheckpointStore;
pub use markers::MarkerStore;

use crate::utils::state_dir;
use std::fs;
use std::path::{Path, PathBuf};

/// Common file operations result type
pub type FileResult<T> = Result<T, String>;

/// Ensure a directory exists, creating it if necessary
pub fn ensure_dir(path: &Path) -> FileResult<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .map_err(|e| format!("Failed to create directory {:?}: {}", path, e))?;
    }
    Ok(())
}

/// Write data to a file atomically (temp file + rename)
pub fn atomic_write(path: &Path, content: &str) -> FileResult<()> {
    let temp_path = path.with_extension("tmp");

    if let Some(parent) = path.parent() {
        ensure_dir(parent)?;
    }

    fs::write(&temp_path, content)
        .map_err(|e| format!("Failed to write temp file {:?}: {}", temp_path, e))?;

    fs::rename(&temp_path, path)
        .map_err(|e| format!("Failed to rename {:?} to {:?}: {}", temp_path, path, e))?;

    Ok(())
}

/// Read a JSON file and deserialize it
pub fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> FileResult<T> {
    let content = fs::read_to_string(path)
        .map_err(|e| format!("Failed to read file {:?}: {}", path, e))?;

    serde_json::from_str(&content)
        .map_err(|e| format!("Failed to parse JSON from {:?}: {}", path, e))
}

/// Read a JSON file if it exists
pub fn read_json_opt<T: serde::de::DeserializeOwned>(path: &Path) -> FileResult<Option<T>> {
    if !path.exists() {
        return Ok(None);
    }
    read_json(path).map(Some)
}

/// Write data as pretty-printed JSON atomically
pub fn write_json<T: serde::Serialize>(path: &Path, data: &T) -> FileResult<()> {
    let content = serde_json::to_string_pretty(data)
        .map_err(|e| format!("Failed to serialize to JSON: {}", e))?;

    atomic_write(path, &content)
}

/// Read every `*.json` file in a directory, sorted by file name
pub fn read_json_dir<T: serde::de::DeserializeOwned>(dir: &Path) -> FileResult<Vec<T>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut paths: Vec<PathBuf> = fs::read_dir(dir)
        .map_err(|e| format!("Failed to read directory {:?}: {}", dir, e))?
        .filter_map(|entry| entry.ok().map(|e| e.path()))
        .filter(|p| p.extension().map_or(false, |ext| ext == "json"))
        .collect();
    paths.sort();

    paths.iter().map(|p| read_json(p)).collect()
}

/// Fail when a per-track record stored at `path` belongs to another track
pub fn ensure_owner(path: &Path, stored: &str, requested: &str) -> FileResult<()> {
    if stored == requested {
        Ok(())
    } else {
        Err(format!(
            "{:?} holds state of track '{}', not '{}'",
            path, stored, requested
        ))
    }
}

/// Initialize the .trackflow directory for a workspace with .gitignore
pub fn init_state_dir(workspace_root: &Path) -> FileResult<PathBuf> {
    let dir = state_dir(workspace_root);
    ensure_dir(&dir)?;

    ensure_dir(&dir.join("checkpoints"))?;
    ensure_dir(&dir.join("markers"))?;
    ensure_dir(&dir.join("audit"))?;
    ensure_dir(&dir.join("resolutions"))?;

    // Engine state must never travel through merges
    let gitignore_path = dir.join(".gitignore");
    if !gitignore_path.exists() {
        fs::write(&gitignore_path, "*\n")
            .map_err(|e| format!("Failed to write .gitignore: {}", e))?;
    }

    Ok(dir)
}
