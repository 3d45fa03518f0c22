//! Completion markers
//!
//! A marker is written exactly once per track. The content goes to a private
//! temp file first and is then hard-linked into place, so a reader never sees
//! a partial marker and a second writer fails with `MarkerAlreadyWritten`.
//! An advisory lock on `markers/.lock` serializes writers across processes.

use super::{ensure_dir, ensure_owner, read_json_dir, read_json_opt};
use crate::error::{EngineError, EngineResult};
use crate::models::{CompletionMarker, CompletionStatus};
use crate::utils::{sanitize_path_component, state_dir};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct MarkerStore {
    dir: PathBuf,
}

/// Held while a marker is being created; the lock drops with the file
struct MarkerLock {
    file: File,
}

impl Drop for MarkerLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

impl MarkerStore {
    pub fn new(workspace_root: &Path) -> Self {
        Self {
            dir: state_dir(workspace_root).join("markers"),
        }
    }

    fn path_for(&self, track_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", sanitize_path_component(track_id)))
    }

    fn lock(&self) -> EngineResult<MarkerLock> {
        ensure_dir(&self.dir)?;
        let lock_path = self.dir.join(".lock");
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(&lock_path)
            .map_err(|e| EngineError::Storage(format!("Failed to open {:?}: {}", lock_path, e)))?;
        file.lock_exclusive()
            .map_err(|e| EngineError::Storage(format!("Failed to lock {:?}: {}", lock_path, e)))?;
        Ok(MarkerLock { file })
    }

    /// Write a marker. Fails if the track already has one.
    pub fn write(&self, marker: &CompletionMarker) -> EngineResult<()> {
        let _guard = self.lock()?;
        let path = self.path_for(&marker.track_id);

        if path.exists() {
            return Err(EngineError::MarkerAlreadyWritten(marker.track_id.clone()));
        }

        let content = serde_json::to_string_pretty(marker)
            .map_err(|e| EngineError::Storage(format!("Failed to serialize marker: {}", e)))?;

        let temp_path = self.dir.join(format!(
            ".{}.{}.tmp",
            sanitize_path_component(&marker.track_id),
            uuid::Uuid::new_v4()
        ));
        fs::write(&temp_path, content).map_err(|e| {
            EngineError::Storage(format!("Failed to write temp file {:?}: {}", temp_path, e))
        })?;

        let linked = fs::hard_link(&temp_path, &path);
        let _ = fs::remove_file(&temp_path);

        match linked {
            Ok(()) => {
                log::info!(
                    "[MarkerStore] Track '{}' marked {:?}",
                    marker.track_id,
                    marker.status
                );
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                Err(EngineError::MarkerAlreadyWritten(marker.track_id.clone()))
            }
            Err(e) => Err(EngineError::Storage(format!(
                "Failed to publish marker {:?}: {}",
                path, e
            ))),
        }
    }

    pub fn read(&self, track_id: &str) -> EngineResult<Option<CompletionMarker>> {
        let path = self.path_for(track_id);
        let marker: Option<CompletionMarker> = read_json_opt(&path)?;
        if let Some(marker) = &marker {
            ensure_owner(&path, &marker.track_id, track_id)?;
        }
        Ok(marker)
    }

    pub fn status(&self, track_id: &str) -> EngineResult<Option<CompletionStatus>> {
        Ok(self.read(track_id)?.map(|m| m.status))
    }

    pub fn exists(&self, track_id: &str) -> bool {
        self.path_for(track_id).exists()
    }

    /// All markers, ordered by file name
    pub fn list(&self) -> EngineResult<Vec<CompletionMarker>> {
        Ok(read_json_dir(&self.dir)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_write_once() {
        let temp_dir = TempDir::new().unwrap();
        let store = MarkerStore::new(temp_dir.path());

        assert!(store.read("api").unwrap().is_none());
        assert!(!store.exists("api"));

        let marker = CompletionMarker::complete("api", Some("abc123".into()), 3);
        store.write(&marker).unwrap();

        let stored = store.read("api").unwrap().unwrap();
        assert_eq!(stored, marker);
        assert_eq!(store.status("api").unwrap(), Some(CompletionStatus::Complete));

        let second = CompletionMarker::failed("api", None, 1, "late failure");
        let err = store.write(&second).unwrap_err();
        assert!(matches!(err, EngineError::MarkerAlreadyWritten(id) if id == "api"));

        // First marker is untouched
        assert_eq!(store.read("api").unwrap().unwrap(), marker);
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let temp_dir = TempDir::new().unwrap();
        let store = MarkerStore::new(temp_dir.path());

        store
            .write(&CompletionMarker::complete("a", None, 0))
            .unwrap();
        let _ = store.write(&CompletionMarker::complete("a", None, 0));

        let leftovers: Vec<_> = fs::read_dir(&store.dir)
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }

    #[test]
    fn test_concurrent_writers_single_winner() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().to_path_buf();

        let handles: Vec<_> = (0..8)
            .map(|i| {
                let root = root.clone();
                std::thread::spawn(move || {
                    MarkerStore::new(&root)
                        .write(&CompletionMarker::complete("race", Some(format!("c{}", i)), 1))
                        .is_ok()
                })
            })
            .collect();

        let winners = handles
            .into_iter()
            .map(|h| h.join().unwrap())
            .filter(|ok| *ok)
            .count();
        assert_eq!(winners, 1);
    }

    #[test]
    fn test_read_refuses_marker_of_another_track() {
        let temp_dir = TempDir::new().unwrap();
        let store = MarkerStore::new(temp_dir.path());

        // Both ids map to the same file name
        store
            .write(&CompletionMarker::failed("a.b", None, 1, "boom"))
            .unwrap();

        let err = store.read("a_b").unwrap_err();
        assert!(matches!(err, EngineError::Storage(msg) if msg.contains("'a.b'")));
        assert!(store.status("a_b").is_err());
        assert_eq!(
            store.status("a.b").unwrap(),
            Some(CompletionStatus::Failed)
        );
    }

    #[test]
    fn test_list() {
        let temp_dir = TempDir::new().unwrap();
        let store = MarkerStore::new(temp_dir.path());

        store.write(&CompletionMarker::complete("b", None, 1)).unwrap();
        store
            .write(&CompletionMarker::failed("a", None, 0, "boom"))
            .unwrap();

        let markers = store.list().unwrap();
        assert_eq!(markers.len(), 2);
        assert_eq!(markers[0].track_id, "a");
        assert!(!markers[0].is_complete());
        assert!(markers[1].is_complete());
    }
}
