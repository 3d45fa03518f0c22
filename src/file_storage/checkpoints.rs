//! Checkpoint Store
//!
//! One checkpoint file per track at `.trackflow/checkpoints/<track>.json`,
//! overwritten atomically after every completed unit. There is exactly one
//! writer per track (its runner), so no locking is needed here.

use super::{ensure_owner, read_json_dir, read_json_opt, write_json};
use crate::error::{EngineError, EngineResult};
use crate::models::{Checkpoint, CURSOR_END};
use crate::utils::{sanitize_path_component, state_dir};
use chrono::Utc;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    dir: PathBuf,
}

impl CheckpointStore {
    pub fn new(workspace_root: &Path) -> Self {
        Self {
            dir: state_dir(workspace_root).join("checkpoints"),
        }
    }

    fn path_for(&self, track_id: &str) -> PathBuf {
        self.dir
            .join(format!("{}.json", sanitize_path_component(track_id)))
    }

    /// Persist progress for a track.
    ///
    /// `unit_index` is the 1-based ordinal of the unit that just completed.
    /// Saving an index lower than the stored one is rejected; saving the same
    /// index again overwrites the cursor and commit.
    pub fn save(
        &self,
        track_id: &str,
        unit_index: usize,
        cursor: &str,
        commit_ref: Option<String>,
    ) -> EngineResult<Checkpoint> {
        if let Some(stored) = self.load(track_id)? {
            if unit_index < stored.last_completed_unit_index {
                return Err(EngineError::CheckpointRegression {
                    track_id: track_id.to_string(),
                    stored: stored.last_completed_unit_index,
                    attempted: unit_index,
                });
            }
        }

        let checkpoint = Checkpoint {
            track_id: track_id.to_string(),
            last_completed_unit_index: unit_index,
            resume_cursor: cursor.to_string(),
            commit_ref,
            timestamp: Utc::now(),
        };

        write_json(&self.path_for(track_id), &checkpoint)?;

        log::debug!(
            "[CheckpointStore] {} -> unit {} (cursor '{}')",
            track_id,
            unit_index,
            cursor
        );

        Ok(checkpoint)
    }

    pub fn load(&self, track_id: &str) -> EngineResult<Option<Checkpoint>> {
        let path = self.path_for(track_id);
        let checkpoint: Option<Checkpoint> = read_json_opt(&path)?;
        if let Some(checkpoint) = &checkpoint {
            ensure_owner(&path, &checkpoint.track_id, track_id)?;
        }
        Ok(checkpoint)
    }

    /// 1-based ordinal of the last completed unit, 0 when nothing ran yet
    pub fn completed_units(&self, track_id: &str) -> EngineResult<usize> {
        Ok(self
            .load(track_id)?
            .map(|c| c.last_completed_unit_index)
            .unwrap_or(0))
    }

    /// All stored checkpoints, ordered by file name
    pub fn list(&self) -> EngineResult<Vec<Checkpoint>> {
        Ok(read_json_dir(&self.dir)?)
    }
}

/// Cursor value recorded after completing `ordinal` of `units`: the id of the
/// next unit, or [`CURSOR_END`] once all units are done.
pub fn cursor_after(units: &[crate::models::Unit], ordinal: usize) -> String {
    units
        .get(ordinal)
        .map(|u| u.id.clone())
        .unwrap_or_else(|| CURSOR_END.to_string())
}
