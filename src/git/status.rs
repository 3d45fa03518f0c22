//! Working tree checks for GitManager

use git2::{Error as GitError, Status, StatusOptions};

use crate::git::GitManager;

impl GitManager {
    /// Tracked files with staged or unstaged changes, conflicts included.
    /// Untracked and ignored files do not count.
    pub fn uncommitted_changes(&self) -> Result<Vec<String>, GitError> {
        let mut opts = StatusOptions::new();
        opts.include_untracked(false).include_ignored(false);

        let changed = Status::INDEX_NEW
            | Status::INDEX_MODIFIED
            | Status::INDEX_DELETED
            | Status::INDEX_RENAMED
            | Status::INDEX_TYPECHANGE
            | Status::WT_MODIFIED
            | Status::WT_DELETED
            | Status::WT_RENAMED
            | Status::WT_TYPECHANGE
            | Status::CONFLICTED;

        Ok(self
            .repo
            .statuses(Some(&mut opts))?
            .iter()
            .filter(|entry| entry.status().intersects(changed))
            .filter_map(|entry| entry.path().map(str::to_string))
            .collect())
    }
}
