//! Worktree management for GitManager
//!
//! Each track runs in its own worktree checked out on the track's branch.

use git2::{BranchType, Error as GitError, Repository, Worktree, WorktreeAddOptions};
use std::path::{Path, PathBuf};

use crate::git::types::WorktreeInfo;
use crate::git::GitManager;

impl GitManager {
    /// Create a worktree for `branch` at `path`.
    ///
    /// A missing branch is created at `start_point` (or HEAD when `None`).
    pub fn create_worktree(
        &self,
        branch: &str,
        path: &Path,
        start_point: Option<&str>,
    ) -> Result<WorktreeInfo, GitError> {
        if !self.branch_exists(branch) {
            match start_point {
                Some(rev) => self.create_branch_at(branch, rev)?,
                None => self.create_branch(branch, false)?,
            };
        }

        let branch_ref = self.repo.find_branch(branch, BranchType::Local)?;

        let mut opts = WorktreeAddOptions::new();
        opts.reference(Some(branch_ref.get()));

        // Names with '/' would nest directories under .git/worktrees/
        let worktree_name = branch.replace('/', "-");

        let worktree = self.repo.worktree(&worktree_name, path, Some(&opts))?;

        log::info!(
            "[GitManager] Created worktree '{}' at {:?}",
            worktree_name,
            path
        );
        self.worktree_to_info(&worktree)
    }

    /// List all worktrees
    pub fn list_worktrees(&self) -> Result<Vec<WorktreeInfo>, GitError> {
        let worktrees = self.repo.worktrees()?;

        let mut result = Vec::new();
        for name in worktrees.iter().flatten() {
            if let Ok(worktree) = self.repo.find_worktree(name) {
                result.push(self.worktree_to_info(&worktree)?);
            }
        }

        Ok(result)
    }

    /// Find a registered worktree by its checkout path
    pub fn find_worktree_by_path(&self, path: &Path) -> Result<Option<WorktreeInfo>, GitError> {
        Ok(self
            .list_worktrees()?
            .into_iter()
            .find(|w| same_path(Path::new(&w.path), path)))
    }

    /// Remove a worktree by path: delete the checkout and prune the entry
    pub fn remove_worktree(&self, path: &Path) -> Result<(), GitError> {
        for name in self.repo.worktrees()?.iter().flatten() {
            if let Ok(worktree) = self.repo.find_worktree(name) {
                if same_path(worktree.path(), path) {
                    if path.exists() {
                        std::fs::remove_dir_all(path).map_err(|e| {
                            GitError::from_str(&format!("Failed to remove {:?}: {}", path, e))
                        })?;
                    }
                    worktree.prune(None)?;
                    log::info!("[GitManager] Removed worktree '{}'", name);
                    return Ok(());
                }
            }
        }

        Err(GitError::from_str(&format!(
            "Worktree not found: {}",
            path.display()
        )))
    }

    /// Prune orphaned worktrees (where the physical directory no longer exists)
    pub fn prune_orphaned_worktrees(&self) -> Result<u32, GitError> {
        let mut pruned_count = 0;

        for name in self.repo.worktrees()?.iter().flatten() {
            if let Ok(worktree) = self.repo.find_worktree(name) {
                if !worktree.path().exists() {
                    log::info!(
                        "[GitManager] Pruning orphaned worktree '{}' (path {:?} no longer exists)",
                        name,
                        worktree.path()
                    );
                    if let Err(e) = worktree.prune(None) {
                        log::warn!("[GitManager] Failed to prune worktree '{}': {}", name, e);
                    } else {
                        pruned_count += 1;
                    }
                }
            }
        }

        Ok(pruned_count)
    }

    /// Convert a Worktree to WorktreeInfo
    pub(crate) fn worktree_to_info(&self, worktree: &Worktree) -> Result<WorktreeInfo, GitError> {
        let name = worktree.name().unwrap_or("").to_string();
        let path = worktree.path().to_string_lossy().to_string();
        let is_locked = worktree
            .is_locked()
            .map(|status| !matches!(status, git2::WorktreeLockStatus::Unlocked))
            .unwrap_or(false);

        let branch = Repository::open(worktree.path())
            .ok()
            .and_then(|wt_repo| {
                let head = wt_repo.head().ok()?;
                if head.is_branch() {
                    head.shorthand().map(|s| s.to_string())
                } else {
                    None
                }
            });

        Ok(WorktreeInfo {
            name,
            path,
            branch,
            is_locked,
        })
    }
}

/// Compare paths the way libgit2 records them (canonical, no trailing slash)
fn same_path(a: &Path, b: &Path) -> bool {
    let normalize = |p: &Path| {
        std::fs::canonicalize(p).unwrap_or_else(|_| {
            PathBuf::from(p.to_string_lossy().trim_end_matches('/').to_string())
        })
    };
    normalize(a) == normalize(b)
}
