//! Track workspaces
//!
//! Every track owns the workspace named by its `isolation_ref` for as long as
//! its runner is active. With git, a workspace is a worktree under
//! `.trackflow/worktrees/` checked out on the track's branch; the branch is
//! cut from the target branch the first time and reused on resume, so
//! committed units survive a crash.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::{EngineError, EngineResult};
use crate::git::GitManager;
use crate::models::Track;
use crate::utils::{sanitize_path_component, worktrees_dir};

/// A workspace handed to a track runner
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    pub track_id: String,
    pub path: PathBuf,
    /// Branch checked out in the workspace; `None` for plain directories
    pub branch: Option<String>,
}

impl Workspace {
    /// Commit the workspace currently sits on, if it is a git checkout
    pub fn head_commit(&self) -> Option<String> {
        self.branch.as_ref()?;
        GitManager::new(&self.path)
            .ok()
            .and_then(|git| git.head_commit_id().ok())
    }

    /// Roll the workspace back to a checkpointed commit before a retry
    pub fn reset_to(&self, commit_ref: &str) -> EngineResult<()> {
        if self.branch.is_none() {
            return Ok(());
        }
        GitManager::new(&self.path)?.reset_to(commit_ref)?;
        Ok(())
    }
}

/// Source of per-track workspaces
pub trait WorkspaceProvider: Send + Sync {
    /// Allocate (or re-attach to) the workspace for `track`
    fn acquire(&self, track: &Track) -> EngineResult<Workspace>;

    /// Tear the track's workspace down once its work has been merged
    fn release(&self, track: &Track) -> EngineResult<()>;
}

/// Git worktree per track
pub struct WorktreePool {
    /// Main repository; also the workspace root
    project_path: PathBuf,
    feature_id: String,
    /// Start point for newly created track branches
    target_branch: String,
    /// libgit2 worktree bookkeeping is not safe to mutate concurrently
    lock: Mutex<()>,
}

impl WorktreePool {
    pub fn new(project_path: &Path, feature_id: &str, target_branch: &str) -> Self {
        Self {
            project_path: project_path.to_path_buf(),
            feature_id: feature_id.to_string(),
            target_branch: target_branch.to_string(),
            lock: Mutex::new(()),
        }
    }

    /// Path the worktree for `track` lives at
    pub fn path_for(&self, track: &Track) -> PathBuf {
        worktrees_dir(&self.project_path).join(sanitize_path_component(&track.isolation_ref))
    }

    fn git(&self) -> EngineResult<GitManager> {
        GitManager::new(&self.project_path).map_err(|e| {
            EngineError::Storage(format!(
                "Failed to open git repository {:?}: {}",
                self.project_path, e
            ))
        })
    }
}

impl WorkspaceProvider for WorktreePool {
    fn acquire(&self, track: &Track) -> EngineResult<Workspace> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| EngineError::Storage("Worktree pool lock poisoned".to_string()))?;

        let worktree_path = self.path_for(track);
        let branch_name = track.branch_name(&self.feature_id);

        if let Some(parent) = worktree_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                EngineError::Storage(format!("Failed to create worktrees directory: {}", e))
            })?;
        }

        let git_manager = self.git()?;

        if let Ok(pruned) = git_manager.prune_orphaned_worktrees() {
            if pruned > 0 {
                log::info!("[WorktreePool] Pruned {} orphaned worktree(s)", pruned);
            }
        }

        // Re-attach on resume
        if let Some(existing) = git_manager.find_worktree_by_path(&worktree_path)? {
            if existing.branch.as_deref() == Some(branch_name.as_str()) {
                log::info!(
                    "[WorktreePool] Reusing worktree for track {} at {:?}",
                    track.id,
                    worktree_path
                );
                return Ok(Workspace {
                    track_id: track.id.clone(),
                    path: worktree_path,
                    branch: Some(branch_name),
                });
            }
            log::warn!(
                "[WorktreePool] Worktree at {:?} is on {:?}, expected {}; recreating",
                worktree_path,
                existing.branch,
                branch_name
            );
            git_manager.remove_worktree(&worktree_path)?;
        }

        // A directory git does not know about cannot be checked out over
        if worktree_path.exists() {
            log::warn!(
                "[WorktreePool] Removing stale directory {:?}",
                worktree_path
            );
            std::fs::remove_dir_all(&worktree_path).map_err(|e| {
                EngineError::Storage(format!(
                    "Failed to remove stale directory {:?}: {}",
                    worktree_path, e
                ))
            })?;
        }

        git_manager.create_worktree(&branch_name, &worktree_path, Some(&self.target_branch))?;

        log::info!(
            "[WorktreePool] Created worktree for track {} at {:?} on branch {}",
            track.id,
            worktree_path,
            branch_name
        );

        Ok(Workspace {
            track_id: track.id.clone(),
            path: worktree_path,
            branch: Some(branch_name),
        })
    }

    /// Removes the worktree. The branch is kept so merged history stays reachable.
    fn release(&self, track: &Track) -> EngineResult<()> {
        let _guard = self
            .lock
            .lock()
            .map_err(|_| EngineError::Storage("Worktree pool lock poisoned".to_string()))?;

        let worktree_path = self.path_for(track);
        let git_manager = self.git()?;
        if git_manager.find_worktree_by_path(&worktree_path)?.is_some() {
            if let Err(e) = git_manager.remove_worktree(&worktree_path) {
                log::warn!("[WorktreePool] Failed to remove worktree from git: {}", e);
            }
        }

        if worktree_path.exists() {
            if let Err(e) = std::fs::remove_dir_all(&worktree_path) {
                log::warn!("[WorktreePool] Failed to remove worktree directory: {}", e);
            }
        }

        log::info!(
            "[WorktreePool] Released worktree for track {} at {:?}",
            track.id,
            worktree_path
        );
        Ok(())
    }
}

/// Plain directory per track, for units that need isolation but no git
pub struct DirectoryWorkspaces {
    root: PathBuf,
}

impl DirectoryWorkspaces {
    pub fn new(workspace_root: &Path) -> Self {
        Self {
            root: worktrees_dir(workspace_root),
        }
    }

    fn path_for(&self, track: &Track) -> PathBuf {
        self.root.join(sanitize_path_component(&track.isolation_ref))
    }
}

impl WorkspaceProvider for DirectoryWorkspaces {
    fn acquire(&self, track: &Track) -> EngineResult<Workspace> {
        let path = self.path_for(track);
        std::fs::create_dir_all(&path).map_err(|e| {
            EngineError::Storage(format!("Failed to create workspace {:?}: {}", path, e))
        })?;
        Ok(Workspace {
            track_id: track.id.clone(),
            path,
            branch: None,
        })
    }

    fn release(&self, track: &Track) -> EngineResult<()> {
        let path = self.path_for(track);
        if path.exists() {
            std::fs::remove_dir_all(&path).map_err(|e| {
                EngineError::Storage(format!("Failed to remove workspace {:?}: {}", path, e))
            })?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::{Repository, Signature};
    use std::fs;
    use tempfile::TempDir;

    fn setup_repo() -> (TempDir, String) {
        let temp_dir = TempDir::new().unwrap();
        let repo = Repository::init(temp_dir.path()).unwrap();
        let sig = Signature::now("Test User", "test@example.com").unwrap();
        fs::write(temp_dir.path().join("README.md"), "# test\n").unwrap();
        let mut index = repo.index().unwrap();
        index.add_path(Path::new("README.md")).unwrap();
        index.write().unwrap();
        let tree = repo.find_tree(index.write_tree().unwrap()).unwrap();
        repo.commit(Some("HEAD"), &sig, &sig, "Initial commit", &tree, &[])
            .unwrap();

        let target = GitManager::new(temp_dir.path())
            .unwrap()
            .get_default_branch_name();
        (temp_dir, target)
    }

    fn track(id: &str) -> Track {
        Track {
            id: id.to_string(),
            name: id.to_string(),
            isolation_ref: format!("ws/{}", id),
            depends_on: Default::default(),
            branch: None,
            units_of_work: vec![],
            post_merge_checks: vec![],
        }
    }

    #[test]
    fn test_acquire_creates_worktree_on_track_branch() {
        let (temp_dir, target) = setup_repo();
        let pool = WorktreePool::new(temp_dir.path(), "checkout", &target);

        let ws = pool.acquire(&track("api")).unwrap();
        assert_eq!(ws.branch.as_deref(), Some("trackflow/checkout/api"));
        assert!(ws.path.ends_with("ws_api"));
        assert!(ws.path.join("README.md").exists());

        let git = GitManager::new(temp_dir.path()).unwrap();
        assert_eq!(
            git.branch_head("trackflow/checkout/api").unwrap(),
            git.branch_head(&target).unwrap()
        );
    }

    #[test]
    fn test_acquire_reuses_existing_worktree() {
        let (temp_dir, target) = setup_repo();
        let pool = WorktreePool::new(temp_dir.path(), "checkout", &target);
        let t = track("api");

        let first = pool.acquire(&t).unwrap();
        fs::write(first.path.join("work.txt"), "unit 1\n").unwrap();
        let commit = GitManager::new(&first.path)
            .unwrap()
            .commit_all("unit 1", "T", "t@example.com")
            .unwrap();

        let second = pool.acquire(&t).unwrap();
        assert_eq!(first, second);
        assert_eq!(second.head_commit(), Some(commit));
    }

    #[test]
    fn test_acquire_after_lost_directory_keeps_branch_history() {
        let (temp_dir, target) = setup_repo();
        let pool = WorktreePool::new(temp_dir.path(), "checkout", &target);
        let t = track("api");

        let ws = pool.acquire(&t).unwrap();
        fs::write(ws.path.join("work.txt"), "done\n").unwrap();
        let commit = GitManager::new(&ws.path)
            .unwrap()
            .commit_all("unit 1", "T", "t@example.com")
            .unwrap();
        fs::remove_dir_all(&ws.path).unwrap();

        let again = pool.acquire(&t).unwrap();
        assert_eq!(again.head_commit(), Some(commit));
        assert!(again.path.join("work.txt").exists());
    }

    #[test]
    fn test_reset_discards_uncommitted_work() {
        let (temp_dir, target) = setup_repo();
        let pool = WorktreePool::new(temp_dir.path(), "checkout", &target);
        let ws = pool.acquire(&track("api")).unwrap();
        let base = ws.head_commit().unwrap();

        fs::write(ws.path.join("README.md"), "half done\n").unwrap();
        fs::write(ws.path.join("scratch.txt"), "junk\n").unwrap();
        ws.reset_to(&base).unwrap();

        assert_eq!(
            fs::read_to_string(ws.path.join("README.md")).unwrap(),
            "# test\n"
        );
        assert!(!ws.path.join("scratch.txt").exists());
    }

    #[test]
    fn test_release_removes_worktree_but_keeps_branch() {
        let (temp_dir, target) = setup_repo();
        let pool = WorktreePool::new(temp_dir.path(), "checkout", &target);
        let api = track("api");
        let ws = pool.acquire(&api).unwrap();

        pool.release(&api).unwrap();
        // A second release finds nothing to remove
        pool.release(&api).unwrap();
        assert!(!ws.path.exists());
        assert!(GitManager::new(temp_dir.path())
            .unwrap()
            .branch_exists("trackflow/checkout/api"));
    }

    #[test]
    fn test_directory_workspaces() {
        let temp_dir = TempDir::new().unwrap();
        let provider = DirectoryWorkspaces::new(temp_dir.path());

        let ui = track("ui");
        let ws = provider.acquire(&ui).unwrap();
        assert!(ws.path.is_dir());
        assert!(ws.branch.is_none());
        assert!(ws.head_commit().is_none());

        provider.release(&ui).unwrap();
        assert!(!ws.path.exists());
    }
}
