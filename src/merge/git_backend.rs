//! `MergeBackend` over the main repository with git2

use std::path::{Path, PathBuf};

use crate::error::{EngineError, EngineResult};
use crate::git::{ConflictInfo, GitManager};
use crate::merge::conflicts::ResolvedContent;
use crate::merge::{BackendMerge, MergeBackend};

/// Merges track branches into the target branch checked out at the
/// workspace root. A repository handle is opened per operation.
#[derive(Debug, Clone)]
pub struct GitMergeBackend {
    repo_path: PathBuf,
    target_branch: String,
    author_name: String,
    author_email: String,
}

impl GitMergeBackend {
    pub fn new(repo_path: &Path, target_branch: &str, author_name: &str, author_email: &str) -> Self {
        Self {
            repo_path: repo_path.to_path_buf(),
            target_branch: target_branch.to_string(),
            author_name: author_name.to_string(),
            author_email: author_email.to_string(),
        }
    }

    pub fn target_branch(&self) -> &str {
        &self.target_branch
    }

    fn git(&self) -> EngineResult<GitManager> {
        Ok(GitManager::new(&self.repo_path)?)
    }
}

impl MergeBackend for GitMergeBackend {
    fn merge(&self, branch: &str) -> EngineResult<BackendMerge> {
        let git = self.git()?;
        if !git.branch_exists(branch) {
            return Err(EngineError::Storage(format!(
                "branch '{}' does not exist",
                branch
            )));
        }

        let result = git.merge_branch(
            branch,
            &self.target_branch,
            &self.author_name,
            &self.author_email,
        )?;

        if result.success {
            let commit = match result.commit_id {
                Some(id) => id,
                None => git.head_commit_id()?,
            };
            Ok(BackendMerge::Merged {
                commit,
                fast_forward: result.fast_forward,
            })
        } else {
            Ok(BackendMerge::Conflicted {
                files: result.conflict_files,
            })
        }
    }

    fn conflicts(&self) -> EngineResult<Vec<ConflictInfo>> {
        Ok(self.git()?.get_conflict_details()?)
    }

    fn stage(&self, path: &str, content: &ResolvedContent) -> EngineResult<()> {
        let git = self.git()?;
        match content {
            ResolvedContent::Write(bytes) => git.resolve_conflict(path, bytes)?,
            ResolvedContent::Delete => git.resolve_conflict_by_removal(path)?,
        }
        Ok(())
    }

    fn commit(&self, message: &str) -> EngineResult<String> {
        let commit = self
            .git()?
            .complete_merge(message, &self.author_name, &self.author_email)?;
        Ok(commit.id)
    }

    fn abort(&self) -> EngineResult<()> {
        let git = self.git()?;
        if git.is_merging() {
            git.merge_abort()?;
        }
        Ok(())
    }

    fn workdir(&self) -> PathBuf {
        self.repo_path.clone()
    }

    fn head(&self) -> EngineResult<Option<String>> {
        let git = self.git()?;
        if !git.branch_exists(&self.target_branch) {
            return Ok(None);
        }
        Ok(Some(git.branch_head(&self.target_branch)?))
    }

    fn uncommitted_changes(&self) -> EngineResult<Vec<String>> {
        Ok(self.git()?.uncommitted_changes()?)
    }
}
