//! Branch operations for GitManager

use git2::{Branch, BranchType, Commit, Error as GitError};

use crate::git::types::{BranchInfo, CommitInfo};
use crate::git::GitManager;

impl GitManager {
    /// Create a new branch from the current HEAD
    pub fn create_branch(&self, name: &str, force: bool) -> Result<BranchInfo, GitError> {
        let head = match self.repo.head() {
            Ok(head) => head,
            Err(e) if e.code() == git2::ErrorCode::UnbornBranch => {
                log::info!("[GitManager] No commits found, creating initial commit");
                self.create_initial_commit()?;
                self.repo.head()?
            }
            Err(e) => return Err(e),
        };

        let head_commit = head.peel_to_commit()?;
        let branch = self.repo.branch(name, &head_commit, force)?;

        self.branch_to_info(&branch)
    }

    /// Create a new branch at any revision (branch name, tag or commit id)
    pub fn create_branch_at(&self, name: &str, start_point: &str) -> Result<BranchInfo, GitError> {
        let commit = self.repo.revparse_single(start_point)?.peel_to_commit()?;
        let branch = self.repo.branch(name, &commit, false)?;
        log::debug!("[GitManager] Created branch {} at {}", name, start_point);
        self.branch_to_info(&branch)
    }

    /// Create an initial empty commit for a new repository
    pub(crate) fn create_initial_commit(&self) -> Result<(), GitError> {
        let tree_id = self.repo.index()?.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;
        let signature = self.signature_or("trackflow", "trackflow@localhost")?;

        self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            "Initial commit (created by trackflow)",
            &tree,
            &[],
        )?;

        log::info!("[GitManager] Created initial commit");
        Ok(())
    }

    pub fn branch_exists(&self, name: &str) -> bool {
        self.repo.find_branch(name, BranchType::Local).is_ok()
    }

    /// Commit id at the tip of a local branch
    pub fn branch_head(&self, name: &str) -> Result<String, GitError> {
        let branch = self.repo.find_branch(name, BranchType::Local)?;
        Ok(branch.get().peel_to_commit()?.id().to_string())
    }

    /// Checkout a branch
    pub fn checkout_branch(&self, name: &str) -> Result<(), GitError> {
        let obj = self.repo.revparse_single(&format!("refs/heads/{}", name))?;

        self.repo.checkout_tree(&obj, None)?;
        self.repo.set_head(&format!("refs/heads/{}", name))?;

        Ok(())
    }

    /// Convert a Branch to BranchInfo
    pub(crate) fn branch_to_info(&self, branch: &Branch) -> Result<BranchInfo, GitError> {
        let name = branch.name()?.unwrap_or("").to_string();
        let commit = branch.get().peel_to_commit()?;

        Ok(BranchInfo {
            name,
            is_head: branch.is_head(),
            commit_id: commit.id().to_string(),
        })
    }

    /// Convert a Commit to CommitInfo
    pub(crate) fn commit_to_info(&self, commit: &Commit) -> Result<CommitInfo, GitError> {
        let author = commit.author();
        let id = commit.id().to_string();

        Ok(CommitInfo {
            short_id: id[..7].to_string(),
            id,
            message: commit.message().unwrap_or("").to_string(),
            author: author.name().unwrap_or("").to_string(),
            email: author.email().unwrap_or("").to_string(),
            timestamp: commit.time().seconds(),
            parent_ids: commit.parent_ids().map(|oid| oid.to_string()).collect(),
        })
    }

    /// Get the default branch name for this repository.
    ///
    /// Resolution order:
    /// 1. Current HEAD branch (if HEAD points to a branch)
    /// 2. First existing common default branch ("main", "master")
    /// 3. Fallback to "main"
    pub fn get_default_branch_name(&self) -> String {
        if let Ok(head) = self.repo.head() {
            if head.is_branch() {
                if let Some(name) = head.shorthand() {
                    return name.to_string();
                }
            }
        }

        for name in &["main", "master"] {
            if self.repo.find_branch(name, BranchType::Local).is_ok() {
                return (*name).to_string();
            }
        }

        "main".to_string()
    }
}
