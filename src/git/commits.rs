//! Commit operations for GitManager

use git2::{build::CheckoutBuilder, Error as GitError, IndexAddOption, Oid, ResetType, Signature};

use crate::git::types::CommitInfo;
use crate::git::GitManager;

impl GitManager {
    /// Id of the commit HEAD points to
    pub fn head_commit_id(&self) -> Result<String, GitError> {
        Ok(self.repo.head()?.peel_to_commit()?.id().to_string())
    }

    /// Stage all changes, including deletions
    pub fn stage_all(&self) -> Result<(), GitError> {
        let mut index = self.repo.index()?;
        index.add_all(["*"].iter(), IndexAddOption::DEFAULT, None)?;
        index.update_all(["*"].iter(), None)?;
        index.write()?;
        Ok(())
    }

    /// Create a commit from the current index
    pub fn create_commit(
        &self,
        message: &str,
        author_name: &str,
        author_email: &str,
    ) -> Result<CommitInfo, GitError> {
        let signature = Signature::now(author_name, author_email)?;

        let mut index = self.repo.index()?;
        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;

        let parent_commit = self.repo.head()?.peel_to_commit()?;

        let oid = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &[&parent_commit],
        )?;

        let commit = self.repo.find_commit(oid)?;
        self.commit_to_info(&commit)
    }

    /// Stage everything and commit if the tree changed.
    ///
    /// Returns the HEAD commit id either way, so a unit that changed nothing
    /// still yields a commit ref for its checkpoint.
    pub fn commit_all(
        &self,
        message: &str,
        author_name: &str,
        author_email: &str,
    ) -> Result<String, GitError> {
        self.stage_all()?;

        let head_tree = self.repo.head()?.peel_to_tree()?;
        let index_tree = self.repo.index()?.write_tree()?;
        if head_tree.id() == index_tree {
            log::debug!("[GitManager] Nothing to commit for '{}'", message);
            return self.head_commit_id();
        }

        Ok(self.create_commit(message, author_name, author_email)?.id)
    }

    /// Discard everything after `commit_id`: hard reset plus removal of
    /// untracked files, so a unit can be re-run from its checkpoint
    pub fn reset_to(&self, commit_id: &str) -> Result<(), GitError> {
        let commit = self.repo.find_commit(Oid::from_str(commit_id)?)?;
        self.repo.reset(commit.as_object(), ResetType::Hard, None)?;

        let mut checkout = CheckoutBuilder::new();
        checkout.force().remove_untracked(true);
        self.repo.checkout_head(Some(&mut checkout))?;

        log::debug!("[GitManager] Reset working tree to {}", commit_id);
        Ok(())
    }
}
