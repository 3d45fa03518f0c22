//! Merge and conflict handling for GitManager

use git2::{build::CheckoutBuilder, BranchType, Error as GitError, MergeOptions, Oid, Signature};
use std::fs;
use std::path::Path;

use crate::git::types::{CommitInfo, ConflictInfo, MergeResult};
use crate::git::GitManager;

impl GitManager {
    /// Merge a source branch into a target branch in this working tree.
    ///
    /// On conflicts the repository is left mid-merge (MERGE_HEAD set, markers
    /// in the working tree) so the caller can resolve and `complete_merge`,
    /// or `merge_abort`.
    pub fn merge_branch(
        &self,
        source_branch: &str,
        target_branch: &str,
        author_name: &str,
        author_email: &str,
    ) -> Result<MergeResult, GitError> {
        log::info!(
            "[GitManager] Merging {} into {}",
            source_branch,
            target_branch
        );

        self.checkout_branch(target_branch)?;

        let source_ref = self.repo.find_branch(source_branch, BranchType::Local)?;
        let source_commit = source_ref.get().peel_to_commit()?;
        let annotated_commit = self.repo.find_annotated_commit(source_commit.id())?;

        let (analysis, _preference) = self.repo.merge_analysis(&[&annotated_commit])?;

        if analysis.is_up_to_date() {
            log::info!("[GitManager] Already up to date");
            return Ok(MergeResult {
                success: true,
                message: "Already up to date".to_string(),
                conflict_files: vec![],
                commit_id: Some(self.head_commit_id()?),
                fast_forward: false,
            });
        }

        if analysis.is_fast_forward() {
            log::info!("[GitManager] Fast-forward merge possible");

            let target_ref_name = format!("refs/heads/{}", target_branch);
            let mut target_ref = self.repo.find_reference(&target_ref_name)?;
            target_ref.set_target(
                source_commit.id(),
                &format!(
                    "Fast-forward merge {} into {}",
                    source_branch, target_branch
                ),
            )?;
            self.repo
                .checkout_head(Some(CheckoutBuilder::default().force()))?;

            return Ok(MergeResult {
                success: true,
                message: format!(
                    "Fast-forward merged {} into {}",
                    source_branch, target_branch
                ),
                conflict_files: vec![],
                commit_id: Some(source_commit.id().to_string()),
                fast_forward: true,
            });
        }

        let mut merge_opts = MergeOptions::new();
        let mut checkout_opts = CheckoutBuilder::new();
        checkout_opts.safe().allow_conflicts(true).conflict_style_merge(true);

        self.repo.merge(
            &[&annotated_commit],
            Some(&mut merge_opts),
            Some(&mut checkout_opts),
        )?;

        let mut index = self.repo.index()?;
        if index.has_conflicts() {
            let mut conflict_files = Vec::new();
            for conflict in index.conflicts()?.flatten() {
                if let Some(entry) = conflict.our.or(conflict.their).or(conflict.ancestor) {
                    conflict_files.push(String::from_utf8_lossy(&entry.path).to_string());
                }
            }

            log::warn!("[GitManager] Merge has conflicts: {:?}", conflict_files);
            return Ok(MergeResult {
                success: false,
                message: format!("Merge conflicts in {} file(s)", conflict_files.len()),
                conflict_files,
                commit_id: None,
                fast_forward: false,
            });
        }

        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;

        let head_commit = self.repo.head()?.peel_to_commit()?;
        let signature = self.signature_or(author_name, author_email)?;

        let merge_commit = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            &format!("Merge branch '{}' into '{}'", source_branch, target_branch),
            &tree,
            &[&head_commit, &source_commit],
        )?;

        self.repo.cleanup_state()?;

        log::info!("[GitManager] Merge successful: {}", merge_commit);

        Ok(MergeResult {
            success: true,
            message: format!(
                "Successfully merged {} into {}",
                source_branch, target_branch
            ),
            conflict_files: vec![],
            commit_id: Some(merge_commit.to_string()),
            fast_forward: false,
        })
    }

    /// Whether a merge is in progress
    pub fn is_merging(&self) -> bool {
        self.repo.path().join("MERGE_HEAD").exists()
    }

    /// Abort an ongoing merge
    pub fn merge_abort(&self) -> Result<(), GitError> {
        log::info!("[GitManager] Aborting merge");

        let head = self.repo.head()?.peel_to_commit()?;
        self.repo
            .reset(head.as_object(), git2::ResetType::Hard, None)?;

        self.repo.cleanup_state()?;

        Ok(())
    }

    /// Raw content of every stage for all files in conflict.
    /// Call while the repository is mid-merge.
    pub fn get_conflict_details(&self) -> Result<Vec<ConflictInfo>, GitError> {
        let index = self.repo.index()?;

        if !index.has_conflicts() {
            return Ok(Vec::new());
        }

        let workdir = self.workdir()?.to_path_buf();
        let mut conflicts = Vec::new();

        for conflict in index.conflicts()? {
            let conflict = conflict?;

            let path = match conflict
                .our
                .as_ref()
                .or(conflict.their.as_ref())
                .or(conflict.ancestor.as_ref())
            {
                Some(entry) => String::from_utf8_lossy(&entry.path).to_string(),
                None => continue,
            };

            let conflict_markers = fs::read(workdir.join(&path)).unwrap_or_default();

            conflicts.push(ConflictInfo {
                ancestor: self.get_blob_content(conflict.ancestor.as_ref())?,
                ours: self.get_blob_content(conflict.our.as_ref())?,
                theirs: self.get_blob_content(conflict.their.as_ref())?,
                conflict_markers,
                path,
            });
        }

        log::info!("[GitManager] Found {} conflict(s)", conflicts.len());
        Ok(conflicts)
    }

    /// Blob bytes behind an index entry; `None` when the stage is absent
    pub(crate) fn get_blob_content(
        &self,
        entry: Option<&git2::IndexEntry>,
    ) -> Result<Option<Vec<u8>>, GitError> {
        match entry {
            Some(entry) => {
                let blob = self.repo.find_blob(entry.id)?;
                Ok(Some(blob.content().to_vec()))
            }
            None => Ok(None),
        }
    }

    /// Write resolved content to a conflicted file and stage it
    pub fn resolve_conflict(&self, path: &str, resolved_content: &[u8]) -> Result<(), GitError> {
        let file_path = self.workdir()?.join(path);
        if let Some(parent) = file_path.parent() {
            fs::create_dir_all(parent)
                .map_err(|e| GitError::from_str(&format!("Failed to create {:?}: {}", parent, e)))?;
        }
        fs::write(&file_path, resolved_content)
            .map_err(|e| GitError::from_str(&format!("Failed to write file: {}", e)))?;

        // add_path clears the conflict entries for the path
        let mut index = self.repo.index()?;
        index.add_path(Path::new(path))?;
        index.write()?;

        log::info!("[GitManager] Resolved and staged conflict for: {}", path);
        Ok(())
    }

    /// Resolve a conflict by deleting the file
    pub fn resolve_conflict_by_removal(&self, path: &str) -> Result<(), GitError> {
        let file_path = self.workdir()?.join(path);
        if file_path.exists() {
            fs::remove_file(&file_path)
                .map_err(|e| GitError::from_str(&format!("Failed to remove file: {}", e)))?;
        }

        let mut index = self.repo.index()?;
        index.remove_path(Path::new(path))?;
        index.write()?;

        log::info!("[GitManager] Resolved conflict for {} by removal", path);
        Ok(())
    }

    /// Complete a merge after all conflicts have been resolved.
    /// Creates the merge commit using the staged index.
    pub fn complete_merge(
        &self,
        message: &str,
        author_name: &str,
        author_email: &str,
    ) -> Result<CommitInfo, GitError> {
        let merge_head_path = self.repo.path().join("MERGE_HEAD");
        if !merge_head_path.exists() {
            return Err(GitError::from_str("Not in a merge state"));
        }

        let mut index = self.repo.index()?;
        if index.has_conflicts() {
            return Err(GitError::from_str(
                "Cannot complete merge: unresolved conflicts remain",
            ));
        }

        let merge_head_content = fs::read_to_string(&merge_head_path)
            .map_err(|e| GitError::from_str(&format!("Failed to read MERGE_HEAD: {}", e)))?;
        let merge_head_oid = Oid::from_str(merge_head_content.trim())?;
        let merge_commit = self.repo.find_commit(merge_head_oid)?;

        let head_commit = self.repo.head()?.peel_to_commit()?;

        let tree_id = index.write_tree()?;
        let tree = self.repo.find_tree(tree_id)?;

        let signature = Signature::now(author_name, author_email)?;

        let commit_id = self.repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &[&head_commit, &merge_commit],
        )?;

        self.repo.cleanup_state()?;

        log::info!("[GitManager] Completed merge with commit: {}", commit_id);

        let new_commit = self.repo.find_commit(commit_id)?;
        self.commit_to_info(&new_commit)
    }
}
