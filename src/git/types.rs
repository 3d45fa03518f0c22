//! Git data types and structures

use serde::{Deserialize, Serialize};

/// Represents a git branch
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BranchInfo {
    pub name: String,
    pub is_head: bool,
    pub commit_id: String,
}

/// Represents a git commit
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitInfo {
    pub id: String,
    pub short_id: String,
    pub message: String,
    pub author: String,
    pub email: String,
    pub timestamp: i64,
    pub parent_ids: Vec<String>,
}

/// Represents a git worktree
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorktreeInfo {
    pub name: String,
    pub path: String,
    pub branch: Option<String>,
    pub is_locked: bool,
}

/// Represents the result of a merge operation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MergeResult {
    pub success: bool,
    pub message: String,
    pub conflict_files: Vec<String>,
    pub commit_id: Option<String>,
    pub fast_forward: bool,
}

/// A single file in conflict, with the raw bytes of every index stage.
/// A missing stage means the file does not exist on that side.
#[derive(Debug, Clone)]
pub struct ConflictInfo {
    pub path: String,
    /// Common ancestor
    pub ancestor: Option<Vec<u8>>,
    /// Target line (ours)
    pub ours: Option<Vec<u8>>,
    /// Merging branch (theirs)
    pub theirs: Option<Vec<u8>>,
    /// Working tree content with conflict markers
    pub conflict_markers: Vec<u8>,
}
