//! Git operations using git2-rs
//!
//! Split by concern:
//! - `manager` - Core GitManager struct
//! - `branches` - Branch operations (create, checkout, resolve)
//! - `worktrees` - Worktree management backing track isolation
//! - `commits` - Staging and committing unit results
//! - `merge` - Merging track branches and three-stage conflict extraction
//! - `status` - Uncommitted changes in a checkout
//! - `types` - Shared data structures

mod branches;
mod commits;
mod manager;
mod merge;
mod status;
mod types;
mod worktrees;

pub use manager::GitManager;

pub use types::{BranchInfo, CommitInfo, ConflictInfo, MergeResult, WorktreeInfo};
