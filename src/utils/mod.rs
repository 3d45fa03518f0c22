// Utility functions

use std::path::{Path, PathBuf};

/// Name of the per-workspace state directory
pub const STATE_DIR_NAME: &str = ".trackflow";

/// Get the .trackflow directory path for a workspace.
#[inline]
pub fn state_dir(workspace_root: &Path) -> PathBuf {
    workspace_root.join(STATE_DIR_NAME)
}

/// Get the .trackflow/config.yaml path for a workspace.
#[inline]
pub fn config_path(workspace_root: &Path) -> PathBuf {
    state_dir(workspace_root).join("config.yaml")
}

/// Get the directory that holds one git worktree per track.
#[inline]
pub fn worktrees_dir(workspace_root: &Path) -> PathBuf {
    state_dir(workspace_root).join("worktrees")
}

/// Sanitize a string for use in a branch name
pub fn sanitize_branch_name(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '-'
            }
        })
        .collect::<String>()
        .to_lowercase()
}

/// Sanitize a string for use as a path component
pub fn sanitize_path_component(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect::<String>()
}

/// Keep at most `max_lines` trailing lines of command output
pub fn clip_output(output: &str, max_lines: usize) -> String {
    let lines: Vec<&str> = output.lines().collect();
    if lines.len() <= max_lines {
        return output.to_string();
    }
    let start = lines.len() - max_lines;
    format!(
        "... ({} lines omitted)\n{}",
        start,
        lines[start..].join("\n")
    )
}
