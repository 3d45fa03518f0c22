//! Unit executors
//!
//! Executors are synchronous and are driven from `spawn_blocking`, one unit
//! at a time per track.

use std::process::Command;

use crate::git::GitManager;
use crate::models::Unit;
use crate::runner::workspace::Workspace;
use crate::utils::clip_output;

/// Lines of command output kept in failure reasons
const OUTPUT_TAIL_LINES: usize = 40;

/// Everything an executor needs to run one unit
#[derive(Debug, Clone)]
pub struct UnitContext {
    pub feature_id: String,
    pub track_id: String,
    pub unit: Unit,
    /// 1-based position of the unit in its track
    pub ordinal: usize,
    pub unit_count: usize,
    /// 1-based attempt number
    pub attempt: u32,
    pub workspace: Workspace,
}

/// What a successful unit leaves behind
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnitOutcome {
    /// Commit holding the unit's work, recorded in the checkpoint
    pub commit_ref: Option<String>,
    pub output: String,
}

/// Runs a single unit of work inside a track's workspace
pub trait UnitExecutor: Send + Sync {
    fn execute(&self, ctx: &UnitContext) -> Result<UnitOutcome, String>;
}

/// Runs the unit's shell command in the workspace, then commits the result
#[derive(Debug, Clone)]
pub struct CommandUnitExecutor {
    author_name: String,
    author_email: String,
}

impl CommandUnitExecutor {
    pub fn new(author_name: &str, author_email: &str) -> Self {
        Self {
            author_name: author_name.to_string(),
            author_email: author_email.to_string(),
        }
    }

    fn shell(command: &str) -> Command {
        if cfg!(windows) {
            let mut cmd = Command::new("cmd");
            cmd.args(["/C", command]);
            cmd
        } else {
            let mut cmd = Command::new("sh");
            cmd.args(["-c", command]);
            cmd
        }
    }

    fn commit(&self, ctx: &UnitContext) -> Result<Option<String>, String> {
        if ctx.workspace.branch.is_none() {
            return Ok(None);
        }
        let git = GitManager::new(&ctx.workspace.path)
            .map_err(|e| format!("Failed to open workspace repository: {}", e))?;
        let message = format!(
            "[trackflow] {} {}/{}: {}",
            ctx.track_id, ctx.ordinal, ctx.unit_count, ctx.unit.id
        );
        git.commit_all(&message, &self.author_name, &self.author_email)
            .map(Some)
            .map_err(|e| format!("Failed to commit unit '{}': {}", ctx.unit.id, e))
    }
}

impl UnitExecutor for CommandUnitExecutor {
    fn execute(&self, ctx: &UnitContext) -> Result<UnitOutcome, String> {
        let mut output = String::new();

        if let Some(command) = ctx.unit.command.as_deref().filter(|c| !c.trim().is_empty()) {
            log::info!(
                "[UnitExecutor] {} unit {}/{} '{}' (attempt {}): {}",
                ctx.track_id,
                ctx.ordinal,
                ctx.unit_count,
                ctx.unit.id,
                ctx.attempt,
                command
            );

            let result = Self::shell(command)
                .current_dir(&ctx.workspace.path)
                .env("TRACKFLOW_FEATURE_ID", &ctx.feature_id)
                .env("TRACKFLOW_TRACK_ID", &ctx.track_id)
                .env("TRACKFLOW_UNIT_ID", &ctx.unit.id)
                .env("TRACKFLOW_UNIT_INDEX", ctx.ordinal.to_string())
                .env("TRACKFLOW_ATTEMPT", ctx.attempt.to_string())
                .output()
                .map_err(|e| format!("Failed to spawn '{}': {}", command, e))?;

            output = String::from_utf8_lossy(&result.stdout).to_string();
            output.push_str(&String::from_utf8_lossy(&result.stderr));

            if !result.status.success() {
                let code = result
                    .status
                    .code()
                    .map(|c| c.to_string())
                    .unwrap_or_else(|| "signal".to_string());
                return Err(format!(
                    "command exited with {}:\n{}",
                    code,
                    clip_output(&output, OUTPUT_TAIL_LINES)
                ));
            }
        }

        let commit_ref = self.commit(ctx)?;
        Ok(UnitOutcome { commit_ref, output })
    }
}
