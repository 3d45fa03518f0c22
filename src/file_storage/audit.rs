//! Merge audit trail
//!
//! Each merge invocation gets a run directory under `.trackflow/audit/`
//! holding `rounds/round-NNN.json` files plus the final `report.json`.
//! Nothing here is read back as input by later runs.

use super::{ensure_dir, read_json_dir, read_json_opt, write_json, FileResult};
use crate::models::MergeRound;
use crate::utils::state_dir;
use std::fs;
use std::path::{Path, PathBuf};

const LATEST_FILE: &str = "LATEST";

#[derive(Debug, Clone)]
pub struct AuditTrail {
    root: PathBuf,
    run_id: String,
}

impl AuditTrail {
    /// Start a new run with a fresh id
    pub fn start(workspace_root: &Path) -> FileResult<Self> {
        let run_id = format!(
            "{}-{}",
            chrono::Utc::now().format("%Y%m%dT%H%M%SZ"),
            &uuid::Uuid::new_v4().simple().to_string()[..8]
        );
        Self::open(workspace_root, &run_id)
    }

    /// Open (or create) the run directory for an existing id
    pub fn open(workspace_root: &Path, run_id: &str) -> FileResult<Self> {
        let root = state_dir(workspace_root).join("audit");
        ensure_dir(&root.join(run_id))?;
        fs::write(root.join(LATEST_FILE), run_id)
            .map_err(|e| format!("Failed to record latest audit run: {}", e))?;
        Ok(Self {
            root,
            run_id: run_id.to_string(),
        })
    }

    /// Id of the most recently started run, if any
    pub fn latest_run_id(workspace_root: &Path) -> Option<String> {
        let path = state_dir(workspace_root).join("audit").join(LATEST_FILE);
        fs::read_to_string(path)
            .ok()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    pub fn run_dir(&self) -> PathBuf {
        self.root.join(&self.run_id)
    }

    pub fn record_round(&self, round: &MergeRound) -> FileResult<()> {
        let path = self
            .rounds_dir()
            .join(format!("round-{:03}.json", round.round_number));
        write_json(&path, round)?;
        log::debug!(
            "[AuditTrail] Recorded round {} in run {}",
            round.round_number,
            self.run_id
        );
        Ok(())
    }

    /// Rounds recorded so far in this run, in round order
    pub fn rounds(&self) -> FileResult<Vec<MergeRound>> {
        let mut rounds: Vec<MergeRound> = read_json_dir(&self.rounds_dir())?;
        rounds.sort_by_key(|r| r.round_number);
        Ok(rounds)
    }

    pub fn record_report<T: serde::Serialize>(&self, report: &T) -> FileResult<()> {
        write_json(&self.report_path(), report)
    }

    pub fn read_report<T: serde::de::DeserializeOwned>(&self) -> FileResult<Option<T>> {
        read_json_opt(&self.report_path())
    }

    fn rounds_dir(&self) -> PathBuf {
        self.run_dir().join("rounds")
    }

    fn report_path(&self) -> PathBuf {
        self.run_dir().join("report.json")
    }
}
