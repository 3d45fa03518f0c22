// Report types produced by the pipeline and printed by the CLI

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::gates::GateReport;
use crate::models::{CompletionStatus, MergeRound, TrackId};

/// Execution order computed for a manifest
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Plan {
    pub feature_id: String,
    pub target_branch: String,
    /// Track ids per round, in merge order
    pub rounds: Vec<Vec<TrackId>>,
}

/// Where a single track stands
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrackSummary {
    pub track_id: TrackId,
    /// 1-based round the track belongs to
    pub round: usize,
    pub status: Option<CompletionStatus>,
    pub units_completed: usize,
    pub unit_count: usize,
    pub final_commit_ref: Option<String>,
    /// Failure reason from the marker, or the error that left the track unfinished
    pub error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Every track completed, merged and passed the final gates
    Complete,
    /// Merges and gates passed but some tracks failed or were skipped
    Incomplete,
    /// A merge round or quality gate blocked the pipeline
    Failed,
    /// Stopped on shutdown request
    Aborted,
}

/// Final report of a `run` or `merge`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub feature_id: String,
    pub status: RunStatus,
    pub tracks: Vec<TrackSummary>,
    pub rounds: Vec<MergeRound>,
    pub final_gates: Option<GateReport>,
    /// Tip of the target line after merging
    pub final_commit_ref: Option<String>,
    pub error: Option<String>,
    pub exit_code: i32,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Snapshot for `status`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub feature_id: String,
    pub tracks: Vec<TrackSummary>,
    /// Latest audit run, if any merge has been attempted
    pub latest_run_id: Option<String>,
    pub latest_rounds: Vec<MergeRound>,
    /// Report of the latest run; absent while that run is still merging
    pub latest_report: Option<RunReport>,
}
