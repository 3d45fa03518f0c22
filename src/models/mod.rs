// Data models for manifests, tracks, completion markers, checkpoints and merge rounds

pub mod state_machine;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;

pub use state_machine::{StateTransitionError, TrackState};

/// Identifier of a track, unique within a manifest
pub type TrackId = String;

/// Marker written in place of a resume cursor once every unit is done
pub const CURSOR_END: &str = "end";

/// A feature split into dependent tracks. Immutable once loaded for a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Manifest {
    pub feature_id: String,
    pub tracks: Vec<Track>,
    #[serde(default)]
    pub merge_strategy: MergeStrategy,
    #[serde(default)]
    pub quality_gates: Vec<GateSpec>,
    pub workspace_root: PathBuf,
    /// Branch that completed tracks are merged into
    #[serde(default)]
    pub target_branch: Option<String>,
}

impl Manifest {
    /// Look up a track by id
    pub fn track(&self, id: &str) -> Option<&Track> {
        self.tracks.iter().find(|t| t.id == id)
    }

    /// Track ids in manifest order
    pub fn track_ids(&self) -> Vec<&str> {
        self.tracks.iter().map(|t| t.id.as_str()).collect()
    }

    /// Position of a track in the manifest (used for deterministic ordering)
    pub fn position(&self, id: &str) -> Option<usize> {
        self.tracks.iter().position(|t| t.id == id)
    }

    /// Gates that make up the per-round test suite
    pub fn test_suite(&self) -> Vec<GateSpec> {
        self.quality_gates
            .iter()
            .filter(|g| g.is_test_suite())
            .cloned()
            .collect()
    }
}

/// One independently schedulable unit of work with its own workspace
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Track {
    pub id: TrackId,
    pub name: String,
    /// Workspace identifier, owned exclusively by the track runner while active
    pub isolation_ref: String,
    #[serde(default)]
    pub depends_on: BTreeSet<TrackId>,
    /// Git branch carrying the track's work
    #[serde(default)]
    pub branch: Option<String>,
    #[serde(default)]
    pub units_of_work: Vec<Unit>,
    /// Checks covering this track, run to re-verify resolved conflicts
    #[serde(default)]
    pub post_merge_checks: Vec<GateSpec>,
}

impl Track {
    /// Branch name for this track, derived from the feature id when not declared
    pub fn branch_name(&self, feature_id: &str) -> String {
        match &self.branch {
            Some(branch) if !branch.trim().is_empty() => branch.clone(),
            _ => format!(
                "trackflow/{}/{}",
                crate::utils::sanitize_branch_name(feature_id),
                crate::utils::sanitize_branch_name(&self.id)
            ),
        }
    }

    /// Number of units in the track
    pub fn unit_count(&self) -> usize {
        self.units_of_work.len()
    }

    /// Unit by 1-based ordinal
    pub fn unit(&self, ordinal: usize) -> Option<&Unit> {
        ordinal
            .checked_sub(1)
            .and_then(|i| self.units_of_work.get(i))
    }
}

/// A single unit of work inside a track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Unit {
    pub id: String,
    #[serde(default)]
    pub description: String,
    /// Shell command run in the workspace by the command executor
    #[serde(default)]
    pub command: Option<String>,
}

/// Ordering of independent tracks inside one round
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeStrategy {
    /// Merge in the order tracks appear in the manifest
    #[default]
    ManifestOrder,
    /// Merge in lexicographic track id order
    ByTrackId,
}

/// A post-merge check. The engine treats every variant as an opaque command.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GateSpec {
    TestSuite { name: String, command: String },
    Audit { name: String, command: String },
    CustomCommand { name: String, command: String },
}

impl GateSpec {
    pub fn name(&self) -> &str {
        match self {
            GateSpec::TestSuite { name, .. }
            | GateSpec::Audit { name, .. }
            | GateSpec::CustomCommand { name, .. } => name,
        }
    }

    pub fn command(&self) -> &str {
        match self {
            GateSpec::TestSuite { command, .. }
            | GateSpec::Audit { command, .. }
            | GateSpec::CustomCommand { command, .. } => command,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            GateSpec::TestSuite { .. } => "test_suite",
            GateSpec::Audit { .. } => "audit",
            GateSpec::CustomCommand { .. } => "custom_command",
        }
    }

    pub fn is_test_suite(&self) -> bool {
        matches!(self, GateSpec::TestSuite { .. })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompletionStatus {
    Complete,
    Failed,
}

/// Immutable proof that a track reached a terminal state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompletionMarker {
    pub track_id: TrackId,
    pub status: CompletionStatus,
    pub final_commit_ref: Option<String>,
    pub timestamp: DateTime<Utc>,
    /// Number of units completed when the marker was written
    #[serde(default)]
    pub units_completed: usize,
    #[serde(default)]
    pub reason: Option<String>,
}

impl CompletionMarker {
    pub fn complete(track_id: &str, final_commit_ref: Option<String>, units: usize) -> Self {
        Self {
            track_id: track_id.to_string(),
            status: CompletionStatus::Complete,
            final_commit_ref,
            timestamp: Utc::now(),
            units_completed: units,
            reason: None,
        }
    }

    pub fn failed(
        track_id: &str,
        final_commit_ref: Option<String>,
        units: usize,
        reason: impl Into<String>,
    ) -> Self {
        Self {
            track_id: track_id.to_string(),
            status: CompletionStatus::Failed,
            final_commit_ref,
            timestamp: Utc::now(),
            units_completed: units,
            reason: Some(reason.into()),
        }
    }

    pub fn is_complete(&self) -> bool {
        self.status == CompletionStatus::Complete
    }

    /// Compare everything except the timestamp
    pub fn same_outcome(&self, other: &CompletionMarker) -> bool {
        self.track_id == other.track_id
            && self.status == other.status
            && self.final_commit_ref == other.final_commit_ref
            && self.units_completed == other.units_completed
    }
}

/// Mutable resume cursor for a track, overwritten after every completed unit
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
    pub track_id: TrackId,
    /// 1-based ordinal of the last completed unit
    pub last_completed_unit_index: usize,
    pub resume_cursor: String,
    pub commit_ref: Option<String>,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TestResult {
    Pass,
    Fail,
    #[default]
    NotRun,
}

/// One scheduler level worth of merges, kept as an audit record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeRound {
    pub round_number: usize,
    pub track_ids: Vec<TrackId>,
    /// Track id -> commit on the target line after its merge
    #[serde(default)]
    pub merged: BTreeMap<TrackId, String>,
    /// Tracks left out because they did not complete
    #[serde(default)]
    pub skipped: Vec<TrackId>,
    #[serde(default)]
    pub conflicts: Vec<ConflictRecord>,
    #[serde(default)]
    pub test_result: TestResult,
    #[serde(default)]
    pub test_output: Option<String>,
    #[serde(default)]
    pub blocked_reason: Option<String>,
    pub started_at: DateTime<Utc>,
    #[serde(default)]
    pub finished_at: Option<DateTime<Utc>>,
}

impl MergeRound {
    pub fn new(round_number: usize, track_ids: Vec<TrackId>) -> Self {
        Self {
            round_number,
            track_ids,
            merged: BTreeMap::new(),
            skipped: Vec::new(),
            conflicts: Vec::new(),
            test_result: TestResult::NotRun,
            test_output: None,
            blocked_reason: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    pub fn is_blocked(&self) -> bool {
        self.blocked_reason.is_some()
    }

    /// Conflicts still lacking an approved resolution
    pub fn unresolved_conflicts(&self) -> Vec<&ConflictRecord> {
        self.conflicts.iter().filter(|c| !c.approved).collect()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConflictClassification {
    Mechanical,
    Binary,
    Complex,
}

/// Location of a conflict within a file
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ConflictRegion {
    WholeFile,
    /// 1-based inclusive line span of the conflict markers in the merged file
    Lines { start: usize, end: usize },
}

/// A conflicting region and its resolution, if any
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictRecord {
    pub track_id: TrackId,
    pub file_path: String,
    pub region: ConflictRegion,
    pub classification: ConflictClassification,
    pub base_state: String,
    pub ours_state: String,
    pub theirs_state: String,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub approved: bool,
    /// Logged justification for an amputation or binary tie-break
    #[serde(default)]
    pub exception: Option<String>,
}
