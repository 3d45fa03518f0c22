//! Engine error taxonomy
//!
//! Every variant names the track, round or gate it concerns so that a fatal
//! error is always diagnosable from its message alone.

use crate::models::{StateTransitionError, TrackId};
use thiserror::Error;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Malformed manifest {path}: {reason}")]
    MalformedManifest { path: String, reason: String },

    #[error("Cyclic dependency: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<TrackId> },

    #[error(
        "Track '{track_id}' dependencies not met after {attempts} poll(s): missing {}",
        .missing.join(", ")
    )]
    DependenciesNotMet {
        track_id: TrackId,
        missing: Vec<TrackId>,
        attempts: u32,
    },

    #[error("Track '{track_id}' cannot start: upstream track '{failed_track_id}' failed")]
    UpstreamFailed {
        track_id: TrackId,
        failed_track_id: TrackId,
    },

    #[error(
        "Track '{track_id}' unit {unit_index} ('{unit_id}') failed after {attempts} attempt(s): {reason}"
    )]
    UnitExecution {
        track_id: TrackId,
        unit_index: usize,
        unit_id: String,
        attempts: u32,
        reason: String,
    },

    #[error("Track '{track_id}' failed: {reason}")]
    TrackFailed { track_id: TrackId, reason: String },

    #[error(
        "Round {round_number}: unresolved merge conflicts merging track '{track_id}': {}",
        .files.join(", ")
    )]
    MergeConflictUnresolved {
        round_number: usize,
        track_id: TrackId,
        files: Vec<String>,
    },

    #[error("Round {round_number}: merge of track '{track_id}' failed: {reason}")]
    MergeFailed {
        round_number: usize,
        track_id: TrackId,
        reason: String,
    },

    #[error("Target branch '{branch}' has uncommitted changes: {}", .files.join(", "))]
    DirtyTarget { branch: String, files: Vec<String> },

    #[error("{context}: gate '{gate}' failed (exit code {}):\n{output}", .exit_code.map(|c| c.to_string()).unwrap_or_else(|| "none".to_string()))]
    GateFailure {
        context: String,
        gate: String,
        /// Position of the gate in its pipeline
        index: usize,
        exit_code: Option<i32>,
        output: String,
    },

    #[error("Completion marker for track '{0}' already written")]
    MarkerAlreadyWritten(TrackId),

    #[error(
        "Checkpoint regression for track '{track_id}': stored unit {stored}, attempted unit {attempted}"
    )]
    CheckpointRegression {
        track_id: TrackId,
        stored: usize,
        attempted: usize,
    },

    #[error(
        "Checkpoint for track '{track_id}' no longer matches the manifest: {reason}; remove it to start the track over"
    )]
    StaleCheckpoint { track_id: TrackId, reason: String },

    #[error("Unknown track '{0}'")]
    UnknownTrack(TrackId),

    #[error("Aborted: {0}")]
    Aborted(String),

    #[error(transparent)]
    State(#[from] StateTransitionError),

    #[error("Git error: {0}")]
    Git(#[from] git2::Error),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl EngineError {
    /// Process exit code identifying the failure class (and gate, for gate failures)
    pub fn exit_code(&self) -> i32 {
        match self {
            EngineError::MalformedManifest { .. } => 2,
            EngineError::CyclicDependency { .. } => 3,
            EngineError::DependenciesNotMet { .. } => 4,
            EngineError::UpstreamFailed { .. } => 5,
            EngineError::UnitExecution { .. } => 6,
            EngineError::MergeConflictUnresolved { .. } => 7,
            EngineError::MergeFailed { .. } | EngineError::DirtyTarget { .. } => 8,
            EngineError::TrackFailed { .. } => 9,
            EngineError::Aborted(_) => 10,
            EngineError::GateFailure { index, .. } => (20 + *index as i32).min(99),
            _ => 1,
        }
    }

    /// Whether the caller may retry the same operation without changing anything
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            EngineError::DependenciesNotMet { .. } | EngineError::UnitExecution { .. }
        )
    }
}

impl From<String> for EngineError {
    fn from(message: String) -> Self {
        EngineError::Storage(message)
    }
}
