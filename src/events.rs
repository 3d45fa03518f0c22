// Event types and payload structures for progress observers
// Events are pushed onto an unbounded channel; nobody listening is fine.

use crate::models::{ConflictClassification, TestResult, TrackState};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

// Event name constants
pub const EVENT_TRACK_STATE_CHANGED: &str = "track:state_changed";
pub const EVENT_CHECKPOINT_SAVED: &str = "track:checkpoint_saved";
pub const EVENT_UNIT_RETRY: &str = "track:unit_retry";
pub const EVENT_MERGE_CONFLICT_DETECTED: &str = "merge:conflict_detected";
pub const EVENT_ROUND_COMPLETED: &str = "merge:round_completed";
pub const EVENT_GATE_FINISHED: &str = "gate:finished";

/// Payload for track state change events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TrackStateChangedPayload {
    pub track_id: String,
    pub old_state: TrackState,
    pub new_state: TrackState,
}

/// Payload for checkpoint events
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CheckpointSavedPayload {
    pub track_id: String,
    pub unit_index: usize,
    pub unit_count: usize,
    pub commit_ref: Option<String>,
}

/// Payload emitted before a failed unit is retried
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UnitRetryPayload {
    pub track_id: String,
    pub unit_index: usize,
    pub attempt: u32,
    pub delay_ms: u64,
    pub error: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct MergeConflictDetectedPayload {
    pub round_number: usize,
    pub track_id: String,
    pub file_path: String,
    pub classification: ConflictClassification,
    pub approved: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct RoundCompletedPayload {
    pub round_number: usize,
    pub merged: Vec<String>,
    pub skipped: Vec<String>,
    pub test_result: TestResult,
    pub blocked_reason: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct GateFinishedPayload {
    /// Where the gate ran ("quality gates", "round 2", "track api")
    pub context: String,
    pub gate: String,
    pub index: usize,
    pub passed: bool,
    pub exit_code: Option<i32>,
    pub duration_ms: u64,
}

/// Any event the engine emits
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "event", content = "payload")]
pub enum EngineEvent {
    #[serde(rename = "track:state_changed")]
    TrackStateChanged(TrackStateChangedPayload),
    #[serde(rename = "track:checkpoint_saved")]
    CheckpointSaved(CheckpointSavedPayload),
    #[serde(rename = "track:unit_retry")]
    UnitRetry(UnitRetryPayload),
    #[serde(rename = "merge:conflict_detected")]
    MergeConflictDetected(MergeConflictDetectedPayload),
    #[serde(rename = "merge:round_completed")]
    RoundCompleted(RoundCompletedPayload),
    #[serde(rename = "gate:finished")]
    GateFinished(GateFinishedPayload),
}

impl EngineEvent {
    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::TrackStateChanged(_) => EVENT_TRACK_STATE_CHANGED,
            EngineEvent::CheckpointSaved(_) => EVENT_CHECKPOINT_SAVED,
            EngineEvent::UnitRetry(_) => EVENT_UNIT_RETRY,
            EngineEvent::MergeConflictDetected(_) => EVENT_MERGE_CONFLICT_DETECTED,
            EngineEvent::RoundCompleted(_) => EVENT_ROUND_COMPLETED,
            EngineEvent::GateFinished(_) => EVENT_GATE_FINISHED,
        }
    }
}

/// Cloneable handle used by every component to publish events
#[derive(Debug, Clone, Default)]
pub struct EventSink {
    sender: Option<mpsc::UnboundedSender<EngineEvent>>,
}

impl EventSink {
    pub fn new(sender: mpsc::UnboundedSender<EngineEvent>) -> Self {
        Self {
            sender: Some(sender),
        }
    }

    /// A sink that drops everything
    pub fn disabled() -> Self {
        Self { sender: None }
    }

    /// Create a sink together with the receiving end
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<EngineEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(tx), rx)
    }

    pub fn emit(&self, event: EngineEvent) {
        if let Some(sender) = &self.sender {
            // A dropped receiver only means nobody is watching
            let _ = sender.send(event);
        }
    }
}
