// Track lifecycle state machine with validation
//
// pending -> waiting_on_deps -> running -> {completed, failed}
// waiting_on_deps -> failed covers an upstream failure.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TrackState {
    Pending,
    WaitingOnDeps,
    Running,
    Completed,
    Failed,
}

#[derive(Debug, Error)]
pub enum StateTransitionError {
    #[error("Invalid state transition from {from:?} to {to:?}")]
    InvalidTransition { from: TrackState, to: TrackState },

    #[error("Track already in terminal state: {0:?}")]
    AlreadyTerminal(TrackState),
}

/// Validates if a track can move from one state to another
pub fn can_transition(from: TrackState, to: TrackState) -> bool {
    match (from, to) {
        (TrackState::Pending, TrackState::WaitingOnDeps) => true,

        (TrackState::WaitingOnDeps, TrackState::Running) => true,
        (TrackState::WaitingOnDeps, TrackState::Failed) => true, // upstream failed

        (TrackState::Running, TrackState::Completed) => true,
        (TrackState::Running, TrackState::Failed) => true,

        // Same state is a no-op, except that terminal states never move
        (a, b) if a == b => true,

        _ => false,
    }
}

/// Validates and performs a state transition
pub fn transition_state(
    current: TrackState,
    target: TrackState,
) -> Result<TrackState, StateTransitionError> {
    if is_terminal_state(current) && current != target {
        return Err(StateTransitionError::AlreadyTerminal(current));
    }

    if !can_transition(current, target) {
        return Err(StateTransitionError::InvalidTransition {
            from: current,
            to: target,
        });
    }

    Ok(target)
}

/// Check if a state is terminal (a completion marker exists for it)
pub fn is_terminal_state(state: TrackState) -> bool {
    matches!(state, TrackState::Completed | TrackState::Failed)
}
