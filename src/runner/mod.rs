//! Track Runner
//!
//! Drives one track through pending -> waiting_on_deps -> running ->
//! {completed, failed}. Units run strictly in order with a checkpoint after
//! each one; a restarted runner skips everything the checkpoint covers. The
//! completion marker is the last thing written and is never overwritten.

pub mod dependency_gate;
pub mod executor;
pub mod retry;
pub mod workspace;

use std::sync::Arc;

pub use dependency_gate::{DependencyGate, GateCheck, GateOpened};
pub use executor::{CommandUnitExecutor, UnitContext, UnitExecutor, UnitOutcome};
pub use retry::{with_retry, RetryResult};
pub use workspace::{DirectoryWorkspaces, Workspace, WorkspaceProvider, WorktreePool};

use crate::config::{EngineConfig, RetryConfig};
use crate::error::{EngineError, EngineResult};
use crate::events::{
    CheckpointSavedPayload, EngineEvent, EventSink, TrackStateChangedPayload, UnitRetryPayload,
};
use crate::file_storage::checkpoints::cursor_after;
use crate::file_storage::{CheckpointStore, MarkerStore};
use crate::models::state_machine::transition_state;
use crate::models::{Checkpoint, CompletionMarker, Manifest, Track, TrackId, TrackState, Unit};
use crate::shutdown::ShutdownState;

/// How a single track invocation ended
#[derive(Debug)]
pub struct TrackOutcome {
    pub track_id: TrackId,
    /// The track's marker as stored
    pub marker: CompletionMarker,
    /// Units the checkpoint already covered when this invocation started
    pub resumed_from: usize,
    /// Ordinals executed by this invocation
    pub executed_units: Vec<usize>,
    /// The marker existed before this invocation; nothing ran
    pub already_terminal: bool,
    /// Cause of failure when this invocation wrote a failed marker
    pub error: Option<EngineError>,
}

impl TrackOutcome {
    pub fn is_complete(&self) -> bool {
        self.marker.is_complete()
    }

    fn terminal(marker: CompletionMarker) -> Self {
        Self {
            track_id: marker.track_id.clone(),
            marker,
            resumed_from: 0,
            executed_units: Vec::new(),
            already_terminal: true,
            error: None,
        }
    }
}

enum UnitFailure {
    Exhausted(EngineError),
    Interrupted,
}

#[derive(Clone)]
pub struct TrackRunner {
    manifest: Arc<Manifest>,
    markers: MarkerStore,
    checkpoints: CheckpointStore,
    gate: DependencyGate,
    executor: Arc<dyn UnitExecutor>,
    workspaces: Arc<dyn WorkspaceProvider>,
    retry: RetryConfig,
    shutdown: ShutdownState,
    events: EventSink,
}

impl TrackRunner {
    pub fn new(
        manifest: Arc<Manifest>,
        config: &EngineConfig,
        executor: Arc<dyn UnitExecutor>,
        workspaces: Arc<dyn WorkspaceProvider>,
        shutdown: ShutdownState,
        events: EventSink,
    ) -> Self {
        let markers = MarkerStore::new(&manifest.workspace_root);
        let checkpoints = CheckpointStore::new(&manifest.workspace_root);
        let gate = DependencyGate::new(markers.clone(), config.gate.clone(), shutdown.clone());
        Self {
            manifest,
            markers,
            checkpoints,
            gate,
            executor,
            workspaces,
            retry: config.retry.clone(),
            shutdown,
            events,
        }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn workspaces(&self) -> &Arc<dyn WorkspaceProvider> {
        &self.workspaces
    }

    /// Run a track to a terminal state, or resume it from its checkpoint.
    ///
    /// A failed marker is an `Ok` outcome carrying the cause. `Err` means
    /// nothing terminal was recorded (abort, dependency timeout, storage) and
    /// the track can be run again.
    pub async fn run(&self, track_id: &str) -> EngineResult<TrackOutcome> {
        let track = self
            .manifest
            .track(track_id)
            .cloned()
            .ok_or_else(|| EngineError::UnknownTrack(track_id.to_string()))?;

        if let Some(marker) = self.markers.read(&track.id)? {
            log::info!(
                "[TrackRunner] {} already {:?}, nothing to do",
                track.id,
                marker.status
            );
            return Ok(TrackOutcome::terminal(marker));
        }

        let mut state = TrackState::Pending;
        self.transition(&track.id, &mut state, TrackState::WaitingOnDeps)?;

        match self.gate.wait_for(&track).await {
            Ok(_) => {}
            Err(err @ EngineError::UpstreamFailed { .. }) => {
                let checkpoint = self.checkpoints.load(&track.id)?;
                let marker = CompletionMarker::failed(
                    &track.id,
                    checkpoint.as_ref().and_then(|c| c.commit_ref.clone()),
                    checkpoint.map(|c| c.last_completed_unit_index).unwrap_or(0),
                    err.to_string(),
                );
                let marker = self.publish(marker)?;
                self.transition(&track.id, &mut state, TrackState::Failed)?;
                return Ok(TrackOutcome {
                    track_id: track.id.clone(),
                    marker,
                    resumed_from: 0,
                    executed_units: Vec::new(),
                    already_terminal: false,
                    error: Some(err),
                });
            }
            Err(err) => return Err(err),
        }

        self.transition(&track.id, &mut state, TrackState::Running)?;

        let unit_count = track.unit_count();
        let checkpoint = self.checkpoints.load(&track.id)?;
        if let Some(checkpoint) = &checkpoint {
            check_cursor(&track, checkpoint)?;
        }
        let resumed_from = checkpoint
            .as_ref()
            .map(|c| c.last_completed_unit_index)
            .unwrap_or(0);
        let mut last_commit = checkpoint.and_then(|c| c.commit_ref);

        let workspace = self.acquire_workspace(&track).await?;

        if resumed_from > 0 {
            log::info!(
                "[TrackRunner] Resuming {} after unit {}/{}",
                track.id,
                resumed_from,
                unit_count
            );
        }

        let mut executed_units = Vec::new();

        for (offset, unit) in track.units_of_work.iter().enumerate().skip(resumed_from) {
            let ordinal = offset + 1;

            if self.shutdown.is_shutdown_requested() {
                log::info!(
                    "[TrackRunner] {} stopping before unit {} on shutdown",
                    track.id,
                    ordinal
                );
                return Err(EngineError::Aborted(format!(
                    "track '{}' stopped after unit {}/{}",
                    track.id,
                    ordinal - 1,
                    unit_count
                )));
            }

            // Discard leftovers from a crashed or failed attempt
            let base = last_commit.clone().or_else(|| workspace.head_commit());
            let reset_first = executed_units.is_empty();

            match self
                .run_unit(&track, unit, ordinal, &workspace, base, reset_first)
                .await
            {
                Ok(outcome) => {
                    let commit_ref = outcome.commit_ref.or(last_commit);
                    self.checkpoints.save(
                        &track.id,
                        ordinal,
                        &cursor_after(&track.units_of_work, ordinal),
                        commit_ref.clone(),
                    )?;
                    self.events
                        .emit(EngineEvent::CheckpointSaved(CheckpointSavedPayload {
                            track_id: track.id.clone(),
                            unit_index: ordinal,
                            unit_count,
                            commit_ref: commit_ref.clone(),
                        }));
                    last_commit = commit_ref;
                    executed_units.push(ordinal);
                }
                Err(UnitFailure::Interrupted) => {
                    return Err(EngineError::Aborted(format!(
                        "track '{}' interrupted while retrying unit {}",
                        track.id, ordinal
                    )));
                }
                Err(UnitFailure::Exhausted(err)) => {
                    let marker =
                        CompletionMarker::failed(&track.id, last_commit, ordinal - 1, err.to_string());
                    let marker = self.publish(marker)?;
                    self.transition(&track.id, &mut state, TrackState::Failed)?;
                    return Ok(TrackOutcome {
                        track_id: track.id.clone(),
                        marker,
                        resumed_from,
                        executed_units,
                        already_terminal: false,
                        error: Some(err),
                    });
                }
            }
        }

        let final_commit_ref = last_commit.or_else(|| workspace.head_commit());
        let marker = self.publish(CompletionMarker::complete(
            &track.id,
            final_commit_ref,
            unit_count,
        ))?;
        self.transition(&track.id, &mut state, TrackState::Completed)?;

        Ok(TrackOutcome {
            track_id: track.id.clone(),
            marker,
            resumed_from,
            executed_units,
            already_terminal: false,
            error: None,
        })
    }

    async fn acquire_workspace(&self, track: &Track) -> EngineResult<Workspace> {
        let provider = self.workspaces.clone();
        let track = track.clone();
        tokio::task::spawn_blocking(move || provider.acquire(&track))
            .await
            .map_err(|e| EngineError::Storage(format!("Workspace allocation panicked: {}", e)))?
    }

    async fn run_unit(
        &self,
        track: &Track,
        unit: &Unit,
        ordinal: usize,
        workspace: &Workspace,
        base: Option<String>,
        reset_first: bool,
    ) -> Result<UnitOutcome, UnitFailure> {
        let unit_count = track.unit_count();

        let result = with_retry(
            |attempt| {
                let executor = self.executor.clone();
                let base = base.clone();
                let ctx = UnitContext {
                    feature_id: self.manifest.feature_id.clone(),
                    track_id: track.id.clone(),
                    unit: unit.clone(),
                    ordinal,
                    unit_count,
                    attempt,
                    workspace: workspace.clone(),
                };
                async move {
                    tokio::task::spawn_blocking(move || {
                        if attempt > 1 || reset_first {
                            if let Some(base) = base.as_deref() {
                                ctx.workspace.reset_to(base).map_err(|e| e.to_string())?;
                            }
                        }
                        executor.execute(&ctx)
                    })
                    .await
                    .map_err(|e| format!("unit task panicked: {}", e))?
                }
            },
            &self.retry,
            &self.shutdown,
            |attempt, error, delay_ms| {
                self.events.emit(EngineEvent::UnitRetry(UnitRetryPayload {
                    track_id: track.id.clone(),
                    unit_index: ordinal,
                    attempt,
                    delay_ms,
                    error: error.to_string(),
                }));
            },
        )
        .await;

        if result.interrupted {
            return Err(UnitFailure::Interrupted);
        }

        match result.result {
            Ok(outcome) => {
                log::info!(
                    "[TrackRunner] {} unit {}/{} '{}' done{}",
                    track.id,
                    ordinal,
                    unit_count,
                    unit.id,
                    if result.was_retried {
                        format!(" after {} attempts", result.attempts)
                    } else {
                        String::new()
                    }
                );
                Ok(outcome)
            }
            Err(reason) => {
                log::error!(
                    "[TrackRunner] {} unit {}/{} '{}' failed after {} attempt(s)",
                    track.id,
                    ordinal,
                    unit_count,
                    unit.id,
                    result.attempts
                );
                Err(UnitFailure::Exhausted(EngineError::UnitExecution {
                    track_id: track.id.clone(),
                    unit_index: ordinal,
                    unit_id: unit.id.clone(),
                    attempts: result.attempts,
                    reason,
                }))
            }
        }
    }

    /// Write the marker; if another writer got there first, theirs stands
    fn publish(&self, marker: CompletionMarker) -> EngineResult<CompletionMarker> {
        match self.markers.write(&marker) {
            Ok(()) => Ok(marker),
            Err(EngineError::MarkerAlreadyWritten(track_id)) => {
                let stored = self
                    .markers
                    .read(&track_id)?
                    .ok_or_else(|| EngineError::MarkerAlreadyWritten(track_id.clone()))?;
                if stored.same_outcome(&marker) {
                    log::info!(
                        "[TrackRunner] Marker for {} was written concurrently with the same outcome",
                        track_id
                    );
                } else {
                    log::warn!(
                        "[TrackRunner] Marker for {} was written concurrently as {:?}; keeping it over {:?}",
                        track_id,
                        stored.status,
                        marker.status
                    );
                }
                Ok(stored)
            }
            Err(e) => Err(e),
        }
    }

    fn transition(
        &self,
        track_id: &str,
        state: &mut TrackState,
        target: TrackState,
    ) -> EngineResult<()> {
        let old_state = *state;
        *state = transition_state(old_state, target)?;
        log::debug!(
            "[TrackRunner] {}: {:?} -> {:?}",
            track_id,
            old_state,
            target
        );
        self.events
            .emit(EngineEvent::TrackStateChanged(TrackStateChangedPayload {
                track_id: track_id.to_string(),
                old_state,
                new_state: target,
            }));
        Ok(())
    }
}

/// A checkpoint only applies to the units it was saved for: its cursor must
/// name the unit that follows the last completed one
fn check_cursor(track: &Track, checkpoint: &Checkpoint) -> EngineResult<()> {
    let stored = checkpoint.last_completed_unit_index;
    let unit_count = track.unit_count();

    let reason = if stored > unit_count {
        format!(
            "it covers unit {} but the track has {} unit(s)",
            stored, unit_count
        )
    } else {
        let expected = cursor_after(&track.units_of_work, stored);
        if checkpoint.resume_cursor == expected {
            return Ok(());
        }
        format!(
            "it resumes at '{}' after unit {} but that position now holds '{}'",
            checkpoint.resume_cursor, stored, expected
        )
    };

    log::error!("[TrackRunner] {} checkpoint is stale: {}", track.id, reason);
    Err(EngineError::StaleCheckpoint {
        track_id: track.id.clone(),
        reason,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GateWaitConfig;
    use crate::models::{CompletionStatus, MergeStrategy, CURSOR_END};
    use std::collections::{BTreeSet, HashMap};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Records calls and fails selected units a fixed number of times
    #[derive(Default)]
    struct ScriptedExecutor {
        calls: Mutex<Vec<(String, usize, u32)>>,
        failures: Mutex<HashMap<(String, usize), u32>>,
    }

    impl ScriptedExecutor {
        fn failing(track: &str, ordinal: usize, times: u32) -> Self {
            let executor = Self::default();
            executor
                .failures
                .lock()
                .unwrap()
                .insert((track.to_string(), ordinal), times);
            executor
        }

        fn ordinals(&self, track: &str) -> Vec<usize> {
            self.calls
                .lock()
                .unwrap()
                .iter()
                .filter(|(t, _, _)| t == track)
                .map(|(_, o, _)| *o)
                .collect()
        }
    }

    impl UnitExecutor for ScriptedExecutor {
        fn execute(&self, ctx: &UnitContext) -> Result<UnitOutcome, String> {
            self.calls
                .lock()
                .unwrap()
                .push((ctx.track_id.clone(), ctx.ordinal, ctx.attempt));
            let mut failures = self.failures.lock().unwrap();
            if let Some(left) = failures.get_mut(&(ctx.track_id.clone(), ctx.ordinal)) {
                if *left > 0 {
                    *left -= 1;
                    return Err(format!("unit {} exploded", ctx.unit.id));
                }
            }
            Ok(UnitOutcome {
                commit_ref: Some(format!("{}-{}", ctx.track_id, ctx.ordinal)),
                output: String::new(),
            })
        }
    }

    fn unit(id: &str) -> Unit {
        Unit {
            id: id.to_string(),
            description: String::new(),
            command: None,
        }
    }

    fn track(id: &str, deps: &[&str], units: usize) -> Track {
        Track {
            id: id.to_string(),
            name: id.to_string(),
            isolation_ref: format!("ws-{}", id),
            depends_on: deps.iter().map(|d| d.to_string()).collect::<BTreeSet<_>>(),
            branch: None,
            units_of_work: (1..=units).map(|i| unit(&format!("u{}", i))).collect(),
            post_merge_checks: vec![],
        }
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            retry: RetryConfig {
                max_attempts: 3,
                initial_delay_ms: 1,
                max_delay_ms: 2,
                backoff_multiplier: 1.0,
            },
            gate: GateWaitConfig {
                poll_interval_ms: 1,
                max_attempts: 2,
                backoff_multiplier: 1.0,
                max_interval_ms: 1,
            },
            ..Default::default()
        }
    }

    fn runner_with(
        dir: &TempDir,
        tracks: Vec<Track>,
        executor: Arc<ScriptedExecutor>,
        shutdown: ShutdownState,
    ) -> (TrackRunner, tokio::sync::mpsc::UnboundedReceiver<EngineEvent>) {
        let manifest = Manifest {
            feature_id: "feat".to_string(),
            tracks,
            merge_strategy: MergeStrategy::ManifestOrder,
            quality_gates: vec![],
            workspace_root: dir.path().to_path_buf(),
            target_branch: None,
        };
        let (events, rx) = EventSink::channel();
        let runner = TrackRunner::new(
            Arc::new(manifest),
            &test_config(),
            executor,
            Arc::new(DirectoryWorkspaces::new(dir.path())),
            shutdown,
            events,
        );
        (runner, rx)
    }

    fn drain(rx: &mut tokio::sync::mpsc::UnboundedReceiver<EngineEvent>) -> Vec<EngineEvent> {
        let mut events = Vec::new();
        while let Ok(event) = rx.try_recv() {
            events.push(event);
        }
        events
    }

    #[tokio::test]
    async fn test_runs_all_units_and_marks_complete() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(ScriptedExecutor::default());
        let (runner, mut rx) =
            runner_with(&dir, vec![track("a", &[], 3)], executor.clone(), ShutdownState::new());

        let outcome = runner.run("a").await.unwrap();
        assert!(outcome.is_complete());
        assert_eq!(outcome.executed_units, vec![1, 2, 3]);
        assert_eq!(outcome.marker.final_commit_ref.as_deref(), Some("a-3"));
        assert_eq!(outcome.marker.units_completed, 3);
        assert_eq!(executor.ordinals("a"), vec![1, 2, 3]);

        let checkpoint = CheckpointStore::new(dir.path()).load("a").unwrap().unwrap();
        assert_eq!(checkpoint.last_completed_unit_index, 3);
        assert_eq!(checkpoint.resume_cursor, crate::models::CURSOR_END);

        let states: Vec<TrackState> = drain(&mut rx)
            .into_iter()
            .filter_map(|e| match e {
                EngineEvent::TrackStateChanged(p) => Some(p.new_state),
                _ => None,
            })
            .collect();
        assert_eq!(
            states,
            vec![
                TrackState::WaitingOnDeps,
                TrackState::Running,
                TrackState::Completed
            ]
        );
    }

    #[tokio::test]
    async fn test_resume_skips_checkpointed_units() {
        let dir = TempDir::new().unwrap();
        CheckpointStore::new(dir.path())
            .save("a", 3, "u4", Some("a-3".to_string()))
            .unwrap();
        let executor = Arc::new(ScriptedExecutor::default());
        let (runner, _rx) =
            runner_with(&dir, vec![track("a", &[], 5)], executor.clone(), ShutdownState::new());

        let outcome = runner.run("a").await.unwrap();
        assert_eq!(outcome.resumed_from, 3);
        assert_eq!(executor.ordinals("a"), vec![4, 5]);
        assert_eq!(outcome.marker.final_commit_ref.as_deref(), Some("a-5"));
        assert_eq!(outcome.marker.units_completed, 5);
    }

    #[tokio::test]
    async fn test_checkpoint_from_edited_manifest_is_refused() {
        let dir = TempDir::new().unwrap();
        let checkpoints = CheckpointStore::new(dir.path());
        // Saved when the fourth unit was still called "deploy"
        checkpoints
            .save("a", 3, "deploy", Some("a-3".to_string()))
            .unwrap();
        checkpoints
            .save("b", 4, CURSOR_END, Some("b-4".to_string()))
            .unwrap();
        let executor = Arc::new(ScriptedExecutor::default());
        let (runner, _rx) = runner_with(
            &dir,
            vec![track("a", &[], 5), track("b", &[], 2)],
            executor.clone(),
            ShutdownState::new(),
        );

        let err = runner.run("a").await.unwrap_err();
        assert!(matches!(err, EngineError::StaleCheckpoint { ref track_id, .. } if track_id == "a"));
        assert!(err.to_string().contains("'deploy'"));
        assert!(err.to_string().contains("'u4'"));

        let err = runner.run("b").await.unwrap_err();
        assert!(err.to_string().contains("covers unit 4"));

        // Nothing ran and both tracks stay runnable
        assert!(executor.ordinals("a").is_empty());
        assert!(executor.ordinals("b").is_empty());
        let markers = MarkerStore::new(dir.path());
        assert!(markers.read("a").unwrap().is_none());
        assert!(markers.read("b").unwrap().is_none());
    }

    #[tokio::test]
    async fn test_existing_marker_short_circuits() {
        let dir = TempDir::new().unwrap();
        MarkerStore::new(dir.path())
            .write(&CompletionMarker::complete("a", Some("abc".to_string()), 2))
            .unwrap();
        let executor = Arc::new(ScriptedExecutor::default());
        let (runner, _rx) =
            runner_with(&dir, vec![track("a", &[], 2)], executor.clone(), ShutdownState::new());

        let outcome = runner.run("a").await.unwrap();
        assert!(outcome.already_terminal);
        assert_eq!(outcome.marker.final_commit_ref.as_deref(), Some("abc"));
        assert!(executor.ordinals("a").is_empty());
    }

    #[tokio::test]
    async fn test_unit_retried_then_succeeds() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(ScriptedExecutor::failing("a", 2, 2));
        let (runner, mut rx) =
            runner_with(&dir, vec![track("a", &[], 2)], executor.clone(), ShutdownState::new());

        let outcome = runner.run("a").await.unwrap();
        assert!(outcome.is_complete());
        assert_eq!(executor.ordinals("a"), vec![1, 2, 2, 2]);

        let retries = drain(&mut rx)
            .into_iter()
            .filter(|e| matches!(e, EngineEvent::UnitRetry(_)))
            .count();
        assert_eq!(retries, 2);
    }

    #[tokio::test]
    async fn test_exhausted_retries_write_failed_marker() {
        let dir = TempDir::new().unwrap();
        let executor = Arc::new(ScriptedExecutor::failing("a", 2, 10));
        let (runner, _rx) =
            runner_with(&dir, vec![track("a", &[], 3)], executor.clone(), ShutdownState::new());

        let outcome = runner.run("a").await.unwrap();
        assert_eq!(outcome.marker.status, CompletionStatus::Failed);
        assert_eq!(outcome.marker.units_completed, 1);
        assert_eq!(outcome.marker.final_commit_ref.as_deref(), Some("a-1"));
        let err = outcome.error.unwrap();
        assert_eq!(err.exit_code(), 6);
        assert!(err.to_string().contains("unit 2"));

        // Unit 3 never ran and the checkpoint still points at unit 1
        assert_eq!(executor.ordinals("a"), vec![1, 2, 2, 2]);
        assert_eq!(
            CheckpointStore::new(dir.path()).completed_units("a").unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_upstream_failure_marks_dependent_failed() {
        let dir = TempDir::new().unwrap();
        MarkerStore::new(dir.path())
            .write(&CompletionMarker::failed("a", None, 0, "boom"))
            .unwrap();
        let executor = Arc::new(ScriptedExecutor::default());
        let (runner, _rx) = runner_with(
            &dir,
            vec![track("a", &[], 1), track("b", &["a"], 1)],
            executor.clone(),
            ShutdownState::new(),
        );

        let outcome = runner.run("b").await.unwrap();
        assert_eq!(outcome.marker.status, CompletionStatus::Failed);
        assert_eq!(outcome.error.unwrap().exit_code(), 5);
        assert!(executor.ordinals("b").is_empty());
    }

    #[tokio::test]
    async fn test_missing_dependency_times_out_without_marker() {
        let dir = TempDir::new().unwrap();
        let (runner, _rx) = runner_with(
            &dir,
            vec![track("a", &[], 1), track("b", &["a"], 1)],
            Arc::new(ScriptedExecutor::default()),
            ShutdownState::new(),
        );

        let err = runner.run("b").await.unwrap_err();
        assert!(matches!(err, EngineError::DependenciesNotMet { .. }));
        assert!(!MarkerStore::new(dir.path()).exists("b"));
    }

    #[tokio::test]
    async fn test_shutdown_stops_between_units_without_marker() {
        let dir = TempDir::new().unwrap();
        let shutdown = ShutdownState::new();
        shutdown.request_shutdown();
        let executor = Arc::new(ScriptedExecutor::default());
        let (runner, _rx) =
            runner_with(&dir, vec![track("a", &[], 2)], executor.clone(), shutdown);

        let err = runner.run("a").await.unwrap_err();
        assert!(matches!(err, EngineError::Aborted(_)));
        assert!(executor.ordinals("a").is_empty());
        assert!(!MarkerStore::new(dir.path()).exists("a"));
    }

    #[tokio::test]
    async fn test_unknown_track() {
        let dir = TempDir::new().unwrap();
        let (runner, _rx) = runner_with(
            &dir,
            vec![],
            Arc::new(ScriptedExecutor::default()),
            ShutdownState::new(),
        );
        assert!(matches!(
            runner.run("ghost").await.unwrap_err(),
            EngineError::UnknownTrack(_)
        ));
    }
}
