//! Merge Round Engine
//!
//! Rounds are merged strictly in scheduler order. Inside a round, completed
//! tracks are merged one after another into the target line; conflicts go
//! through the resolver and the merging track's `post_merge_checks`; then the
//! round's test suite runs once. Anything short of a passing round stops the
//! engine there.

pub mod conflicts;
pub mod git_backend;

use std::path::PathBuf;
use std::sync::Arc;

pub use conflicts::{
    ConflictResolver, ConflictSite, FileSynthesisPolicy, NoSynthesis, Proposal, Resolution,
    ResolvedContent, SynthesisPolicy, SynthesisRequest,
};
pub use git_backend::GitMergeBackend;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::{
    EngineEvent, EventSink, MergeConflictDetectedPayload, RoundCompletedPayload,
};
use crate::file_storage::{AuditTrail, MarkerStore};
use crate::gates::QualityGatePipeline;
use crate::git::ConflictInfo;
use crate::models::{Manifest, MergeRound, TestResult, Track};
use crate::scheduler;
use crate::shutdown::ShutdownState;

/// Result of merging one branch
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BackendMerge {
    Merged { commit: String, fast_forward: bool },
    /// The backend is left mid-merge until `commit` or `abort`
    Conflicted { files: Vec<String> },
}

/// Target line the engine merges into
pub trait MergeBackend: Send + Sync {
    /// Merge `branch` into the target line
    fn merge(&self, branch: &str) -> EngineResult<BackendMerge>;

    /// Three-way contents of every conflicted file of the pending merge
    fn conflicts(&self) -> EngineResult<Vec<ConflictInfo>>;

    /// Stage resolved content for one conflicted path
    fn stage(&self, path: &str, content: &ResolvedContent) -> EngineResult<()>;

    /// Conclude the pending merge; returns the merge commit
    fn commit(&self, message: &str) -> EngineResult<String>;

    /// Drop the pending merge, if any
    fn abort(&self) -> EngineResult<()>;

    /// Directory gates and tests run in
    fn workdir(&self) -> PathBuf;

    /// Current tip of the target line
    fn head(&self) -> EngineResult<Option<String>>;

    /// Tracked files changed but not committed in the target checkout
    fn uncommitted_changes(&self) -> EngineResult<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Rounds attempted by one merge pass and the error that stopped it, if any
#[derive(Debug)]
pub struct MergeOutcome {
    pub rounds: Vec<MergeRound>,
    pub error: Option<EngineError>,
}

impl MergeOutcome {
    pub fn is_success(&self) -> bool {
        self.error.is_none()
    }
}

pub struct MergeRoundEngine {
    manifest: Arc<Manifest>,
    backend: Arc<dyn MergeBackend>,
    resolver: ConflictResolver,
    policy: Arc<dyn SynthesisPolicy>,
    gates: QualityGatePipeline,
    markers: MarkerStore,
    audit: AuditTrail,
    shutdown: ShutdownState,
    events: EventSink,
}

impl MergeRoundEngine {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        manifest: Arc<Manifest>,
        config: &EngineConfig,
        backend: Arc<dyn MergeBackend>,
        policy: Arc<dyn SynthesisPolicy>,
        gates: QualityGatePipeline,
        audit: AuditTrail,
        shutdown: ShutdownState,
        events: EventSink,
    ) -> EngineResult<Self> {
        let markers = MarkerStore::new(&manifest.workspace_root);
        Ok(Self {
            resolver: ConflictResolver::new(&config.conflicts)?,
            manifest,
            backend,
            policy,
            gates,
            markers,
            audit,
            shutdown,
            events,
        })
    }

    pub fn backend(&self) -> &Arc<dyn MergeBackend> {
        &self.backend
    }

    /// Merge every round in order, stopping at the first round that does not pass
    pub async fn run(&self) -> EngineResult<MergeOutcome> {
        let manifest = self.manifest.clone();
        let rounds = scheduler::order(&manifest)?;
        let mut done = Vec::with_capacity(rounds.len());

        for (index, tracks) in rounds.iter().enumerate() {
            if self.shutdown.is_shutdown_requested() {
                return Ok(MergeOutcome {
                    rounds: done,
                    error: Some(EngineError::Aborted(format!(
                        "merge stopped before round {}",
                        index + 1
                    ))),
                });
            }

            let (round, error) = self.merge_round(index + 1, tracks).await;
            done.push(round);

            if let Some(error) = error {
                log::error!("[MergeRoundEngine] {}", error);
                return Ok(MergeOutcome {
                    rounds: done,
                    error: Some(error),
                });
            }
        }

        log::info!("[MergeRoundEngine] All {} round(s) passed", done.len());
        Ok(MergeOutcome {
            rounds: done,
            error: None,
        })
    }

    /// Merge one round. The round is recorded in the audit trail whatever
    /// the outcome.
    pub async fn merge_round(
        &self,
        round_number: usize,
        tracks: &[&Track],
    ) -> (MergeRound, Option<EngineError>) {
        let mut round = MergeRound::new(
            round_number,
            tracks.iter().map(|t| t.id.clone()).collect(),
        );
        log::info!(
            "[MergeRoundEngine] Round {}: {:?}",
            round_number,
            round.track_ids
        );

        let mut error = self.merge_tracks(&mut round, tracks).await.err();

        if error.is_none() {
            error = self.test_round(&mut round).await.err();
        }

        if let Some(err) = &error {
            round.blocked_reason = Some(err.to_string());
        }
        round.finished_at = Some(chrono::Utc::now());

        if let Err(e) = self.audit.record_round(&round) {
            log::error!(
                "[MergeRoundEngine] Failed to record round {}: {}",
                round_number,
                e
            );
            if error.is_none() {
                error = Some(EngineError::Storage(e));
            }
        }

        self.events
            .emit(EngineEvent::RoundCompleted(RoundCompletedPayload {
                round_number,
                merged: round.merged.keys().cloned().collect(),
                skipped: round.skipped.clone(),
                test_result: round.test_result,
                blocked_reason: round.blocked_reason.clone(),
            }));

        (round, error)
    }

    async fn merge_tracks(&self, round: &mut MergeRound, tracks: &[&Track]) -> EngineResult<()> {
        for track in tracks {
            match self.markers.read(&track.id)? {
                Some(marker) if marker.is_complete() => {}
                other => {
                    log::warn!(
                        "[MergeRoundEngine] Round {}: skipping {} ({})",
                        round.round_number,
                        track.id,
                        match other {
                            Some(_) => "failed",
                            None => "not finished",
                        }
                    );
                    round.skipped.push(track.id.clone());
                    continue;
                }
            }

            let result = self.merge_track(round, track).await;
            if let Err(err) = result {
                if let Err(abort_err) = self.backend.abort() {
                    log::warn!(
                        "[MergeRoundEngine] Failed to abort merge of {}: {}",
                        track.id,
                        abort_err
                    );
                }
                return Err(err);
            }
        }
        Ok(())
    }

    async fn merge_track(&self, round: &mut MergeRound, track: &Track) -> EngineResult<()> {
        let round_number = round.round_number;
        let branch = track.branch_name(&self.manifest.feature_id);

        let merge = self
            .backend
            .merge(&branch)
            .map_err(|e| EngineError::MergeFailed {
                round_number,
                track_id: track.id.clone(),
                reason: e.to_string(),
            })?;

        let files = match merge {
            BackendMerge::Merged {
                commit,
                fast_forward,
            } => {
                log::info!(
                    "[MergeRoundEngine] Round {}: merged {} at {}{}",
                    round_number,
                    track.id,
                    commit,
                    if fast_forward { " (fast-forward)" } else { "" }
                );
                round.merged.insert(track.id.clone(), commit);
                return Ok(());
            }
            BackendMerge::Conflicted { files } => files,
        };

        log::warn!(
            "[MergeRoundEngine] Round {}: {} conflicts in {:?}",
            round_number,
            track.id,
            files
        );

        let mut resolutions = Vec::new();
        for info in self.backend.conflicts()? {
            let (site, base, ours, theirs) = ConflictSite::from_git(&track.id, info);
            let resolution = self.resolver.resolve(
                &site,
                self.policy.as_ref(),
                base.as_deref(),
                ours.as_deref(),
                theirs.as_deref(),
            )?;

            self.events.emit(EngineEvent::MergeConflictDetected(
                MergeConflictDetectedPayload {
                    round_number,
                    track_id: track.id.clone(),
                    file_path: resolution.record.file_path.clone(),
                    classification: resolution.record.classification,
                    approved: resolution.record.approved,
                },
            ));
            round.conflicts.push(resolution.record.clone());
            resolutions.push(resolution);
        }

        let unresolved: Vec<String> = resolutions
            .iter()
            .filter(|r| !r.record.approved)
            .map(|r| r.record.file_path.clone())
            .collect();
        if !unresolved.is_empty() {
            return Err(EngineError::MergeConflictUnresolved {
                round_number,
                track_id: track.id.clone(),
                files: unresolved,
            });
        }

        for resolution in &resolutions {
            if let Some(content) = &resolution.content {
                self.backend.stage(&resolution.record.file_path, content)?;
            }
        }

        // Resolved regions must pass the checks that cover the merging track
        let report = self
            .gates
            .run(
                &format!("round {} resolution of {}", round_number, track.id),
                &track.post_merge_checks,
                &self.backend.workdir(),
            )
            .await;
        report.into_result()?;

        let commit = self.backend.commit(&format!(
            "[trackflow] round {}: merge {} with {} resolved conflict(s)",
            round_number,
            track.id,
            resolutions.len()
        ))?;
        log::info!(
            "[MergeRoundEngine] Round {}: merged {} at {} after resolving conflicts",
            round_number,
            track.id,
            commit
        );
        round.merged.insert(track.id.clone(), commit);
        Ok(())
    }

    async fn test_round(&self, round: &mut MergeRound) -> EngineResult<()> {
        let suite = self.manifest.test_suite();
        let report = self
            .gates
            .run(
                &format!("round {}", round.round_number),
                &suite,
                &self.backend.workdir(),
            )
            .await;

        if report.passed() {
            round.test_result = TestResult::Pass;
            log::info!(
                "[MergeRoundEngine] Round {}: test suite passed ({} gate(s))",
                round.round_number,
                suite.len()
            );
        } else {
            round.test_result = TestResult::Fail;
            round.test_output = report.first_failure().map(|f| f.output.clone());
        }

        report.into_result().map(|_| ())
    }
}
