//! End-to-end orchestration
//!
//! A run executes the tracks round by round, merges the rounds in order and
//! finishes with the manifest's quality gates. Every piece of state lives in
//! the stores under `.trackflow/`, so any step can be repeated after a crash.

mod report;

pub use report::{Plan, RunReport, RunStatus, StatusReport, TrackSummary};

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;
use std::sync::Arc;

use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::events::EventSink;
use crate::file_storage::{init_state_dir, AuditTrail, CheckpointStore, MarkerStore};
use crate::gates::{CommandGateRunner, GateReport, GateRunner, QualityGatePipeline};
use crate::git::GitManager;
use crate::manifest;
use crate::merge::{
    FileSynthesisPolicy, GitMergeBackend, MergeBackend, MergeRoundEngine, SynthesisPolicy,
};
use crate::models::{CompletionStatus, Manifest, TrackId};
use crate::runner::{
    CommandUnitExecutor, DirectoryWorkspaces, TrackOutcome, TrackRunner, UnitExecutor,
    WorkspaceProvider, WorktreePool,
};
use crate::scheduler;
use crate::shutdown::ShutdownState;

/// What happened while executing the tracks of a manifest
#[derive(Debug, Default)]
pub struct ExecutionOutcome {
    /// Tracks that did not complete in this invocation, with the cause
    pub failures: BTreeMap<TrackId, EngineError>,
    /// Set when a shutdown request stopped execution
    pub aborted: Option<EngineError>,
}

pub struct PipelineBuilder {
    manifest: Manifest,
    config: EngineConfig,
    shutdown: ShutdownState,
    events: EventSink,
    executor: Option<Arc<dyn UnitExecutor>>,
    workspaces: Option<Arc<dyn WorkspaceProvider>>,
    backend: Option<Arc<dyn MergeBackend>>,
    policy: Option<Arc<dyn SynthesisPolicy>>,
    gate_runner: Option<Arc<dyn GateRunner>>,
}

impl PipelineBuilder {
    pub fn shutdown(mut self, shutdown: ShutdownState) -> Self {
        self.shutdown = shutdown;
        self
    }

    pub fn events(mut self, events: EventSink) -> Self {
        self.events = events;
        self
    }

    pub fn executor(mut self, executor: Arc<dyn UnitExecutor>) -> Self {
        self.executor = Some(executor);
        self
    }

    pub fn workspaces(mut self, workspaces: Arc<dyn WorkspaceProvider>) -> Self {
        self.workspaces = Some(workspaces);
        self
    }

    pub fn merge_backend(mut self, backend: Arc<dyn MergeBackend>) -> Self {
        self.backend = Some(backend);
        self
    }

    pub fn synthesis_policy(mut self, policy: Arc<dyn SynthesisPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn gate_runner(mut self, runner: Arc<dyn GateRunner>) -> Self {
        self.gate_runner = Some(runner);
        self
    }

    /// Validate the manifest and fill every unset collaborator.
    ///
    /// A workspace root that is a git repository gets worktrees and a git
    /// merge backend; anything else gets plain directories and no backend.
    pub fn build(self) -> EngineResult<Pipeline> {
        manifest::validate(&self.manifest)?;

        let mut manifest = self.manifest;
        let root = manifest.workspace_root.clone();
        let git = GitManager::new(&root).ok();

        let target_branch = manifest
            .target_branch
            .clone()
            .or_else(|| self.config.git.target_branch.clone())
            .or_else(|| git.as_ref().map(|g| g.get_default_branch_name()))
            .unwrap_or_else(|| "main".to_string());
        manifest.target_branch = Some(target_branch.clone());
        let is_git = git.is_some();
        drop(git);

        let workspaces = self.workspaces.unwrap_or_else(|| {
            if is_git {
                Arc::new(WorktreePool::new(&root, &manifest.feature_id, &target_branch))
            } else {
                log::info!(
                    "[Pipeline] {:?} is not a git repository; using plain workspace directories",
                    root
                );
                Arc::new(DirectoryWorkspaces::new(&root))
            }
        });

        let executor = self.executor.unwrap_or_else(|| {
            Arc::new(CommandUnitExecutor::new(
                &self.config.git.author_name,
                &self.config.git.author_email,
            ))
        });

        let backend = self.backend.or_else(|| {
            is_git.then(|| {
                Arc::new(GitMergeBackend::new(
                    &root,
                    &target_branch,
                    &self.config.git.author_name,
                    &self.config.git.author_email,
                )) as Arc<dyn MergeBackend>
            })
        });

        let policy = self
            .policy
            .unwrap_or_else(|| Arc::new(FileSynthesisPolicy::new(&root)));
        let gate_runner = self
            .gate_runner
            .unwrap_or_else(|| Arc::new(CommandGateRunner));

        let manifest = Arc::new(manifest);
        let runner = TrackRunner::new(
            manifest.clone(),
            &self.config,
            executor,
            workspaces,
            self.shutdown.clone(),
            self.events.clone(),
        );

        Ok(Pipeline {
            manifest,
            config: self.config,
            target_branch,
            runner,
            backend,
            policy,
            gates: QualityGatePipeline::new(gate_runner, self.events.clone()),
            shutdown: self.shutdown,
            events: self.events,
        })
    }
}

pub struct Pipeline {
    manifest: Arc<Manifest>,
    config: EngineConfig,
    target_branch: String,
    runner: TrackRunner,
    backend: Option<Arc<dyn MergeBackend>>,
    policy: Arc<dyn SynthesisPolicy>,
    gates: QualityGatePipeline,
    shutdown: ShutdownState,
    events: EventSink,
}

impl Pipeline {
    pub fn builder(manifest: Manifest, config: EngineConfig) -> PipelineBuilder {
        PipelineBuilder {
            manifest,
            config,
            shutdown: ShutdownState::new(),
            events: EventSink::disabled(),
            executor: None,
            workspaces: None,
            backend: None,
            policy: None,
            gate_runner: None,
        }
    }

    pub fn manifest(&self) -> &Manifest {
        &self.manifest
    }

    pub fn target_branch(&self) -> &str {
        &self.target_branch
    }

    pub fn plan(&self) -> EngineResult<Plan> {
        let rounds = scheduler::order(&self.manifest)?
            .iter()
            .map(|round| round.iter().map(|t| t.id.clone()).collect())
            .collect();
        Ok(Plan {
            feature_id: self.manifest.feature_id.clone(),
            target_branch: self.target_branch.clone(),
            rounds,
        })
    }

    /// Run (or resume) a single track. Dependencies are waited for through
    /// the completion markers, so separate processes can each run one track.
    pub async fn execute_track(&self, track_id: &str) -> EngineResult<TrackOutcome> {
        self.prepare()?;
        self.runner.run(track_id).await
    }

    /// Run every track. Rounds run one after another and the tracks of a
    /// round run concurrently; a failing track never stops its siblings.
    pub async fn execute(&self) -> EngineResult<ExecutionOutcome> {
        self.prepare()?;
        let rounds = scheduler::order(&self.manifest)?;
        let mut outcome = ExecutionOutcome::default();

        for (index, tracks) in rounds.iter().enumerate() {
            if self.shutdown.is_shutdown_requested() {
                outcome.aborted = Some(EngineError::Aborted(format!(
                    "execution stopped before round {}",
                    index + 1
                )));
                return Ok(outcome);
            }

            log::info!(
                "[Pipeline] Executing round {} ({} track(s))",
                index + 1,
                tracks.len()
            );

            let handles: Vec<_> = tracks
                .iter()
                .map(|track| {
                    let runner = self.runner.clone();
                    let track_id = track.id.clone();
                    let handle = tokio::spawn(async move { runner.run(&track_id).await });
                    (track.id.clone(), handle)
                })
                .collect();

            for (track_id, handle) in handles {
                match handle.await {
                    Ok(Ok(result)) => {
                        if let Some(error) = result.error {
                            log::warn!("[Pipeline] {}", error);
                            outcome.failures.insert(track_id, error);
                        }
                    }
                    Ok(Err(error @ EngineError::Aborted(_))) => {
                        log::warn!("[Pipeline] Track '{}' aborted", track_id);
                        outcome.aborted = Some(error);
                    }
                    Ok(Err(error)) => {
                        log::error!("[Pipeline] {}", error);
                        outcome.failures.insert(track_id, error);
                    }
                    Err(join_error) => {
                        log::error!("[Pipeline] Track '{}' task died: {}", track_id, join_error);
                        let error = EngineError::TrackFailed {
                            track_id: track_id.clone(),
                            reason: format!("runner task died: {}", join_error),
                        };
                        outcome.failures.insert(track_id, error);
                    }
                }
            }

            if outcome.aborted.is_some() {
                return Ok(outcome);
            }
        }

        Ok(outcome)
    }

    /// Merge whatever has completed so far, then run the final gates
    pub async fn merge(&self) -> EngineResult<RunReport> {
        self.prepare()?;
        self.clean_target()?;
        let started_at = Utc::now();
        self.finish(started_at, ExecutionOutcome::default()).await
    }

    /// Execute, merge and verify the whole manifest
    pub async fn run(&self) -> EngineResult<RunReport> {
        self.prepare()?;
        self.clean_target()?;
        let started_at = Utc::now();
        let execution = self.execute().await?;
        self.finish(started_at, execution).await
    }

    /// Run the manifest's quality gates against the workspace root as it is
    pub async fn gates(&self) -> GateReport {
        let cwd = match &self.backend {
            Some(backend) => backend.workdir(),
            None => self.manifest.workspace_root.clone(),
        };
        self.gates.run("final", &self.manifest.quality_gates, &cwd).await
    }

    pub fn status(&self) -> EngineResult<StatusReport> {
        let root = &self.manifest.workspace_root;
        let latest_run_id = AuditTrail::latest_run_id(root);
        let (latest_rounds, latest_report) = match &latest_run_id {
            Some(run_id) => {
                let audit = AuditTrail::open(root, run_id)?;
                (audit.rounds()?, audit.read_report::<RunReport>()?)
            }
            None => (Vec::new(), None),
        };

        Ok(StatusReport {
            feature_id: self.manifest.feature_id.clone(),
            tracks: self.summaries(&BTreeMap::new())?,
            latest_run_id,
            latest_rounds,
            latest_report,
        })
    }

    /// Remove every track workspace; branches stay
    pub fn release_workspaces(&self) -> EngineResult<()> {
        let workspaces = self.runner.workspaces();
        for track in &self.manifest.tracks {
            workspaces.release(track)?;
        }
        Ok(())
    }

    fn prepare(&self) -> EngineResult<()> {
        init_state_dir(&self.manifest.workspace_root)?;
        Ok(())
    }

    fn backend(&self) -> EngineResult<&Arc<dyn MergeBackend>> {
        self.backend.as_ref().ok_or_else(|| {
            EngineError::Config(format!(
                "{:?} is not a git repository; merging needs one",
                self.manifest.workspace_root
            ))
        })
    }

    /// Merging must not mix with uncommitted work in the target checkout
    fn clean_target(&self) -> EngineResult<()> {
        let files = self.backend()?.uncommitted_changes()?;
        if files.is_empty() {
            return Ok(());
        }
        Err(EngineError::DirtyTarget {
            branch: self.target_branch.clone(),
            files,
        })
    }

    async fn finish(
        &self,
        started_at: DateTime<Utc>,
        execution: ExecutionOutcome,
    ) -> EngineResult<RunReport> {
        let backend = self.backend()?.clone();
        let audit = AuditTrail::start(&self.manifest.workspace_root)?;

        let mut rounds = Vec::new();
        let mut final_gates = None;
        let mut failure = execution.aborted;

        if failure.is_none() {
            let engine = MergeRoundEngine::new(
                self.manifest.clone(),
                &self.config,
                backend.clone(),
                self.policy.clone(),
                self.gates.clone(),
                audit.clone(),
                self.shutdown.clone(),
                self.events.clone(),
            )?;
            let merged = engine.run().await?;
            rounds = merged.rounds;
            failure = merged.error;
        }

        if failure.is_none() {
            let report = self
                .gates
                .run("final", &self.manifest.quality_gates, &backend.workdir())
                .await;
            final_gates = Some(report.clone());
            if let Err(error) = report.into_result() {
                failure = Some(error);
            }
        }

        let errors: BTreeMap<TrackId, String> = execution
            .failures
            .iter()
            .map(|(id, e)| (id.clone(), e.to_string()))
            .collect();
        let tracks = self.summaries(&errors)?;

        let (status, exit_code, error) = match failure {
            Some(error @ EngineError::Aborted(_)) => {
                (RunStatus::Aborted, error.exit_code(), Some(error.to_string()))
            }
            Some(error) => (RunStatus::Failed, error.exit_code(), Some(error.to_string())),
            None => match self.unfinished(&tracks, &execution.failures) {
                Some((exit_code, reason)) => (RunStatus::Incomplete, exit_code, Some(reason)),
                None => (RunStatus::Complete, 0, None),
            },
        };

        let report = RunReport {
            run_id: audit.run_id().to_string(),
            feature_id: self.manifest.feature_id.clone(),
            status,
            tracks,
            rounds,
            final_gates,
            final_commit_ref: backend.head()?,
            error,
            exit_code,
            started_at,
            finished_at: Utc::now(),
        };
        audit.record_report(&report)?;

        log::info!(
            "[Pipeline] Run {} finished: {:?} (exit code {})",
            report.run_id,
            report.status,
            report.exit_code
        );
        Ok(report)
    }

    /// Exit code and reason when some tracks did not complete. The code is
    /// that of the first unfinished track's failure, in manifest order.
    fn unfinished(
        &self,
        tracks: &[TrackSummary],
        failures: &BTreeMap<TrackId, EngineError>,
    ) -> Option<(i32, String)> {
        let unfinished: Vec<&str> = tracks
            .iter()
            .filter(|t| t.status != Some(CompletionStatus::Complete))
            .map(|t| t.track_id.as_str())
            .collect();
        let first = *unfinished.first()?;

        let reason = format!(
            "{} of {} track(s) did not complete: {}",
            unfinished.len(),
            tracks.len(),
            unfinished.join(", ")
        );
        let exit_code = failures
            .get(first)
            .map(|e| e.exit_code())
            .unwrap_or_else(|| {
                EngineError::TrackFailed {
                    track_id: first.to_string(),
                    reason: reason.clone(),
                }
                .exit_code()
            });
        Some((exit_code, reason))
    }

    fn summaries(&self, errors: &BTreeMap<TrackId, String>) -> EngineResult<Vec<TrackSummary>> {
        let root = &self.manifest.workspace_root;
        let markers = MarkerStore::new(root);
        let checkpoints = CheckpointStore::new(root);
        let rounds = scheduler::round_index(&self.manifest)?;

        self.manifest
            .tracks
            .iter()
            .map(|track| {
                let marker = markers.read(&track.id)?;
                let units_completed = match &marker {
                    Some(marker) => marker.units_completed,
                    None => checkpoints.completed_units(&track.id)?,
                };
                Ok(TrackSummary {
                    track_id: track.id.clone(),
                    round: rounds.get(&track.id).map_or(0, |r| r + 1),
                    status: marker.as_ref().map(|m| m.status),
                    units_completed,
                    unit_count: track.unit_count(),
                    final_commit_ref: marker.as_ref().and_then(|m| m.final_commit_ref.clone()),
                    error: marker
                        .as_ref()
                        .and_then(|m| m.reason.clone())
                        .or_else(|| errors.get(&track.id).cloned()),
                })
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{GateWaitConfig, RetryConfig};
    use crate::gates::{GateFuture, GateRun};
    use crate::git::ConflictInfo;
    use crate::merge::{BackendMerge, ResolvedContent};
    use crate::models::{GateSpec, MergeStrategy, Track, Unit};
    use crate::runner::{UnitContext, UnitOutcome};
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Fails every unit whose command is `fail`
    struct ScriptExecutor;

    impl UnitExecutor for ScriptExecutor {
        fn execute(&self, ctx: &UnitContext) -> Result<UnitOutcome, String> {
            if ctx.unit.command.as_deref() == Some("fail") {
                return Err(format!("{} broke", ctx.unit.id));
            }
            Ok(UnitOutcome {
                commit_ref: Some(format!("{}-{}", ctx.track_id, ctx.ordinal)),
                output: String::new(),
            })
        }
    }

    /// Merges everything cleanly and remembers the order
    struct CleanBackend {
        dir: PathBuf,
        merged: Mutex<Vec<String>>,
    }

    impl MergeBackend for CleanBackend {
        fn merge(&self, branch: &str) -> EngineResult<BackendMerge> {
            let mut merged = self.merged.lock().unwrap();
            merged.push(branch.to_string());
            Ok(BackendMerge::Merged {
                commit: format!("merge-{}", merged.len()),
                fast_forward: false,
            })
        }

        fn conflicts(&self) -> EngineResult<Vec<ConflictInfo>> {
            Ok(vec![])
        }

        fn stage(&self, _path: &str, _content: &ResolvedContent) -> EngineResult<()> {
            Ok(())
        }

        fn commit(&self, _message: &str) -> EngineResult<String> {
            Ok("commit".to_string())
        }

        fn abort(&self) -> EngineResult<()> {
            Ok(())
        }

        fn workdir(&self) -> PathBuf {
            self.dir.clone()
        }

        fn head(&self) -> EngineResult<Option<String>> {
            Ok(self
                .merged
                .lock()
                .unwrap()
                .last()
                .map(|b| format!("tip-{}", b)))
        }
    }

    /// Gates named in `failing` exit with 1
    struct NamedGates {
        failing: Vec<String>,
    }

    impl GateRunner for NamedGates {
        fn run<'a>(&'a self, gate: &'a GateSpec, _cwd: &'a Path) -> GateFuture<'a> {
            Box::pin(async move {
                let failed = self.failing.iter().any(|f| f == gate.name());
                GateRun {
                    exit_code: Some(if failed { 1 } else { 0 }),
                    output: String::new(),
                }
            })
        }
    }

    fn track(id: &str, deps: &[&str], commands: &[&str]) -> Track {
        Track {
            id: id.to_string(),
            name: id.to_string(),
            isolation_ref: format!("ws-{}", id),
            depends_on: deps.iter().map(|d| d.to_string()).collect(),
            branch: None,
            units_of_work: commands
                .iter()
                .enumerate()
                .map(|(i, c)| Unit {
                    id: format!("u{}", i + 1),
                    description: String::new(),
                    command: Some(c.to_string()),
                })
                .collect(),
            post_merge_checks: vec![],
        }
    }

    /// a -> {b, c} -> d
    fn diamond(dir: &TempDir, c_commands: &[&str], gates: Vec<GateSpec>) -> Manifest {
        Manifest {
            feature_id: "diamond".to_string(),
            tracks: vec![
                track("a", &[], &["true", "true"]),
                track("b", &["a"], &["true"]),
                track("c", &["a"], c_commands),
                track("d", &["b", "c"], &["true"]),
            ],
            merge_strategy: MergeStrategy::ManifestOrder,
            quality_gates: gates,
            workspace_root: dir.path().to_path_buf(),
            target_branch: Some("main".to_string()),
        }
    }

    fn test_config() -> EngineConfig {
        EngineConfig {
            retry: RetryConfig {
                max_attempts: 2,
                initial_delay_ms: 1,
                max_delay_ms: 1,
                backoff_multiplier: 1.0,
            },
            gate: GateWaitConfig {
                poll_interval_ms: 1,
                max_attempts: 3,
                backoff_multiplier: 1.0,
                max_interval_ms: 1,
            },
            ..Default::default()
        }
    }

    fn pipeline(
        dir: &TempDir,
        manifest: Manifest,
        failing_gates: &[&str],
    ) -> (Pipeline, Arc<CleanBackend>) {
        let backend = Arc::new(CleanBackend {
            dir: dir.path().to_path_buf(),
            merged: Mutex::new(vec![]),
        });
        let pipeline = Pipeline::builder(manifest, test_config())
            .executor(Arc::new(ScriptExecutor))
            .merge_backend(backend.clone())
            .gate_runner(Arc::new(NamedGates {
                failing: failing_gates.iter().map(|g| g.to_string()).collect(),
            }))
            .build()
            .unwrap();
        (pipeline, backend)
    }

    fn custom(name: &str) -> GateSpec {
        GateSpec::CustomCommand {
            name: name.to_string(),
            command: "true".to_string(),
        }
    }

    #[test]
    fn test_plan_orders_diamond() {
        let dir = TempDir::new().unwrap();
        let (pipeline, _) = pipeline(&dir, diamond(&dir, &["true"], vec![]), &[]);

        let plan = pipeline.plan().unwrap();
        assert_eq!(plan.target_branch, "main");
        assert_eq!(
            plan.rounds,
            vec![
                vec!["a".to_string()],
                vec!["b".to_string(), "c".to_string()],
                vec!["d".to_string()],
            ]
        );
    }

    #[tokio::test]
    async fn test_run_completes_and_records_report() {
        let dir = TempDir::new().unwrap();
        let (pipeline, backend) = pipeline(
            &dir,
            diamond(&dir, &["true", "true"], vec![custom("build")]),
            &[],
        );

        let report = pipeline.run().await.unwrap();
        assert_eq!(report.status, RunStatus::Complete);
        assert!(report.is_success());
        assert_eq!(report.rounds.len(), 3);
        assert!(report.final_gates.as_ref().unwrap().passed());
        assert_eq!(
            *backend.merged.lock().unwrap(),
            vec![
                "trackflow/diamond/a",
                "trackflow/diamond/b",
                "trackflow/diamond/c",
                "trackflow/diamond/d",
            ]
        );
        assert_eq!(
            report.final_commit_ref.as_deref(),
            Some("tip-trackflow/diamond/d")
        );

        let c = report.tracks.iter().find(|t| t.track_id == "c").unwrap();
        assert_eq!(c.round, 2);
        assert_eq!(c.units_completed, 2);
        assert_eq!(c.final_commit_ref.as_deref(), Some("c-2"));

        let audit = AuditTrail::open(dir.path(), &report.run_id).unwrap();
        let stored: RunReport = audit.read_report().unwrap().unwrap();
        assert_eq!(stored, report);
    }

    #[tokio::test]
    async fn test_failed_track_leaves_run_incomplete() {
        let dir = TempDir::new().unwrap();
        let (pipeline, backend) = pipeline(&dir, diamond(&dir, &["true", "fail"], vec![]), &[]);

        let report = pipeline.run().await.unwrap();
        assert_eq!(report.status, RunStatus::Incomplete);
        // First unfinished track in manifest order is c, a unit failure
        assert_eq!(report.exit_code, 6);
        assert_eq!(
            *backend.merged.lock().unwrap(),
            vec!["trackflow/diamond/a", "trackflow/diamond/b"]
        );

        let c = report.tracks.iter().find(|t| t.track_id == "c").unwrap();
        assert_eq!(c.status, Some(CompletionStatus::Failed));
        assert_eq!(c.units_completed, 1);
        let d = report.tracks.iter().find(|t| t.track_id == "d").unwrap();
        assert_eq!(d.status, Some(CompletionStatus::Failed));
        assert!(d.error.as_deref().unwrap().contains("'c'"));
    }

    #[tokio::test]
    async fn test_final_gate_failure_fails_run() {
        let dir = TempDir::new().unwrap();
        let (pipeline, _) = pipeline(
            &dir,
            diamond(&dir, &["true"], vec![custom("build"), custom("lint")]),
            &["lint"],
        );

        let report = pipeline.run().await.unwrap();
        assert_eq!(report.status, RunStatus::Failed);
        assert_eq!(report.exit_code, 21);
        assert_eq!(report.rounds.len(), 3);
        assert!(report.error.unwrap().contains("lint"));
    }

    #[tokio::test]
    async fn test_shutdown_aborts_before_any_work() {
        let dir = TempDir::new().unwrap();
        let shutdown = ShutdownState::new();
        shutdown.request_shutdown();
        let backend = Arc::new(CleanBackend {
            dir: dir.path().to_path_buf(),
            merged: Mutex::new(vec![]),
        });
        let pipeline = Pipeline::builder(diamond(&dir, &["true"], vec![]), test_config())
            .executor(Arc::new(ScriptExecutor))
            .merge_backend(backend.clone())
            .shutdown(shutdown)
            .build()
            .unwrap();

        let report = pipeline.run().await.unwrap();
        assert_eq!(report.status, RunStatus::Aborted);
        assert_eq!(report.exit_code, 10);
        assert!(report.rounds.is_empty());
        assert!(backend.merged.lock().unwrap().is_empty());
        assert!(report.tracks.iter().all(|t| t.status.is_none()));
    }

    #[tokio::test]
    async fn test_merge_needs_git() {
        let dir = TempDir::new().unwrap();
        let pipeline = Pipeline::builder(diamond(&dir, &["true"], vec![]), test_config())
            .executor(Arc::new(ScriptExecutor))
            .build()
            .unwrap();

        assert!(matches!(
            pipeline.run().await.unwrap_err(),
            EngineError::Config(_)
        ));
        // Tracks can still be executed without a repository
        let outcome = pipeline.execute().await.unwrap();
        assert!(outcome.failures.is_empty());
        assert!(outcome.aborted.is_none());
    }

    #[tokio::test]
    async fn test_status_after_run() {
        let dir = TempDir::new().unwrap();
        let (pipeline, _) = pipeline(&dir, diamond(&dir, &["true"], vec![]), &[]);

        let before = pipeline.status().unwrap();
        assert!(before.latest_run_id.is_none());
        assert!(before.tracks.iter().all(|t| t.status.is_none()));

        let report = pipeline.run().await.unwrap();
        let after = pipeline.status().unwrap();
        assert_eq!(after.latest_run_id.as_deref(), Some(report.run_id.as_str()));
        assert_eq!(after.latest_rounds.len(), 3);
        assert_eq!(after.latest_report, Some(report));
        assert!(after
            .tracks
            .iter()
            .all(|t| t.status == Some(CompletionStatus::Complete)));
    }

    #[tokio::test]
    async fn test_release_workspaces() {
        let dir = TempDir::new().unwrap();
        let (pipeline, _) = pipeline(&dir, diamond(&dir, &["true"], vec![]), &[]);
        pipeline.execute().await.unwrap();

        let ws_a = crate::utils::worktrees_dir(dir.path()).join("ws-a");
        assert!(ws_a.is_dir());
        pipeline.release_workspaces().unwrap();
        assert!(!ws_a.exists());
    }
}
