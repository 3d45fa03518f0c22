//! Quality Gate Pipeline
//!
//! Gates are opaque commands judged by exit code. A pipeline runs them in
//! declared order and stops at the first failure.

use serde::{Deserialize, Serialize};
use std::future::Future;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Instant;

use crate::error::{EngineError, EngineResult};
use crate::events::{EngineEvent, EventSink, GateFinishedPayload};
use crate::models::GateSpec;
use crate::utils::clip_output;

/// Lines of gate output kept in reports
const GATE_OUTPUT_LINES: usize = 200;

/// Raw result of running one gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateRun {
    /// `None` when the process could not be started or was killed by a signal
    pub exit_code: Option<i32>,
    pub output: String,
}

impl GateRun {
    pub fn passed(&self) -> bool {
        self.exit_code == Some(0)
    }
}

pub type GateFuture<'a> = Pin<Box<dyn Future<Output = GateRun> + Send + 'a>>;

/// Executes a single gate in a working directory
pub trait GateRunner: Send + Sync {
    fn run<'a>(&'a self, gate: &'a GateSpec, cwd: &'a Path) -> GateFuture<'a>;
}

/// Runs the gate command through the platform shell
#[derive(Debug, Clone, Default)]
pub struct CommandGateRunner;

impl GateRunner for CommandGateRunner {
    fn run<'a>(&'a self, gate: &'a GateSpec, cwd: &'a Path) -> GateFuture<'a> {
        Box::pin(async move {
            let mut cmd = if cfg!(windows) {
                let mut cmd = tokio::process::Command::new("cmd");
                cmd.args(["/C", gate.command()]);
                cmd
            } else {
                let mut cmd = tokio::process::Command::new("sh");
                cmd.args(["-c", gate.command()]);
                cmd
            };
            cmd.current_dir(cwd).kill_on_drop(true);

            match cmd.output().await {
                Ok(result) => {
                    let mut output = String::from_utf8_lossy(&result.stdout).to_string();
                    output.push_str(&String::from_utf8_lossy(&result.stderr));
                    GateRun {
                        exit_code: result.status.code(),
                        output: clip_output(&output, GATE_OUTPUT_LINES),
                    }
                }
                Err(e) => GateRun {
                    exit_code: None,
                    output: format!("Failed to spawn '{}': {}", gate.command(), e),
                },
            }
        })
    }
}

/// Result of one gate within a pipeline run
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateResult {
    pub name: String,
    pub kind: String,
    /// Position in the declared gate list
    pub index: usize,
    pub passed: bool,
    pub exit_code: Option<i32>,
    pub output: String,
    pub duration_ms: u64,
}

/// Outcome of a pipeline run; results stop at the first failing gate
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateReport {
    /// What the gates were run for, e.g. "round 2" or "final"
    pub context: String,
    pub results: Vec<GateResult>,
}

impl GateReport {
    pub fn passed(&self) -> bool {
        self.results.iter().all(|r| r.passed)
    }

    pub fn first_failure(&self) -> Option<&GateResult> {
        self.results.iter().find(|r| !r.passed)
    }

    /// `Err(GateFailure)` naming the first failing gate
    pub fn into_result(self) -> EngineResult<GateReport> {
        match self.first_failure() {
            Some(failed) => Err(EngineError::GateFailure {
                context: self.context.clone(),
                gate: failed.name.clone(),
                index: failed.index,
                exit_code: failed.exit_code,
                output: failed.output.clone(),
            }),
            None => Ok(self),
        }
    }
}

#[derive(Clone)]
pub struct QualityGatePipeline {
    runner: Arc<dyn GateRunner>,
    events: EventSink,
}

impl QualityGatePipeline {
    pub fn new(runner: Arc<dyn GateRunner>, events: EventSink) -> Self {
        Self { runner, events }
    }

    /// Run `gates` in order in `cwd`, stopping at the first failure.
    /// An empty list passes.
    pub async fn run(&self, context: &str, gates: &[GateSpec], cwd: &Path) -> GateReport {
        let mut results = Vec::with_capacity(gates.len());

        for (index, gate) in gates.iter().enumerate() {
            log::info!(
                "[QualityGates] {}: running {} gate '{}'",
                context,
                gate.kind(),
                gate.name()
            );

            let started = Instant::now();
            let run = self.runner.run(gate, cwd).await;
            let duration_ms = started.elapsed().as_millis() as u64;
            let passed = run.passed();

            self.events
                .emit(EngineEvent::GateFinished(GateFinishedPayload {
                    context: context.to_string(),
                    gate: gate.name().to_string(),
                    index,
                    passed,
                    exit_code: run.exit_code,
                    duration_ms,
                }));

            results.push(GateResult {
                name: gate.name().to_string(),
                kind: gate.kind().to_string(),
                index,
                passed,
                exit_code: run.exit_code,
                output: run.output,
                duration_ms,
            });

            if !passed {
                log::warn!(
                    "[QualityGates] {}: gate '{}' failed (exit code {:?})",
                    context,
                    gate.name(),
                    run.exit_code
                );
                break;
            }
        }

        GateReport {
            context: context.to_string(),
            results,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Exit codes keyed by gate name; unknown gates pass
    #[derive(Default)]
    struct FakeRunner {
        codes: HashMap<String, i32>,
        ran: Mutex<Vec<String>>,
    }

    impl GateRunner for FakeRunner {
        fn run<'a>(&'a self, gate: &'a GateSpec, _cwd: &'a Path) -> GateFuture<'a> {
            Box::pin(async move {
                self.ran.lock().unwrap().push(gate.name().to_string());
                let code = self.codes.get(gate.name()).copied().unwrap_or(0);
                GateRun {
                    exit_code: Some(code),
                    output: format!("{} output", gate.name()),
                }
            })
        }
    }

    fn custom(name: &str, command: &str) -> GateSpec {
        GateSpec::CustomCommand {
            name: name.to_string(),
            command: command.to_string(),
        }
    }

    #[tokio::test]
    async fn test_fail_fast_reports_first_failure() {
        let runner = Arc::new(FakeRunner {
            codes: HashMap::from([("lint".to_string(), 2), ("audit".to_string(), 1)]),
            ..Default::default()
        });
        let pipeline = QualityGatePipeline::new(runner.clone(), EventSink::disabled());
        let gates = vec![
            custom("build", "true"),
            custom("lint", "false"),
            custom("audit", "false"),
        ];

        let report = pipeline.run("final", &gates, Path::new(".")).await;
        assert!(!report.passed());
        assert_eq!(report.results.len(), 2);
        assert_eq!(*runner.ran.lock().unwrap(), vec!["build", "lint"]);

        match report.into_result().unwrap_err() {
            EngineError::GateFailure {
                gate,
                index,
                exit_code,
                output,
                ..
            } => {
                assert_eq!(gate, "lint");
                assert_eq!(index, 1);
                assert_eq!(exit_code, Some(2));
                assert_eq!(output, "lint output");
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_empty_pipeline_passes() {
        let pipeline =
            QualityGatePipeline::new(Arc::new(FakeRunner::default()), EventSink::disabled());
        let report = pipeline.run("round 1", &[], Path::new(".")).await;
        assert!(report.passed());
        assert!(report.into_result().is_ok());
    }

    #[tokio::test]
    async fn test_gate_events_emitted() {
        let (events, mut rx) = EventSink::channel();
        let pipeline = QualityGatePipeline::new(Arc::new(FakeRunner::default()), events);
        pipeline
            .run("round 1", &[custom("build", "true")], Path::new("."))
            .await;

        match rx.try_recv().unwrap() {
            EngineEvent::GateFinished(payload) => {
                assert_eq!(payload.gate, "build");
                assert!(payload.passed);
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_command_runner_captures_output_and_exit_code() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "present").unwrap();
        let runner = CommandGateRunner;

        let ok = runner
            .run(&custom("cat", "cat marker.txt"), dir.path())
            .await;
        assert!(ok.passed());
        assert_eq!(ok.output, "present");

        let failed = runner
            .run(&custom("fail", "echo nope >&2; exit 4"), dir.path())
            .await;
        assert_eq!(failed.exit_code, Some(4));
        assert!(failed.output.contains("nope"));
    }
}
