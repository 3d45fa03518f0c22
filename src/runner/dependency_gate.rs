//! Dependency Gate
//!
//! A track may start only after every track it depends on has a `complete`
//! marker. The gate reads markers only, never checkpoints, so partial
//! upstream progress can never release a dependent.

use crate::config::GateWaitConfig;
use crate::error::{EngineError, EngineResult};
use crate::file_storage::MarkerStore;
use crate::models::{CompletionStatus, Track, TrackId};
use crate::shutdown::ShutdownState;

/// Snapshot of a track's dependencies at one poll
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateCheck {
    /// Every dependency has a complete marker
    Ready,
    /// A dependency has a failed marker; the track can never start
    UpstreamFailed(TrackId),
    /// Dependencies without any marker yet, in sorted order
    Waiting(Vec<TrackId>),
}

/// Returned when the gate opens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GateOpened {
    /// Number of polls it took (1 when the dependencies were already met)
    pub polls: u32,
}

#[derive(Debug, Clone)]
pub struct DependencyGate {
    markers: MarkerStore,
    policy: GateWaitConfig,
    shutdown: ShutdownState,
}

impl DependencyGate {
    pub fn new(markers: MarkerStore, policy: GateWaitConfig, shutdown: ShutdownState) -> Self {
        Self {
            markers,
            policy,
            shutdown,
        }
    }

    /// Inspect the markers of `track`'s dependencies once.
    ///
    /// A failed dependency wins over missing ones.
    pub fn check(&self, track: &Track) -> EngineResult<GateCheck> {
        let mut waiting = Vec::new();

        // depends_on is a BTreeSet, so the first failure reported is stable
        for dep in &track.depends_on {
            match self.markers.status(dep)? {
                Some(CompletionStatus::Complete) => {}
                Some(CompletionStatus::Failed) => {
                    return Ok(GateCheck::UpstreamFailed(dep.clone()));
                }
                None => waiting.push(dep.clone()),
            }
        }

        if waiting.is_empty() {
            Ok(GateCheck::Ready)
        } else {
            Ok(GateCheck::Waiting(waiting))
        }
    }

    /// Block until the track's dependencies are met.
    ///
    /// Errors with `UpstreamFailed` as soon as a failed dependency marker is
    /// seen, `DependenciesNotMet` once the poll budget is spent and `Aborted`
    /// when shutdown is requested while waiting.
    pub async fn wait_for(&self, track: &Track) -> EngineResult<GateOpened> {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0u32;

        loop {
            attempt += 1;

            match self.check(track)? {
                GateCheck::Ready => {
                    if attempt > 1 {
                        log::info!(
                            "[DependencyGate] {} released after {} poll(s)",
                            track.id,
                            attempt
                        );
                    }
                    return Ok(GateOpened { polls: attempt });
                }
                GateCheck::UpstreamFailed(failed) => {
                    log::warn!(
                        "[DependencyGate] {} blocked: upstream '{}' failed",
                        track.id,
                        failed
                    );
                    return Err(EngineError::UpstreamFailed {
                        track_id: track.id.clone(),
                        failed_track_id: failed,
                    });
                }
                GateCheck::Waiting(missing) => {
                    if attempt >= max_attempts {
                        return Err(EngineError::DependenciesNotMet {
                            track_id: track.id.clone(),
                            missing,
                            attempts: attempt,
                        });
                    }

                    let interval = self.policy.interval_after(attempt);
                    log::debug!(
                        "[DependencyGate] {} waiting on {:?}, next poll in {:?}",
                        track.id,
                        missing,
                        interval
                    );

                    if !self.shutdown.sleep_unless_shutdown(interval).await {
                        return Err(EngineError::Aborted(format!(
                            "shutdown while '{}' waited on dependencies",
                            track.id
                        )));
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::CompletionMarker;
    use std::collections::BTreeSet;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn track(id: &str, deps: &[&str]) -> Track {
        Track {
            id: id.to_string(),
            name: id.to_string(),
            isolation_ref: format!("ws-{}", id),
            depends_on: deps.iter().map(|d| d.to_string()).collect::<BTreeSet<_>>(),
            branch: None,
            units_of_work: vec![],
            post_merge_checks: vec![],
        }
    }

    fn policy(max_attempts: u32, poll_interval_ms: u64) -> GateWaitConfig {
        GateWaitConfig {
            poll_interval_ms,
            max_attempts,
            backoff_multiplier: 1.0,
            max_interval_ms: poll_interval_ms,
        }
    }

    fn gate(dir: &TempDir, policy: GateWaitConfig) -> (DependencyGate, MarkerStore) {
        let markers = MarkerStore::new(dir.path());
        (
            DependencyGate::new(markers.clone(), policy, ShutdownState::new()),
            markers,
        )
    }

    #[test]
    fn test_check_states() {
        let dir = TempDir::new().unwrap();
        let (gate, markers) = gate(&dir, policy(1, 1));
        let c = track("c", &["a", "b"]);

        assert_eq!(
            gate.check(&c).unwrap(),
            GateCheck::Waiting(vec!["a".to_string(), "b".to_string()])
        );

        markers
            .write(&CompletionMarker::complete("a", None, 1))
            .unwrap();
        assert_eq!(
            gate.check(&c).unwrap(),
            GateCheck::Waiting(vec!["b".to_string()])
        );

        markers
            .write(&CompletionMarker::failed("b", None, 0, "broken"))
            .unwrap();
        assert_eq!(
            gate.check(&c).unwrap(),
            GateCheck::UpstreamFailed("b".to_string())
        );
    }

    #[tokio::test]
    async fn test_no_dependencies_opens_immediately() {
        let dir = TempDir::new().unwrap();
        let (gate, _) = gate(&dir, policy(1, 1));
        assert_eq!(gate.wait_for(&track("a", &[])).await.unwrap().polls, 1);
    }

    #[tokio::test]
    async fn test_upstream_failure_returns_without_waiting() {
        let dir = TempDir::new().unwrap();
        let (gate, markers) = gate(&dir, policy(100, 60_000));
        markers
            .write(&CompletionMarker::failed("a", None, 0, "unit failed"))
            .unwrap();

        let started = Instant::now();
        let err = gate.wait_for(&track("b", &["a"])).await.unwrap_err();
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(matches!(
            err,
            EngineError::UpstreamFailed { ref failed_track_id, .. } if failed_track_id == "a"
        ));
    }

    #[tokio::test]
    async fn test_gives_up_after_max_attempts() {
        let dir = TempDir::new().unwrap();
        let (gate, _) = gate(&dir, policy(3, 1));

        let err = gate.wait_for(&track("b", &["a"])).await.unwrap_err();
        match err {
            EngineError::DependenciesNotMet {
                missing, attempts, ..
            } => {
                assert_eq!(missing, vec!["a".to_string()]);
                assert_eq!(attempts, 3);
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[tokio::test]
    async fn test_released_when_marker_appears() {
        let dir = TempDir::new().unwrap();
        let (gate, markers) = gate(&dir, policy(200, 10));

        let writer = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(30)).await;
            markers
                .write(&CompletionMarker::complete("a", None, 2))
                .unwrap();
        });

        let opened = gate.wait_for(&track("b", &["a"])).await.unwrap();
        assert!(opened.polls > 1);
        writer.await.unwrap();
    }

    #[tokio::test]
    async fn test_shutdown_aborts_wait() {
        let dir = TempDir::new().unwrap();
        let shutdown = ShutdownState::new();
        let gate = DependencyGate::new(
            MarkerStore::new(dir.path()),
            policy(100, 60_000),
            shutdown.clone(),
        );

        let stopper = tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            shutdown.request_shutdown();
        });

        let err = gate.wait_for(&track("b", &["a"])).await.unwrap_err();
        assert!(matches!(err, EngineError::Aborted(_)));
        stopper.await.unwrap();
    }
}
