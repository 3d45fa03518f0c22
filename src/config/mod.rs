// Engine configuration
//
// Priority order: CLI -> project (.trackflow/config.yaml) -> global
// (~/.trackflow/config.yaml) -> defaults.

mod loader;
mod merger;

pub use loader::ConfigLoader;
pub use merger::{
    ConfigMerger, PartialConfig, PartialConflictConfig, PartialGateWaitConfig, PartialGitSettings,
    PartialRetryConfig,
};

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Resolved engine configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
pub struct EngineConfig {
    #[serde(default)]
    pub gate: GateWaitConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub conflicts: ConflictConfig,
    #[serde(default)]
    pub git: GitSettings,
    /// Log level (`error` to `trace`, or `off`) used when RUST_LOG is unset
    #[serde(default)]
    pub log_level: Option<String>,
}

/// Dependency gate polling policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GateWaitConfig {
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Polls before giving up; with the defaults this is a 30 minute wait
    #[serde(default = "default_gate_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_gate_multiplier")]
    pub backoff_multiplier: f64,
    #[serde(default = "default_max_interval_ms")]
    pub max_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    30_000
}
fn default_gate_attempts() -> u32 {
    60
}
fn default_gate_multiplier() -> f64 {
    1.0
}
fn default_max_interval_ms() -> u64 {
    300_000
}

impl Default for GateWaitConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
            max_attempts: default_gate_attempts(),
            backoff_multiplier: default_gate_multiplier(),
            max_interval_ms: default_max_interval_ms(),
        }
    }
}

impl GateWaitConfig {
    /// Interval to wait after the given 1-based poll
    pub fn interval_after(&self, attempt: u32) -> Duration {
        let factor = self
            .backoff_multiplier
            .max(1.0)
            .powi(attempt.saturating_sub(1) as i32);
        let ms = (self.poll_interval_ms as f64 * factor).min(self.max_interval_ms as f64);
        Duration::from_millis(ms as u64)
    }
}

/// Retry policy for failed units of work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts per unit, including the first (default: 3)
    #[serde(default = "default_retry_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_retry_multiplier")]
    pub backoff_multiplier: f64,
}

fn default_retry_attempts() -> u32 {
    3
}
fn default_initial_delay_ms() -> u64 {
    1000
}
fn default_max_delay_ms() -> u64 {
    30_000
}
fn default_retry_multiplier() -> f64 {
    2.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_retry_attempts(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_retry_multiplier(),
        }
    }
}

/// How a mechanical conflict is settled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MechanicalStrategy {
    /// Base plus the lines each side added (strictly additive files)
    Union,
    /// Keep the target line's version (regenerated afterwards)
    KeepTarget,
    /// Keep the merging track's version
    KeepIncoming,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MechanicalRule {
    /// Glob matched against the repository-relative path; patterns without a
    /// `/` also match the bare file name
    pub pattern: String,
    pub strategy: MechanicalStrategy,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictConfig {
    #[serde(default = "default_mechanical_rules")]
    pub mechanical: Vec<MechanicalRule>,
}

fn default_mechanical_rules() -> Vec<MechanicalRule> {
    vec![
        MechanicalRule {
            pattern: "*.lock".to_string(),
            strategy: MechanicalStrategy::KeepTarget,
        },
        MechanicalRule {
            pattern: "CHANGELOG.md".to_string(),
            strategy: MechanicalStrategy::Union,
        },
        MechanicalRule {
            pattern: "*.log".to_string(),
            strategy: MechanicalStrategy::Union,
        },
    ]
}

impl Default for ConflictConfig {
    fn default() -> Self {
        Self {
            mechanical: default_mechanical_rules(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GitSettings {
    /// Target line when the manifest does not name one
    #[serde(default)]
    pub target_branch: Option<String>,
    #[serde(default = "default_author_name")]
    pub author_name: String,
    #[serde(default = "default_author_email")]
    pub author_email: String,
}

fn default_author_name() -> String {
    "trackflow".to_string()
}
fn default_author_email() -> String {
    "trackflow@localhost".to_string()
}

impl Default for GitSettings {
    fn default() -> Self {
        Self {
            target_branch: None,
            author_name: default_author_name(),
            author_email: default_author_email(),
        }
    }
}
