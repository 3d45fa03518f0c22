// Configuration merging with priority

use super::{EngineConfig, GateWaitConfig, GitSettings, MechanicalRule, RetryConfig};
use serde::{Deserialize, Serialize};

/// Partial configuration for merging
/// Uses Option<T> for all fields so a layer only overrides what it names
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PartialConfig {
    #[serde(default)]
    pub gate: Option<PartialGateWaitConfig>,
    #[serde(default)]
    pub retry: Option<PartialRetryConfig>,
    #[serde(default)]
    pub conflicts: Option<PartialConflictConfig>,
    #[serde(default)]
    pub git: Option<PartialGitSettings>,
    #[serde(default)]
    pub log_level: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PartialGateWaitConfig {
    pub poll_interval_ms: Option<u64>,
    pub max_attempts: Option<u32>,
    pub backoff_multiplier: Option<f64>,
    pub max_interval_ms: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PartialRetryConfig {
    pub max_attempts: Option<u32>,
    pub initial_delay_ms: Option<u64>,
    pub max_delay_ms: Option<u64>,
    pub backoff_multiplier: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PartialConflictConfig {
    /// Replaces the whole rule list when present
    pub mechanical: Option<Vec<MechanicalRule>>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct PartialGitSettings {
    pub target_branch: Option<String>,
    pub author_name: Option<String>,
    pub author_email: Option<String>,
}

/// Configuration merger
/// Priority order: CLI -> Project -> Global -> Defaults
pub struct ConfigMerger {
    defaults: EngineConfig,
    global: Option<PartialConfig>,
    project: Option<PartialConfig>,
    cli: Option<PartialConfig>,
}

impl ConfigMerger {
    /// Create a new config merger with defaults
    pub fn new() -> Self {
        Self {
            defaults: EngineConfig::default(),
            global: None,
            project: None,
            cli: None,
        }
    }

    /// Set global config
    pub fn with_global(mut self, config: Option<PartialConfig>) -> Self {
        self.global = config;
        self
    }

    /// Set project config
    pub fn with_project(mut self, config: Option<PartialConfig>) -> Self {
        self.project = config;
        self
    }

    /// Set CLI overrides
    pub fn with_cli(mut self, config: Option<PartialConfig>) -> Self {
        self.cli = config;
        self
    }

    /// Merge all layers with priority
    pub fn merge(&self) -> EngineConfig {
        let mut result = self.defaults.clone();

        for layer in [&self.global, &self.project, &self.cli].into_iter().flatten() {
            result = self.merge_partial(&result, layer);
        }

        result
    }

    fn merge_partial(&self, base: &EngineConfig, partial: &PartialConfig) -> EngineConfig {
        EngineConfig {
            gate: partial
                .gate
                .as_ref()
                .map(|p| self.merge_gate(&base.gate, p))
                .unwrap_or_else(|| base.gate.clone()),
            retry: partial
                .retry
                .as_ref()
                .map(|p| self.merge_retry(&base.retry, p))
                .unwrap_or_else(|| base.retry.clone()),
            conflicts: match partial.conflicts.as_ref().and_then(|c| c.mechanical.clone()) {
                Some(mechanical) => super::ConflictConfig { mechanical },
                None => base.conflicts.clone(),
            },
            git: partial
                .git
                .as_ref()
                .map(|p| self.merge_git(&base.git, p))
                .unwrap_or_else(|| base.git.clone()),
            log_level: partial.log_level.clone().or_else(|| base.log_level.clone()),
        }
    }

    fn merge_gate(&self, base: &GateWaitConfig, over: &PartialGateWaitConfig) -> GateWaitConfig {
        GateWaitConfig {
            poll_interval_ms: over.poll_interval_ms.unwrap_or(base.poll_interval_ms),
            max_attempts: over.max_attempts.unwrap_or(base.max_attempts),
            backoff_multiplier: over.backoff_multiplier.unwrap_or(base.backoff_multiplier),
            max_interval_ms: over.max_interval_ms.unwrap_or(base.max_interval_ms),
        }
    }

    fn merge_retry(&self, base: &RetryConfig, over: &PartialRetryConfig) -> RetryConfig {
        RetryConfig {
            max_attempts: over.max_attempts.unwrap_or(base.max_attempts),
            initial_delay_ms: over.initial_delay_ms.unwrap_or(base.initial_delay_ms),
            max_delay_ms: over.max_delay_ms.unwrap_or(base.max_delay_ms),
            backoff_multiplier: over.backoff_multiplier.unwrap_or(base.backoff_multiplier),
        }
    }

    fn merge_git(&self, base: &GitSettings, over: &PartialGitSettings) -> GitSettings {
        GitSettings {
            target_branch: over
                .target_branch
                .clone()
                .or_else(|| base.target_branch.clone()),
            author_name: over
                .author_name
                .clone()
                .unwrap_or_else(|| base.author_name.clone()),
            author_email: over
                .author_email
                .clone()
                .unwrap_or_else(|| base.author_email.clone()),
        }
    }
}

impl Default for ConfigMerger {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MechanicalStrategy;

    #[test]
    fn test_defaults_only() {
        let config = ConfigMerger::new().merge();
        assert_eq!(config, EngineConfig::default());
    }

    #[test]
    fn test_priority_order() {
        let global = PartialConfig {
            gate: Some(PartialGateWaitConfig {
                poll_interval_ms: Some(1000),
                max_attempts: Some(5),
                ..Default::default()
            }),
            log_level: Some("warn".into()),
            ..Default::default()
        };
        let project = PartialConfig {
            gate: Some(PartialGateWaitConfig {
                max_attempts: Some(7),
                ..Default::default()
            }),
            git: Some(PartialGitSettings {
                target_branch: Some("develop".into()),
                ..Default::default()
            }),
            ..Default::default()
        };
        let cli = PartialConfig {
            log_level: Some("debug".into()),
            ..Default::default()
        };

        let config = ConfigMerger::new()
            .with_global(Some(global))
            .with_project(Some(project))
            .with_cli(Some(cli))
            .merge();

        assert_eq!(config.gate.poll_interval_ms, 1000);
        assert_eq!(config.gate.max_attempts, 7);
        assert_eq!(config.git.target_branch.as_deref(), Some("develop"));
        assert_eq!(config.git.author_name, "trackflow");
        assert_eq!(config.log_level.as_deref(), Some("debug"));
        assert_eq!(config.retry, RetryConfig::default());
    }

    #[test]
    fn test_mechanical_rules_replace_defaults() {
        let project = PartialConfig {
            conflicts: Some(PartialConflictConfig {
                mechanical: Some(vec![MechanicalRule {
                    pattern: "dist/**".into(),
                    strategy: MechanicalStrategy::KeepIncoming,
                }]),
            }),
            ..Default::default()
        };

        let config = ConfigMerger::new().with_project(Some(project)).merge();
        assert_eq!(config.conflicts.mechanical.len(), 1);
        assert_eq!(config.conflicts.mechanical[0].pattern, "dist/**");
    }
}
