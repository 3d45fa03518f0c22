// Configuration file loading

use super::{ConfigMerger, EngineConfig, PartialConfig};
use crate::error::{EngineError, EngineResult};
use std::fs;
use std::path::{Path, PathBuf};

/// Config loader
pub struct ConfigLoader {
    /// Global config path
    global_path: Option<PathBuf>,
    /// Project config path
    project_path: Option<PathBuf>,
}

impl ConfigLoader {
    /// Create a new config loader
    pub fn new() -> Self {
        Self {
            global_path: Self::get_global_config_path(),
            project_path: None,
        }
    }

    /// Skip the user-wide config (tests, hermetic runs)
    pub fn without_global(mut self) -> Self {
        self.global_path = None;
        self
    }

    /// Set the workspace whose `.trackflow/config.yaml` is the project layer
    pub fn with_workspace(mut self, workspace_root: &Path) -> Self {
        self.project_path = Some(crate::utils::config_path(workspace_root));
        self
    }

    fn get_global_config_path() -> Option<PathBuf> {
        dirs::home_dir().map(|p| p.join(crate::utils::STATE_DIR_NAME).join("config.yaml"))
    }

    /// Parse one config layer; a missing file is not an error
    pub fn load_file(path: &Path) -> EngineResult<Option<PartialConfig>> {
        if !path.exists() {
            return Ok(None);
        }

        let content = fs::read_to_string(path)
            .map_err(|e| EngineError::Config(format!("Failed to read {:?}: {}", path, e)))?;

        if content.trim().is_empty() {
            return Ok(Some(PartialConfig::default()));
        }

        let config: PartialConfig = serde_yaml::from_str(&content)
            .map_err(|e| EngineError::Config(format!("Failed to parse {:?}: {}", path, e)))?;

        log::debug!("[Config] Loaded {:?}", path);
        Ok(Some(config))
    }

    /// Load every file layer and apply CLI overrides on top
    pub fn load(&self, cli: Option<PartialConfig>) -> EngineResult<EngineConfig> {
        let global = match &self.global_path {
            Some(path) => Self::load_file(path)?,
            None => None,
        };
        let project = match &self.project_path {
            Some(path) => Self::load_file(path)?,
            None => None,
        };

        Ok(ConfigMerger::new()
            .with_global(global)
            .with_project(project)
            .with_cli(cli)
            .merge())
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
