//! Manifest Store
//!
//! Loads a manifest from JSON, YAML or TOML and validates it before any
//! scheduling begins. Failure is fatal: there is no partial manifest.

use crate::error::{EngineError, EngineResult};
use crate::models::Manifest;
use crate::scheduler::{DependencyGraph, DependencyValidationError};
use crate::utils::sanitize_path_component;
use std::collections::{HashMap, HashSet};
use std::path::Path;

/// Supported manifest file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestFormat {
    Json,
    Yaml,
    Toml,
}

impl ManifestFormat {
    /// Detect format from file extension
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            _ => None,
        }
    }

    /// Detect format from file path
    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }
}

/// Parse manifest content in the given format
pub fn parse(content: &str, format: ManifestFormat) -> Result<Manifest, String> {
    match format {
        ManifestFormat::Json => serde_json::from_str(content).map_err(|e| e.to_string()),
        ManifestFormat::Yaml => serde_yaml::from_str(content).map_err(|e| e.to_string()),
        ManifestFormat::Toml => toml::from_str(content).map_err(|e| e.to_string()),
    }
}

/// Load and validate a manifest file.
///
/// A relative `workspace_root` is resolved against the manifest's directory.
pub fn load(path: &Path) -> EngineResult<Manifest> {
    let display = path.display().to_string();
    let malformed = |reason: String| EngineError::MalformedManifest {
        path: display.clone(),
        reason,
    };

    let format = ManifestFormat::from_path(path).ok_or_else(|| {
        malformed("unsupported extension (expected .json, .yaml, .yml or .toml)".to_string())
    })?;

    let content = std::fs::read_to_string(path)
        .map_err(|e| malformed(format!("failed to read file: {}", e)))?;

    let mut manifest = parse(&content, format).map_err(&malformed)?;

    if manifest.workspace_root.is_relative() {
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        manifest.workspace_root = base.join(&manifest.workspace_root);
    }

    validate(&manifest).map_err(|err| match err {
        EngineError::MalformedManifest { reason, .. } => malformed(reason),
        other => other,
    })?;

    log::info!(
        "[ManifestStore] Loaded manifest '{}' with {} track(s) from {}",
        manifest.feature_id,
        manifest.tracks.len(),
        display
    );

    Ok(manifest)
}

/// Validate required fields, uniqueness, references and acyclicity
pub fn validate(manifest: &Manifest) -> EngineResult<()> {
    let malformed = |reason: String| EngineError::MalformedManifest {
        path: "<manifest>".to_string(),
        reason,
    };

    if manifest.feature_id.trim().is_empty() {
        return Err(malformed("feature_id must not be empty".to_string()));
    }

    let mut ids = HashSet::new();
    let mut isolation_refs = HashSet::new();
    let mut branches = HashSet::new();
    // Ids and isolation refs become file names; compared case-insensitively
    // for case-insensitive file systems
    let mut state_names: HashMap<String, &str> = HashMap::new();
    let mut workspace_names: HashMap<String, &str> = HashMap::new();

    for (i, track) in manifest.tracks.iter().enumerate() {
        if track.id.trim().is_empty() {
            return Err(malformed(format!("track #{} has an empty id", i + 1)));
        }
        if track.isolation_ref.trim().is_empty() {
            return Err(malformed(format!(
                "track '{}' has an empty isolation_ref",
                track.id
            )));
        }
        if !ids.insert(track.id.as_str()) {
            return Err(malformed(format!("duplicate track id '{}'", track.id)));
        }
        if !isolation_refs.insert(track.isolation_ref.as_str()) {
            return Err(malformed(format!(
                "track '{}' reuses isolation_ref '{}'",
                track.id, track.isolation_ref
            )));
        }
        let state_name = sanitize_path_component(&track.id).to_lowercase();
        if let Some(other) = state_names.insert(state_name.clone(), &track.id) {
            return Err(malformed(format!(
                "track ids '{}' and '{}' share the state file name '{}'",
                other, track.id, state_name
            )));
        }
        let workspace_name = sanitize_path_component(&track.isolation_ref).to_lowercase();
        if let Some(other) = workspace_names.insert(workspace_name.clone(), &track.isolation_ref) {
            return Err(malformed(format!(
                "isolation refs '{}' and '{}' share the workspace directory '{}'",
                other, track.isolation_ref, workspace_name
            )));
        }
        let branch = track.branch_name(&manifest.feature_id);
        if !branches.insert(branch.clone()) {
            return Err(malformed(format!(
                "track '{}' reuses branch '{}'",
                track.id, branch
            )));
        }

        let mut unit_ids = HashSet::new();
        for unit in &track.units_of_work {
            if unit.id.trim().is_empty() {
                return Err(malformed(format!(
                    "track '{}' has a unit with an empty id",
                    track.id
                )));
            }
            if !unit_ids.insert(unit.id.as_str()) {
                return Err(malformed(format!(
                    "track '{}' has duplicate unit id '{}'",
                    track.id, unit.id
                )));
            }
        }
    }

    for gate in manifest
        .quality_gates
        .iter()
        .chain(manifest.tracks.iter().flat_map(|t| t.post_merge_checks.iter()))
    {
        if gate.command().trim().is_empty() {
            return Err(malformed(format!("gate '{}' has an empty command", gate.name())));
        }
    }

    match DependencyGraph::from_manifest(manifest).validate() {
        Ok(()) => Ok(()),
        Err(DependencyValidationError::CycleDetected(cycle)) => {
            Err(EngineError::CyclicDependency { cycle })
        }
        Err(other) => Err(malformed(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{GateSpec, MergeStrategy};
    use std::fs;
    use tempfile::TempDir;

    const YAML_MANIFEST: &str = r#"
feature_id: checkout-v2
workspace_root: repo
merge_strategy: manifest_order
quality_gates:
  - kind: test_suite
    name: unit
    command: cargo test
  - kind: audit
    name: deps
    command: cargo audit
tracks:
  - id: schema
    name: Schema changes
    isolation_ref: schema
    units_of_work:
      - id: migrate
        command: ./migrate.sh
  - id: api
    name: API
    isolation_ref: api
    branch: feature/api
    depends_on: [schema]
"#;

    #[test]
    fn test_format_from_path() {
        assert_eq!(
            ManifestFormat::from_path(Path::new("m.YML")),
            Some(ManifestFormat::Yaml)
        );
        assert_eq!(
            ManifestFormat::from_path(Path::new("m.toml")),
            Some(ManifestFormat::Toml)
        );
        assert_eq!(ManifestFormat::from_path(Path::new("m.txt")), None);
    }

    #[test]
    fn test_load_yaml_resolves_workspace_root() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("manifest.yaml");
        fs::write(&path, YAML_MANIFEST).unwrap();

        let manifest = load(&path).unwrap();
        assert_eq!(manifest.feature_id, "checkout-v2");
        assert_eq!(manifest.workspace_root, temp_dir.path().join("repo"));
        assert_eq!(manifest.merge_strategy, MergeStrategy::ManifestOrder);
        assert_eq!(manifest.tracks.len(), 2);
        assert!(manifest.tracks[1].depends_on.contains("schema"));
        assert_eq!(manifest.tracks[1].branch_name("checkout-v2"), "feature/api");
        assert_eq!(
            manifest.tracks[0].branch_name("checkout-v2"),
            "trackflow/checkout-v2/schema"
        );
        assert_eq!(
            manifest.test_suite(),
            vec![GateSpec::TestSuite {
                name: "unit".into(),
                command: "cargo test".into()
            }]
        );
    }

    #[test]
    fn test_load_json_and_toml() {
        let temp_dir = TempDir::new().unwrap();

        let json = r#"{
            "feature_id": "f",
            "workspace_root": "/tmp/ws",
            "tracks": [{"id": "a", "name": "A", "isolation_ref": "a"}]
        }"#;
        let json_path = temp_dir.path().join("m.json");
        fs::write(&json_path, json).unwrap();
        let manifest = load(&json_path).unwrap();
        assert_eq!(manifest.workspace_root, Path::new("/tmp/ws"));

        let toml_src = r#"
feature_id = "f"
workspace_root = "/tmp/ws"

[[tracks]]
id = "a"
name = "A"
isolation_ref = "a"

[[tracks]]
id = "b"
name = "B"
isolation_ref = "b"
depends_on = ["a"]

[[quality_gates]]
kind = "custom_command"
name = "smoke"
command = "./smoke.sh"
"#;
        let toml_path = temp_dir.path().join("m.toml");
        fs::write(&toml_path, toml_src).unwrap();
        let manifest = load(&toml_path).unwrap();
        assert_eq!(manifest.tracks.len(), 2);
        assert_eq!(manifest.quality_gates[0].kind(), "custom_command");
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("m.json");
        fs::write(&path, r#"{"feature_id": "f", "tracks": []}"#).unwrap();

        let err = load(&path).unwrap_err();
        match err {
            EngineError::MalformedManifest { path: p, reason } => {
                assert!(p.ends_with("m.json"));
                assert!(reason.contains("workspace_root"));
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_unknown_dependency_is_malformed_with_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("m.yaml");
        fs::write(
            &path,
            "feature_id: f\nworkspace_root: .\ntracks:\n  - {id: a, name: A, isolation_ref: a, depends_on: [nope]}\n",
        )
        .unwrap();

        let err = load(&path).unwrap_err();
        assert!(matches!(err, EngineError::MalformedManifest { .. }));
        let message = err.to_string();
        assert!(message.contains("m.yaml"));
        assert!(message.contains("nope"));
    }

    #[test]
    fn test_cycle_rejected_with_path() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("m.yaml");
        fs::write(
            &path,
            "feature_id: f\nworkspace_root: .\ntracks:\n  - {id: a, name: A, isolation_ref: a, depends_on: [b]}\n  - {id: b, name: B, isolation_ref: b, depends_on: [a]}\n",
        )
        .unwrap();

        match load(&path).unwrap_err() {
            EngineError::CyclicDependency { cycle } => {
                assert_eq!(cycle, vec!["a", "b", "a"]);
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_ids_and_isolation_refs() {
        let base = "feature_id: f\nworkspace_root: .\ntracks:\n";
        let dup_id = format!(
            "{}  - {{id: a, name: A, isolation_ref: x}}\n  - {{id: a, name: A2, isolation_ref: y}}\n",
            base
        );
        let err = validate(&parse(&dup_id, ManifestFormat::Yaml).unwrap()).unwrap_err();
        assert!(err.to_string().contains("duplicate track id 'a'"));

        let dup_ref = format!(
            "{}  - {{id: a, name: A, isolation_ref: x}}\n  - {{id: b, name: B, isolation_ref: x}}\n",
            base
        );
        let err = validate(&parse(&dup_ref, ManifestFormat::Yaml).unwrap()).unwrap_err();
        assert!(err.to_string().contains("reuses isolation_ref 'x'"));
    }

    #[test]
    fn test_ids_sharing_a_file_name_rejected() {
        let base = "feature_id: f\nworkspace_root: .\ntracks:\n";
        let ids = format!(
            "{}  - {{id: a.b, name: A, isolation_ref: x}}\n  - {{id: a_b, name: B, isolation_ref: y}}\n",
            base
        );
        let err = validate(&parse(&ids, ManifestFormat::Yaml).unwrap()).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("'a.b' and 'a_b'"));

        let cased = format!(
            "{}  - {{id: api, name: A, isolation_ref: x}}\n  - {{id: API, name: B, isolation_ref: y}}\n",
            base
        );
        assert!(validate(&parse(&cased, ManifestFormat::Yaml).unwrap()).is_err());

        let refs = format!(
            "{}  - {{id: a, name: A, isolation_ref: wt/a}}\n  - {{id: b, name: B, isolation_ref: wt.a}}\n",
            base
        );
        let err = validate(&parse(&refs, ManifestFormat::Yaml).unwrap()).unwrap_err();
        assert!(err.to_string().contains("share the workspace directory"));
    }

    #[test]
    fn test_unsupported_extension() {
        let err = load(Path::new("/nonexistent/manifest.txt")).unwrap_err();
        assert!(err.to_string().contains("unsupported extension"));
    }
}
