// Integration tests for manifest loading and round scheduling

#[cfg(test)]
mod scheduling_integration_tests {
    use std::fs;
    use tempfile::TempDir;
    use trackflow_lib::manifest::{self, ManifestFormat};
    use trackflow_lib::scheduler;
    use trackflow_lib::EngineError;

    const DIAMOND: &str = r#"
feature_id: checkout
workspace_root: .
merge_strategy: by_track_id
quality_gates:
  - kind: test_suite
    name: unit
    command: "true"
tracks:
  - id: ui
    name: UI
    isolation_ref: wt-ui
    depends_on: [core]
  - id: core
    name: Core
    isolation_ref: wt-core
  - id: api
    name: API
    isolation_ref: wt-api
    depends_on: [core]
  - id: release
    name: Release
    isolation_ref: wt-release
    depends_on: [api, ui]
"#;

    fn ids(rounds: &[Vec<&trackflow_lib::Track>]) -> Vec<Vec<String>> {
        rounds
            .iter()
            .map(|r| r.iter().map(|t| t.id.clone()).collect())
            .collect()
    }

    #[test]
    fn test_diamond_rounds() {
        let manifest = manifest::parse(DIAMOND, ManifestFormat::Yaml).unwrap();
        let rounds = scheduler::order(&manifest).unwrap();

        // by_track_id puts api before ui although ui is declared first
        assert_eq!(
            ids(&rounds),
            vec![
                vec!["core".to_string()],
                vec!["api".to_string(), "ui".to_string()],
                vec!["release".to_string()],
            ]
        );
        assert_eq!(manifest.test_suite().len(), 1);
    }

    #[test]
    fn test_order_is_stable_across_loads() {
        let first = manifest::parse(DIAMOND, ManifestFormat::Yaml).unwrap();
        let second = manifest::parse(DIAMOND, ManifestFormat::Yaml).unwrap();
        assert_eq!(
            ids(&scheduler::order(&first).unwrap()),
            ids(&scheduler::order(&second).unwrap())
        );
    }

    #[test]
    fn test_load_resolves_workspace_root_next_to_manifest() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("trackflow.yaml");
        fs::write(&path, DIAMOND).unwrap();

        let manifest = manifest::load(&path).unwrap();
        assert_eq!(manifest.workspace_root, dir.path().join("."));
        assert_eq!(manifest.tracks.len(), 4);
    }

    #[test]
    fn test_cycle_is_rejected_before_anything_runs() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cyclic.json");
        fs::write(
            &path,
            r#"{
                "feature_id": "loop",
                "workspace_root": ".",
                "tracks": [
                    {"id": "a", "name": "A", "isolation_ref": "wt-a", "depends_on": ["c"]},
                    {"id": "b", "name": "B", "isolation_ref": "wt-b", "depends_on": ["a"]},
                    {"id": "c", "name": "C", "isolation_ref": "wt-c", "depends_on": ["b"]}
                ]
            }"#,
        )
        .unwrap();

        let err = manifest::load(&path).unwrap_err();
        assert_eq!(err.exit_code(), 3);
        match err {
            EngineError::CyclicDependency { cycle } => {
                assert!(cycle.contains(&"a".to_string()));
                assert!(cycle.contains(&"c".to_string()));
            }
            other => panic!("expected a cycle, got {}", other),
        }
        // Nothing was initialized for a rejected manifest
        assert!(!dir.path().join(".trackflow").exists());
    }

    #[test]
    fn test_unknown_dependency_is_malformed() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(
            &path,
            r#"
feature_id = "broken"
workspace_root = "."

[[tracks]]
id = "a"
name = "A"
isolation_ref = "wt-a"
depends_on = ["ghost"]
"#,
        )
        .unwrap();

        let err = manifest::load(&path).unwrap_err();
        assert_eq!(err.exit_code(), 2);
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn test_unsupported_extension() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("manifest.txt");
        fs::write(&path, DIAMOND).unwrap();
        assert!(matches!(
            manifest::load(&path).unwrap_err(),
            EngineError::MalformedManifest { .. }
        ));
    }
}
