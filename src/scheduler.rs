//! Dependency graph with Kahn's algorithm for round-based scheduling
//!
//! Round *n* holds exactly the tracks whose dependencies are all satisfied by
//! rounds `0..n`. Node order is always derived from the manifest so that two
//! runs over the same manifest produce the same rounds.

use crate::error::{EngineError, EngineResult};
use crate::models::{Manifest, MergeStrategy, Track, TrackId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Error types for dependency validation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DependencyValidationError {
    /// A cycle was detected in the dependency graph
    CycleDetected(Vec<TrackId>),
    /// A dependency references a non-existent track
    MissingDependency { from: TrackId, to: TrackId },
    /// Self-referential dependency
    SelfDependency(TrackId),
}

impl std::fmt::Display for DependencyValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DependencyValidationError::CycleDetected(cycle) => {
                write!(f, "Cycle detected: {}", cycle.join(" -> "))
            }
            DependencyValidationError::MissingDependency { from, to } => {
                write!(f, "Track '{}' depends on non-existent '{}'", from, to)
            }
            DependencyValidationError::SelfDependency(id) => {
                write!(f, "Track '{}' cannot depend on itself", id)
            }
        }
    }
}

impl std::error::Error for DependencyValidationError {}

/// Dependency graph over track ids
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DependencyGraph {
    /// Node ids in insertion (manifest) order
    pub nodes: Vec<TrackId>,
    /// Maps track ID to list of tracks it depends on
    pub depends_on: HashMap<TrackId, Vec<TrackId>>,
    /// Maps track ID to list of tracks blocked by it
    pub blocks: HashMap<TrackId, Vec<TrackId>>,
}

impl DependencyGraph {
    /// Create a new empty dependency graph
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the graph from a manifest, keeping manifest order for nodes
    pub fn from_manifest(manifest: &Manifest) -> Self {
        let mut graph = Self::new();
        for track in &manifest.tracks {
            graph.add_node(&track.id);
        }
        for track in &manifest.tracks {
            for dep in &track.depends_on {
                graph.add_edge(&track.id, dep);
            }
        }
        graph
    }

    /// Register a node without dependencies
    pub fn add_node(&mut self, id: &str) {
        if !self.nodes.iter().any(|n| n == id) {
            self.nodes.push(id.to_string());
        }
        self.depends_on.entry(id.to_string()).or_default();
    }

    fn add_edge(&mut self, id: &str, depends_on_id: &str) {
        self.depends_on
            .entry(id.to_string())
            .or_default()
            .push(depends_on_id.to_string());

        self.blocks
            .entry(depends_on_id.to_string())
            .or_default()
            .push(id.to_string());
    }

    /// Get all tracks that `id` depends on
    pub fn get_dependencies(&self, id: &str) -> Vec<&TrackId> {
        self.depends_on
            .get(id)
            .map(|deps| deps.iter().collect())
            .unwrap_or_default()
    }

    /// Get all tracks blocked by `id`
    pub fn get_blocked_by(&self, id: &str) -> Vec<&TrackId> {
        self.blocks
            .get(id)
            .map(|blocked| blocked.iter().collect())
            .unwrap_or_default()
    }

    /// Validate references, self-loops and cycles
    pub fn validate(&self) -> Result<(), DependencyValidationError> {
        let known: HashSet<&TrackId> = self.nodes.iter().collect();

        for node in &self.nodes {
            for dep in self.get_dependencies(node) {
                if dep == node {
                    return Err(DependencyValidationError::SelfDependency(node.clone()));
                }
                if !known.contains(dep) {
                    return Err(DependencyValidationError::MissingDependency {
                        from: node.clone(),
                        to: dep.clone(),
                    });
                }
            }
        }

        if let Some(cycle) = self.find_cycle() {
            return Err(DependencyValidationError::CycleDetected(cycle));
        }

        Ok(())
    }

    /// Find one cycle path (first node repeated at the end), if any
    pub fn find_cycle(&self) -> Option<Vec<TrackId>> {
        let mut visited: HashSet<&TrackId> = HashSet::new();
        let mut in_path: HashSet<&TrackId> = HashSet::new();
        let mut path: Vec<&TrackId> = Vec::new();

        for node in &self.nodes {
            if !visited.contains(node) {
                if let Some(cycle) =
                    self.dfs_cycle_detect(node, &mut visited, &mut in_path, &mut path)
                {
                    return Some(cycle.into_iter().cloned().collect());
                }
            }
        }

        None
    }

    /// DFS helper for cycle detection
    fn dfs_cycle_detect<'a>(
        &'a self,
        node: &'a TrackId,
        visited: &mut HashSet<&'a TrackId>,
        in_path: &mut HashSet<&'a TrackId>,
        path: &mut Vec<&'a TrackId>,
    ) -> Option<Vec<&'a TrackId>> {
        visited.insert(node);
        in_path.insert(node);
        path.push(node);

        if let Some(deps) = self.depends_on.get(node) {
            for dep in deps {
                if in_path.contains(dep) {
                    let cycle_start = path.iter().position(|&n| n == dep).unwrap_or(0);
                    let mut cycle: Vec<&TrackId> = path[cycle_start..].to_vec();
                    cycle.push(dep);
                    return Some(cycle);
                }

                if !visited.contains(dep) {
                    if let Some(cycle) = self.dfs_cycle_detect(dep, visited, in_path, path) {
                        return Some(cycle);
                    }
                }
            }
        }

        in_path.remove(node);
        path.pop();
        None
    }

    /// Group nodes into rounds using level-by-level Kahn's algorithm.
    ///
    /// Each iteration takes every node whose remaining in-degree is zero. If an
    /// iteration selects nothing while nodes remain, the remainder contains a
    /// cycle and no partial ordering is returned.
    pub fn rounds(&self) -> Result<Vec<Vec<TrackId>>, DependencyValidationError> {
        let mut in_degree: HashMap<&TrackId, usize> = self
            .nodes
            .iter()
            .map(|n| (n, self.get_dependencies(n).len()))
            .collect();

        let mut pending: Vec<&TrackId> = self.nodes.iter().collect();
        let mut rounds: Vec<Vec<TrackId>> = Vec::new();

        while !pending.is_empty() {
            let ready: Vec<&TrackId> = pending
                .iter()
                .copied()
                .filter(|n| in_degree.get(n).copied().unwrap_or(0) == 0)
                .collect();

            if ready.is_empty() {
                let cycle = self
                    .find_cycle()
                    .unwrap_or_else(|| pending.iter().map(|n| (*n).clone()).collect());
                return Err(DependencyValidationError::CycleDetected(cycle));
            }

            pending.retain(|n| !ready.contains(n));

            for node in &ready {
                for blocked in self.get_blocked_by(node) {
                    if let Some(degree) = in_degree.get_mut(blocked) {
                        *degree = degree.saturating_sub(1);
                    }
                }
            }

            rounds.push(ready.into_iter().cloned().collect());
        }

        Ok(rounds)
    }
}

impl From<DependencyValidationError> for EngineError {
    fn from(err: DependencyValidationError) -> Self {
        match err {
            DependencyValidationError::CycleDetected(cycle) => {
                EngineError::CyclicDependency { cycle }
            }
            other => EngineError::MalformedManifest {
                path: "<manifest>".to_string(),
                reason: other.to_string(),
            },
        }
    }
}

/// Compute the execution and merge rounds for a manifest.
///
/// Within a round, tracks follow the manifest's merge strategy so the result is
/// deterministic across fresh runs and resumes.
pub fn order(manifest: &Manifest) -> EngineResult<Vec<Vec<&Track>>> {
    let graph = DependencyGraph::from_manifest(manifest);
    graph.validate()?;

    let rounds = graph.rounds()?;

    let ordered = rounds
        .into_iter()
        .map(|ids| {
            let mut tracks: Vec<&Track> =
                ids.iter().filter_map(|id| manifest.track(id)).collect();
            match manifest.merge_strategy {
                MergeStrategy::ManifestOrder => {
                    tracks.sort_by_key(|t| manifest.position(&t.id).unwrap_or(usize::MAX))
                }
                MergeStrategy::ByTrackId => tracks.sort_by(|a, b| a.id.cmp(&b.id)),
            }
            tracks
        })
        .collect();

    Ok(ordered)
}

/// Round index of every track, derived from [`order`]
pub fn round_index(manifest: &Manifest) -> EngineResult<HashMap<TrackId, usize>> {
    let mut index = HashMap::new();
    for (round, tracks) in order(manifest)?.iter().enumerate() {
        for track in tracks {
            index.insert(track.id.clone(), round);
        }
    }
    Ok(index)
}
