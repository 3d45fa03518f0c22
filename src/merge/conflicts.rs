//! Conflict Resolver
//!
//! Classifies each conflicted file and settles it:
//! - mechanical files (config glob rules) by a fixed strategy,
//! - binary files only by an explicit external choice, logged as an exception,
//! - everything else by a three-way synthesis proposal that must keep part
//!   of what each side changed unless a justification is supplied.
//!
//! Records are file-level. The region points at the span of conflict markers
//! libgit2 left in the merged file.

use glob::Pattern;
use regex::Regex;
use std::collections::HashSet;
use std::path::{Path, PathBuf};

use crate::config::{ConflictConfig, MechanicalStrategy};
use crate::error::{EngineError, EngineResult};
use crate::git::ConflictInfo;
use crate::models::{ConflictClassification, ConflictRecord, ConflictRegion};
use crate::utils::{sanitize_path_component, state_dir};

/// Where a conflict happened
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConflictSite {
    pub track_id: String,
    pub file_path: String,
    /// Working-tree content with conflict markers
    pub merged: Vec<u8>,
}

impl ConflictSite {
    /// Split a git conflict into its site and its three versions
    pub fn from_git(
        track_id: &str,
        info: ConflictInfo,
    ) -> (Self, Option<Vec<u8>>, Option<Vec<u8>>, Option<Vec<u8>>) {
        (
            Self {
                track_id: track_id.to_string(),
                file_path: info.path,
                merged: info.conflict_markers,
            },
            info.ancestor,
            info.ours,
            info.theirs,
        )
    }
}

/// A proposed resolution from the synthesis policy
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Proposal {
    /// `None` proposes deleting the file
    pub content: Option<Vec<u8>>,
    /// Logged reason for keeping one side only (amputation) or a binary pick
    pub justification: Option<String>,
}

/// What the synthesis policy is asked to resolve
#[derive(Debug, Clone, Copy)]
pub struct SynthesisRequest<'a> {
    pub site: &'a ConflictSite,
    pub classification: ConflictClassification,
    pub base: Option<&'a [u8]>,
    pub ours: Option<&'a [u8]>,
    pub theirs: Option<&'a [u8]>,
}

/// External source of three-way syntheses
pub trait SynthesisPolicy: Send + Sync {
    /// `None` when no proposal exists yet; the conflict then stays unresolved
    fn propose(&self, request: &SynthesisRequest<'_>) -> EngineResult<Option<Proposal>>;
}

/// Never proposes anything; complex and binary conflicts always block
#[derive(Debug, Clone, Default)]
pub struct NoSynthesis;

impl SynthesisPolicy for NoSynthesis {
    fn propose(&self, _request: &SynthesisRequest<'_>) -> EngineResult<Option<Proposal>> {
        Ok(None)
    }
}

/// Reads proposals dropped under `.trackflow/resolutions/<track>/<path>`.
///
/// `<path>.exception` next to a proposal carries its justification and
/// `<path>.delete` proposes removing the file.
#[derive(Debug, Clone)]
pub struct FileSynthesisPolicy {
    dir: PathBuf,
}

impl FileSynthesisPolicy {
    pub fn new(workspace_root: &Path) -> Self {
        Self {
            dir: state_dir(workspace_root).join("resolutions"),
        }
    }

    /// Path a proposal for `file_path` of `track_id` is read from
    pub fn proposal_path(&self, track_id: &str, file_path: &str) -> PathBuf {
        self.dir
            .join(sanitize_path_component(track_id))
            .join(file_path)
    }

    fn sibling(path: &Path, suffix: &str) -> PathBuf {
        let mut name = path.as_os_str().to_os_string();
        name.push(suffix);
        PathBuf::from(name)
    }
}

impl SynthesisPolicy for FileSynthesisPolicy {
    fn propose(&self, request: &SynthesisRequest<'_>) -> EngineResult<Option<Proposal>> {
        let path = self.proposal_path(&request.site.track_id, &request.site.file_path);
        let exception_path = Self::sibling(&path, ".exception");
        let delete_path = Self::sibling(&path, ".delete");

        let justification = match std::fs::read_to_string(&exception_path) {
            Ok(text) if !text.trim().is_empty() => Some(text.trim().to_string()),
            _ => None,
        };

        if delete_path.exists() {
            return Ok(Some(Proposal {
                content: None,
                justification,
            }));
        }

        if !path.is_file() {
            return Ok(None);
        }

        let content = std::fs::read(&path).map_err(|e| {
            EngineError::Storage(format!("Failed to read proposal {:?}: {}", path, e))
        })?;

        log::info!(
            "[FileSynthesisPolicy] Found proposal for {}:{}",
            request.site.track_id,
            request.site.file_path
        );

        Ok(Some(Proposal {
            content: Some(content),
            justification,
        }))
    }
}

/// Content to stage for a resolved file
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedContent {
    Write(Vec<u8>),
    Delete,
}

impl ResolvedContent {
    fn from_option(content: Option<Vec<u8>>) -> Self {
        match content {
            Some(bytes) => ResolvedContent::Write(bytes),
            None => ResolvedContent::Delete,
        }
    }
}

/// A conflict record plus the bytes to apply when it is approved
#[derive(Debug, Clone)]
pub struct Resolution {
    pub record: ConflictRecord,
    /// Present exactly when `record.approved`
    pub content: Option<ResolvedContent>,
}

struct MechanicalMatcher {
    pattern: Pattern,
    strategy: MechanicalStrategy,
}

pub struct ConflictResolver {
    rules: Vec<MechanicalMatcher>,
    marker_start: Regex,
    marker_end: Regex,
}

impl ConflictResolver {
    pub fn new(config: &ConflictConfig) -> EngineResult<Self> {
        let rules = config
            .mechanical
            .iter()
            .map(|rule| {
                Pattern::new(&rule.pattern)
                    .map(|pattern| MechanicalMatcher {
                        pattern,
                        strategy: rule.strategy,
                    })
                    .map_err(|e| {
                        EngineError::Config(format!(
                            "Invalid mechanical conflict pattern '{}': {}",
                            rule.pattern, e
                        ))
                    })
            })
            .collect::<EngineResult<Vec<_>>>()?;

        let marker_start = Regex::new(r"(?m)^<{7}(?: |$)")
            .map_err(|e| EngineError::Config(format!("Invalid marker pattern: {}", e)))?;
        let marker_end = Regex::new(r"(?m)^>{7}(?: |$)")
            .map_err(|e| EngineError::Config(format!("Invalid marker pattern: {}", e)))?;

        Ok(Self {
            rules,
            marker_start,
            marker_end,
        })
    }

    fn mechanical_strategy(&self, file_path: &str) -> Option<MechanicalStrategy> {
        let file_name = Path::new(file_path)
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        self.rules
            .iter()
            .find(|r| r.pattern.matches(file_path) || r.pattern.matches(&file_name))
            .map(|r| r.strategy)
    }

    /// Binary beats mechanical; anything unmatched is complex
    pub fn classify(
        &self,
        file_path: &str,
        base: Option<&[u8]>,
        ours: Option<&[u8]>,
        theirs: Option<&[u8]>,
    ) -> ConflictClassification {
        if [base, ours, theirs].iter().flatten().any(|c| is_binary(c)) {
            ConflictClassification::Binary
        } else if self.mechanical_strategy(file_path).is_some() {
            ConflictClassification::Mechanical
        } else {
            ConflictClassification::Complex
        }
    }

    /// 1-based line span from the first start marker to the last end marker
    pub fn locate(&self, merged: &[u8]) -> ConflictRegion {
        let text = match std::str::from_utf8(merged) {
            Ok(text) => text,
            Err(_) => return ConflictRegion::WholeFile,
        };
        let line_of = |offset: usize| text[..offset].matches('\n').count() + 1;

        let start = self.marker_start.find(text).map(|m| line_of(m.start()));
        let end = self.marker_end.find_iter(text).last().map(|m| line_of(m.start()));

        match (start, end) {
            (Some(start), Some(end)) if end >= start => ConflictRegion::Lines { start, end },
            _ => ConflictRegion::WholeFile,
        }
    }

    fn has_markers(&self, content: &[u8]) -> bool {
        let text = String::from_utf8_lossy(content);
        self.marker_start.is_match(&text) || self.marker_end.is_match(&text)
    }

    /// Resolve one conflicted file from its three versions.
    ///
    /// `base`, `ours` (target line) and `theirs` (merging track) are `None`
    /// when that side has no such file.
    pub fn resolve(
        &self,
        site: &ConflictSite,
        policy: &dyn SynthesisPolicy,
        base: Option<&[u8]>,
        ours: Option<&[u8]>,
        theirs: Option<&[u8]>,
    ) -> EngineResult<Resolution> {
        let classification = self.classify(&site.file_path, base, ours, theirs);
        let region = match classification {
            ConflictClassification::Binary => ConflictRegion::WholeFile,
            _ => self.locate(&site.merged),
        };

        let mut record = ConflictRecord {
            track_id: site.track_id.clone(),
            file_path: site.file_path.clone(),
            region,
            classification,
            base_state: describe(base),
            ours_state: describe(ours),
            theirs_state: describe(theirs),
            resolution: None,
            approved: false,
            exception: None,
        };

        let content = match classification {
            ConflictClassification::Mechanical => {
                let strategy = self
                    .mechanical_strategy(&site.file_path)
                    .unwrap_or(MechanicalStrategy::Union);
                let resolved = apply_mechanical(strategy, base, ours, theirs);
                record.resolution = Some(describe(resolved.as_deref()));
                record.approved = true;
                log::info!(
                    "[ConflictResolver] {}:{} resolved mechanically ({:?})",
                    site.track_id,
                    site.file_path,
                    strategy
                );
                Some(ResolvedContent::from_option(resolved))
            }
            ConflictClassification::Binary => {
                let request = SynthesisRequest {
                    site,
                    classification,
                    base,
                    ours,
                    theirs,
                };
                match policy.propose(&request)? {
                    Some(proposal) => {
                        let side = if proposal.content.as_deref() == ours {
                            "ours"
                        } else if proposal.content.as_deref() == theirs {
                            "theirs"
                        } else {
                            "neither side"
                        };
                        record.resolution = Some(describe(proposal.content.as_deref()));
                        record.exception = Some(proposal.justification.unwrap_or_else(|| {
                            format!("explicit binary choice: {}", side)
                        }));
                        record.approved = true;
                        log::warn!(
                            "[ConflictResolver] {}:{} binary conflict settled by explicit choice ({})",
                            site.track_id,
                            site.file_path,
                            side
                        );
                        Some(ResolvedContent::from_option(proposal.content))
                    }
                    None => {
                        log::warn!(
                            "[ConflictResolver] {}:{} binary conflict awaits an explicit choice",
                            site.track_id,
                            site.file_path
                        );
                        None
                    }
                }
            }
            ConflictClassification::Complex => {
                let request = SynthesisRequest {
                    site,
                    classification,
                    base,
                    ours,
                    theirs,
                };
                match policy.propose(&request)? {
                    Some(proposal) => {
                        self.judge_synthesis(&mut record, proposal, base, ours, theirs)
                    }
                    None => {
                        log::warn!(
                            "[ConflictResolver] {}:{} complex conflict awaits a three-way synthesis",
                            site.track_id,
                            site.file_path
                        );
                        None
                    }
                }
            }
        };

        Ok(Resolution { record, content })
    }

    /// Approve a synthesis unless it still carries markers or drops what
    /// one side contributed
    fn judge_synthesis(
        &self,
        record: &mut ConflictRecord,
        proposal: Proposal,
        base: Option<&[u8]>,
        ours: Option<&[u8]>,
        theirs: Option<&[u8]>,
    ) -> Option<ResolvedContent> {
        record.resolution = Some(describe(proposal.content.as_deref()));

        if proposal
            .content
            .as_deref()
            .map_or(false, |c| self.has_markers(c))
        {
            log::warn!(
                "[ConflictResolver] {}:{} synthesis rejected: conflict markers remain",
                record.track_id,
                record.file_path
            );
            return None;
        }

        let base = normalized_lines(base);
        let ours = normalized_lines(ours);
        let theirs = normalized_lines(theirs);
        let proposed = normalized_lines(proposal.content.as_deref());

        let dropped: Vec<&str> = [
            ("ours", keeps_changes(&base, &ours, &theirs, &proposed)),
            ("theirs", keeps_changes(&base, &theirs, &ours, &proposed)),
        ]
        .into_iter()
        .filter(|(_, kept)| !kept)
        .map(|(side, _)| side)
        .collect();

        if !dropped.is_empty() {
            let dropped = dropped.join(" and ");
            match proposal.justification {
                Some(reason) => {
                    log::warn!(
                        "[ConflictResolver] {}:{} amputation of {} accepted: {}",
                        record.track_id,
                        record.file_path,
                        dropped,
                        reason
                    );
                    record.exception = Some(format!("amputation: {}", reason));
                }
                None => {
                    log::warn!(
                        "[ConflictResolver] {}:{} synthesis rejected: changes of {} are missing",
                        record.track_id,
                        record.file_path,
                        dropped
                    );
                    return None;
                }
            }
        }

        record.approved = true;
        Some(ResolvedContent::from_option(proposal.content))
    }
}

/// Non-blank lines without line endings or trailing whitespace
fn normalized_lines(content: Option<&[u8]>) -> Vec<String> {
    String::from_utf8_lossy(content.unwrap_or_default())
        .lines()
        .map(|line| line.trim_end().to_string())
        .filter(|line| !line.is_empty())
        .collect()
}

fn words<'a>(lines: impl Iterator<Item = &'a str>) -> HashSet<&'a str> {
    lines
        .flat_map(|line| line.split(|c: char| !(c.is_alphanumeric() || c == '_')))
        .filter(|word| !word.is_empty())
        .collect()
}

/// Whether `proposed` keeps part of what `side` changed relative to `base`.
///
/// An added line counts when it survives as is, or when one of its words
/// that neither `base` nor `other` has appears in the proposal. A side that
/// only removed lines is kept when at least one of those lines stays gone.
fn keeps_changes(base: &[String], side: &[String], other: &[String], proposed: &[String]) -> bool {
    let in_base: HashSet<&str> = base.iter().map(String::as_str).collect();
    let in_side: HashSet<&str> = side.iter().map(String::as_str).collect();
    let kept: HashSet<&str> = proposed.iter().map(String::as_str).collect();

    let added: Vec<&str> = side
        .iter()
        .map(String::as_str)
        .filter(|line| !in_base.contains(line))
        .collect();

    if added.is_empty() {
        let removed: Vec<&str> = base
            .iter()
            .map(String::as_str)
            .filter(|line| !in_side.contains(line))
            .collect();
        return removed.is_empty() || removed.iter().any(|line| !kept.contains(line));
    }

    if added.iter().any(|line| kept.contains(line)) {
        return true;
    }

    let context = words(base.iter().chain(other).map(String::as_str));
    let kept_words = words(kept.iter().copied());
    words(added.iter().copied())
        .into_iter()
        .any(|word| !context.contains(word) && kept_words.contains(word))
}

/// NUL bytes or invalid UTF-8
pub fn is_binary(content: &[u8]) -> bool {
    content.contains(&0) || std::str::from_utf8(content).is_err()
}

/// Text for audit records; binary and absent content get placeholders
pub fn describe(content: Option<&[u8]>) -> String {
    match content {
        None => "<absent>".to_string(),
        Some(bytes) if is_binary(bytes) => format!("<binary: {} bytes>", bytes.len()),
        Some(bytes) => String::from_utf8_lossy(bytes).to_string(),
    }
}

fn apply_mechanical(
    strategy: MechanicalStrategy,
    base: Option<&[u8]>,
    ours: Option<&[u8]>,
    theirs: Option<&[u8]>,
) -> Option<Vec<u8>> {
    match strategy {
        MechanicalStrategy::KeepTarget => ours.map(|c| c.to_vec()),
        MechanicalStrategy::KeepIncoming => theirs.map(|c| c.to_vec()),
        MechanicalStrategy::Union => Some(union_lines(base, ours, theirs)),
    }
}

/// Our lines followed by every line theirs added that we do not already have
fn union_lines(base: Option<&[u8]>, ours: Option<&[u8]>, theirs: Option<&[u8]>) -> Vec<u8> {
    let text = |c: Option<&[u8]>| String::from_utf8_lossy(c.unwrap_or_default()).to_string();
    let base = text(base);
    let ours = text(ours);
    let theirs = text(theirs);

    let base_lines: HashSet<&str> = base.lines().collect();
    let our_lines: HashSet<&str> = ours.lines().collect();

    let mut merged: Vec<&str> = ours.lines().collect();
    for line in theirs.lines() {
        if !base_lines.contains(line) && !our_lines.contains(line) {
            merged.push(line);
        }
    }

    let mut out = merged.join("\n");
    if !out.is_empty() {
        out.push('\n');
    }
    out.into_bytes()
}
