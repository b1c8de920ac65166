use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// A repository surfaced by discovery. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoCandidate {
    pub source_url: String,
    pub discovery_query: String,
    pub first_seen_time: DateTime<Utc>,
}

impl RepoCandidate {
    pub fn new(source_url: impl Into<String>, discovery_query: impl Into<String>) -> Self {
        Self {
            source_url: source_url.into(),
            discovery_query: discovery_query.into(),
            first_seen_time: Utc::now(),
        }
    }
}

/// A remote repository pinned to the revision it pointed at when checked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepoIdentity {
    pub url: String,
    pub content_marker: String,
}

impl RepoIdentity {
    /// Length of the marker prefix used in destination directory names.
    pub const SHORT_MARKER_LEN: usize = 12;

    pub fn short_marker(&self) -> &str {
        let end = self
            .content_marker
            .char_indices()
            .nth(Self::SHORT_MARKER_LEN)
            .map(|(idx, _)| idx)
            .unwrap_or(self.content_marker.len());
        &self.content_marker[..end]
    }

    /// Filesystem-safe directory name derived from the URL basename and the
    /// revision marker. Two fetches of the same revision map to the same name.
    pub fn destination_name(&self) -> String {
        format!(
            "{}_{}",
            sanitize_path_segment(url_basename(&self.url)),
            sanitize_path_segment(self.short_marker())
        )
    }
}

/// Last non-empty path segment of a URL, without a trailing `.git`.
pub fn url_basename(url: &str) -> &str {
    let trimmed = url.trim().trim_end_matches('/');
    let last = trimmed.rsplit(['/', ':']).next().unwrap_or(trimmed);
    let last = last.strip_suffix(".git").unwrap_or(last);
    if last.is_empty() {
        "repo"
    } else {
        last
    }
}

fn sanitize_path_segment(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.') {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    let trimmed = out.trim_matches('.');
    if trimmed.is_empty() {
        "repo".to_string()
    } else {
        trimmed.to_string()
    }
}

/// Terminal result of one acquisition attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Fetched successfully.
    Valid,
    /// Reachable, but not a repository.
    Invalid,
    /// Remote answered 404 or could not be contacted.
    Unreachable,
    /// Already attempted, or the same revision is already on disk.
    Duplicate,
    /// Clone timed out or exited non-zero.
    Failed,
}

impl AttemptOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptOutcome::Valid => "valid",
            AttemptOutcome::Invalid => "invalid",
            AttemptOutcome::Unreachable => "unreachable",
            AttemptOutcome::Duplicate => "duplicate",
            AttemptOutcome::Failed => "failed",
        }
    }

    /// Whether the candidate-list line should be commented out.
    pub fn retires_candidate(&self) -> bool {
        matches!(self, AttemptOutcome::Invalid | AttemptOutcome::Unreachable)
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AttemptOutcome {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "valid" => Ok(AttemptOutcome::Valid),
            "invalid" => Ok(AttemptOutcome::Invalid),
            "unreachable" => Ok(AttemptOutcome::Unreachable),
            "duplicate" => Ok(AttemptOutcome::Duplicate),
            "failed" => Ok(AttemptOutcome::Failed),
            other => Err(format!("unknown attempt outcome '{}'", other)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub url: String,
    pub outcome: AttemptOutcome,
    pub timestamp: DateTime<Utc>,
}

impl AttemptRecord {
    pub fn now(url: impl Into<String>, outcome: AttemptOutcome) -> Self {
        Self {
            url: url.into(),
            outcome,
            timestamp: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValidationState {
    Unchecked,
    Valid,
    Fixed,
    Unfixable,
}

impl ValidationState {
    pub fn label(&self) -> &'static str {
        match self {
            ValidationState::Unchecked => "unchecked",
            ValidationState::Valid => "valid",
            ValidationState::Fixed => "fixed",
            ValidationState::Unfixable => "unfixable",
        }
    }
}

/// A template on disk and what the remediation loop knows about it.
#[derive(Debug, Clone)]
pub struct TemplateFile {
    pub path: PathBuf,
    /// `None` until parsed, or when the file is not valid YAML.
    pub parsed_structure: Option<serde_yaml::Value>,
    pub validation_state: ValidationState,
}

impl TemplateFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            parsed_structure: None,
            validation_state: ValidationState::Unchecked,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FixScope {
    ThisInstance,
    AllFutureInstances,
}

/// A fix the operator (or policy) agreed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixDecision {
    pub field_or_attribute: String,
    /// `None` for removals.
    pub proposed_value: Option<String>,
    pub scope: FixScope,
}
