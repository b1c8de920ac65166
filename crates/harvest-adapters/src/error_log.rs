//! JSON-lines logs that outlive a run: unresolved errors and discoveries.

use crate::util::append_line_locked;
use anyhow::Context;
use chrono::{DateTime, Utc};
use harvest_core::RepoCandidate;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Something a run could not resolve on its own.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UnresolvedRecord {
    pub timestamp: DateTime<Utc>,
    pub run_id: String,
    pub path: String,
    pub category: String,
    pub diagnostics: String,
}

/// Append-only error log shared by every stage of one run.
#[derive(Debug, Clone)]
pub struct ErrorLog {
    path: PathBuf,
    run_id: Uuid,
}

impl ErrorLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            run_id: Uuid::new_v4(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn append(&self, subject: &Path, category: &str, diagnostics: &str) -> anyhow::Result<()> {
        let record = UnresolvedRecord {
            timestamp: Utc::now(),
            run_id: self.run_id.to_string(),
            path: subject.display().to_string(),
            category: category.to_string(),
            diagnostics: diagnostics.trim().to_string(),
        };
        let row = serde_json::to_string(&record)?;
        append_line_locked(&self.path, &row)
            .with_context(|| format!("failed to append to error log {}", self.path.display()))
    }

    /// Log and swallow a failure to log; the run carries on either way.
    pub fn report(&self, subject: &Path, category: &str, diagnostics: &str) {
        if let Err(err) = self.append(subject, category, diagnostics) {
            tracing::warn!("{:#}", err);
        }
    }
}

/// `discoveries.jsonl`: one `RepoCandidate` per line.
#[derive(Debug, Clone)]
pub struct DiscoveryLog {
    path: PathBuf,
}

impl DiscoveryLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn append(&self, candidate: &RepoCandidate) -> anyhow::Result<()> {
        let row = serde_json::to_string(candidate)?;
        append_line_locked(&self.path, &row)
            .with_context(|| format!("failed to append to {}", self.path.display()))
    }
}
