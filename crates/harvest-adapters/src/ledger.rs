//! Append-only record of every URL an acquisition run has finished with.
//!
//! One attempt per line: `<url>\t<outcome>\t<rfc3339 timestamp>`. Older
//! ledgers hold bare URLs; those lines still count for membership.

use crate::util::{append_line_locked, FileLock};
use anyhow::Context;
use chrono::{DateTime, Utc};
use harvest_core::{AttemptOutcome, AttemptRecord};
use std::collections::HashSet;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct Ledger {
    path: PathBuf,
    known: HashSet<String>,
}

/// One parsed ledger line. Legacy lines carry only the URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LedgerEntry {
    pub url: String,
    pub outcome: Option<AttemptOutcome>,
    pub timestamp: Option<DateTime<Utc>>,
}

pub fn parse_line(line: &str) -> Option<LedgerEntry> {
    let line = line.trim();
    if line.is_empty() || line.starts_with('#') {
        return None;
    }
    let mut fields = line.split('\t');
    let url = fields.next()?.trim();
    if url.is_empty() {
        return None;
    }
    let outcome = fields.next().and_then(|f| f.parse().ok());
    let timestamp = fields
        .next()
        .and_then(|f| DateTime::parse_from_rfc3339(f.trim()).ok())
        .map(|t| t.with_timezone(&Utc));
    Some(LedgerEntry {
        url: url.to_string(),
        outcome,
        timestamp,
    })
}

pub fn format_record(record: &AttemptRecord) -> String {
    format!(
        "{}\t{}\t{}",
        record.url.trim(),
        record.outcome,
        record.timestamp.to_rfc3339()
    )
}

impl Ledger {
    /// Read the whole ledger into memory. A missing file is an empty ledger.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
            Err(err) => {
                return Err(err).with_context(|| format!("failed to read ledger {}", path.display()))
            }
        };
        let known = content
            .lines()
            .filter_map(parse_line)
            .map(|entry| entry.url)
            .collect();
        Ok(Self {
            path: path.to_path_buf(),
            known,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn contains(&self, url: &str) -> bool {
        self.known.contains(url.trim())
    }

    pub fn len(&self) -> usize {
        self.known.len()
    }

    pub fn is_empty(&self) -> bool {
        self.known.is_empty()
    }

    /// Append the record and remember its URL for the rest of the run.
    pub fn record(&mut self, record: &AttemptRecord) -> anyhow::Result<()> {
        append_line_locked(&self.path, &format_record(record))
            .with_context(|| format!("failed to append to ledger {}", self.path.display()))?;
        self.known.insert(record.url.trim().to_string());
        Ok(())
    }

    /// Truncate the ledger file. Returns how many distinct URLs were forgotten.
    pub fn reset(path: &Path) -> anyhow::Result<usize> {
        let forgotten = Self::load(path)?.len();
        if path.exists() {
            let _lock = FileLock::acquire(path)?;
            fs::write(path, "")
                .with_context(|| format!("failed to reset ledger {}", path.display()))?;
        }
        Ok(forgotten)
    }
}
