//! The newline-delimited candidate URL list.
//!
//! Lines beginning with `#` are inert. Retiring a URL prefixes its line with
//! `# ` in place; a byte-identical `<file>.bak` is written before the first
//! mutation of each call.

use crate::util::{write_atomic, FileLock};
use anyhow::Context;
use std::collections::HashSet;
use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

pub const COMMENT_PREFIX: &str = "# ";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CandidateEntry {
    pub url: String,
    /// Zero-based line index in the file.
    pub line: usize,
}

/// Active (non-comment, non-blank) URLs in file order.
pub fn read_active(path: &Path) -> anyhow::Result<Vec<CandidateEntry>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read candidate list {}", path.display()))?;
    Ok(content
        .lines()
        .enumerate()
        .filter_map(|(line, raw)| {
            let url = raw.trim();
            if url.is_empty() || url.starts_with('#') {
                None
            } else {
                Some(CandidateEntry {
                    url: url.to_string(),
                    line,
                })
            }
        })
        .collect())
}

/// Lines already commented out.
pub fn count_inert(path: &Path) -> anyhow::Result<usize> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read candidate list {}", path.display()))?;
    Ok(content
        .lines()
        .filter(|line| line.trim_start().starts_with('#'))
        .count())
}

/// Every URL mentioned in the file, commented out or not. A missing file is
/// empty.
pub fn read_all_urls(path: &Path) -> anyhow::Result<HashSet<String>> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(HashSet::new()),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()))
        }
    };
    Ok(content
        .lines()
        .map(|line| line.trim().trim_start_matches('#').trim())
        .filter(|url| !url.is_empty())
        .map(str::to_string)
        .collect())
}

pub fn backup_path(path: &Path) -> PathBuf {
    let mut name = path.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".bak");
    path.with_file_name(name)
}

/// Copy the list byte-for-byte to `<file>.bak`.
pub fn write_backup(path: &Path) -> anyhow::Result<PathBuf> {
    let backup = backup_path(path);
    fs::copy(path, &backup).with_context(|| {
        format!(
            "failed to back up {} to {}",
            path.display(),
            backup.display()
        )
    })?;
    Ok(backup)
}

/// Comment out every active line whose URL is in `urls`. Returns how many
/// lines changed. The backup is only written when something changes.
pub fn comment_out(path: &Path, urls: &HashSet<String>) -> anyhow::Result<usize> {
    if urls.is_empty() {
        return Ok(0);
    }
    let _lock = FileLock::acquire(path)?;
    let content = fs::read_to_string(path)
        .with_context(|| format!("failed to read candidate list {}", path.display()))?;

    let mut changed = 0;
    let mut out = String::with_capacity(content.len() + urls.len() * COMMENT_PREFIX.len());
    for segment in content.split_inclusive('\n') {
        let (line, ending) = match segment.strip_suffix('\n') {
            Some(stripped) => match stripped.strip_suffix('\r') {
                Some(line) => (line, "\r\n"),
                None => (stripped, "\n"),
            },
            None => (segment, ""),
        };
        let url = line.trim();
        if !url.is_empty() && !url.starts_with('#') && urls.contains(url) {
            out.push_str(COMMENT_PREFIX);
            changed += 1;
        }
        out.push_str(line);
        out.push_str(ending);
    }

    if changed > 0 {
        write_backup(path)?;
        write_atomic(path, &out)
            .with_context(|| format!("failed to rewrite candidate list {}", path.display()))?;
    }
    Ok(changed)
}

/// Append URLs, one per line, keeping the file newline-terminated. The main
/// list is backed up first when it already exists.
pub fn append_urls(path: &Path, urls: &[String]) -> anyhow::Result<usize> {
    if urls.is_empty() {
        return Ok(0);
    }
    let _lock = FileLock::acquire(path)?;
    let existing = match fs::read_to_string(path) {
        Ok(content) => {
            write_backup(path)?;
            content
        }
        Err(err) if err.kind() == ErrorKind::NotFound => String::new(),
        Err(err) => {
            return Err(err).with_context(|| format!("failed to read {}", path.display()))
        }
    };
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .with_context(|| format!("failed to open {}", path.display()))?;
    if !existing.is_empty() && !existing.ends_with('\n') {
        writeln!(file)?;
    }
    for url in urls {
        writeln!(file, "{}", url)?;
    }
    Ok(urls.len())
}
