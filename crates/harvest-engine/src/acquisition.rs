//! Idempotent acquisition of candidate repositories.
//!
//! Each URL passes ledger lookup, reachability probe, head resolution and a
//! destination check before anything is cloned. Every URL that reaches the
//! network gets exactly one ledger line.

use anyhow::Context;
use harvest_adapters::candidates;
use harvest_adapters::git_ops::head_commit;
use harvest_adapters::{ErrorLog, Ledger};
use harvest_core::{AttemptOutcome, AttemptRecord, Fetcher, Reachability, RemoteProbe, RepoIdentity};
use std::collections::HashSet;
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AcquisitionSummary {
    /// Active URLs considered.
    pub total: usize,
    pub fetched: usize,
    pub failed: usize,
    /// Invalid or unreachable; these get commented out.
    pub invalid: usize,
    pub skipped_duplicate: usize,
    /// Lines that were already commented out before the run.
    pub already_inert: usize,
    /// Lines commented out by this run.
    pub commented_out: usize,
}

impl AcquisitionSummary {
    fn tally(&mut self, outcome: AttemptOutcome) {
        match outcome {
            AttemptOutcome::Valid => self.fetched += 1,
            AttemptOutcome::Failed => self.failed += 1,
            AttemptOutcome::Invalid | AttemptOutcome::Unreachable => self.invalid += 1,
            AttemptOutcome::Duplicate => self.skipped_duplicate += 1,
        }
    }
}

impl fmt::Display for AcquisitionSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Acquisition summary:")?;
        writeln!(f, "  Total URLs attempted: {}", self.total)?;
        writeln!(f, "  Successful clones:    {}", self.fetched)?;
        writeln!(f, "  Failed clones:        {}", self.failed)?;
        writeln!(f, "  Invalid URLs:         {} (commented out: {})", self.invalid, self.commented_out)?;
        writeln!(f, "  Skipped duplicates:   {}", self.skipped_duplicate)?;
        write!(f, "  Already inert:        {}", self.already_inert)
    }
}

pub struct Acquisition<'a> {
    probe: &'a dyn RemoteProbe,
    fetcher: &'a dyn Fetcher,
    clone_dir: PathBuf,
    error_log: &'a ErrorLog,
}

impl<'a> Acquisition<'a> {
    pub fn new(
        probe: &'a dyn RemoteProbe,
        fetcher: &'a dyn Fetcher,
        clone_dir: impl Into<PathBuf>,
        error_log: &'a ErrorLog,
    ) -> Self {
        Self {
            probe,
            fetcher,
            clone_dir: clone_dir.into(),
            error_log,
        }
    }

    /// Network checks and fetch for one URL not yet in the ledger.
    pub async fn attempt(&self, url: &str) -> AttemptOutcome {
        match self.probe.probe(url).await {
            Reachability::Reachable => {}
            Reachability::NotFound => {
                println!("  - {} returned 404", url);
                return AttemptOutcome::Unreachable;
            }
            Reachability::Unreachable(reason) => {
                println!("  - {} is unreachable", url);
                tracing::debug!(url, "probe failed: {}", reason);
                return AttemptOutcome::Unreachable;
            }
        }

        let Some(content_marker) = self.probe.resolve_marker(url).await else {
            println!("  - {} is not a repository", url);
            return AttemptOutcome::Invalid;
        };
        let identity = RepoIdentity {
            url: url.to_string(),
            content_marker,
        };

        let destination = self.clone_dir.join(identity.destination_name());
        if destination.exists() {
            println!(
                "  = {} at {} already fetched",
                url,
                identity.short_marker()
            );
            return AttemptOutcome::Duplicate;
        }

        match self.fetcher.fetch(url, &destination).await {
            Ok(()) => {
                verify_checkout(&destination, &identity);
                println!("  + {} -> {}", url, destination.display());
                AttemptOutcome::Valid
            }
            Err(failure) => {
                println!("  - clone of {} failed: {}", url, failure);
                self.error_log
                    .report(Path::new(url), "fetch-failed", &failure.to_string());
                AttemptOutcome::Failed
            }
        }
    }

    /// Process URLs in order, recording each new outcome in the ledger.
    /// Returns the tally and the URLs to retire from the candidate list.
    pub async fn acquire_urls(
        &self,
        ledger: &mut Ledger,
        urls: &[String],
    ) -> anyhow::Result<(AcquisitionSummary, HashSet<String>)> {
        let mut summary = AcquisitionSummary::default();
        let mut retired = HashSet::new();

        for url in urls {
            let url = url.trim();
            if url.is_empty() {
                continue;
            }
            summary.total += 1;
            if ledger.contains(url) {
                tracing::debug!(url, "already in ledger");
                println!("  = {} already attempted, skipping", url);
                summary.tally(AttemptOutcome::Duplicate);
                continue;
            }

            let outcome = self.attempt(url).await;
            ledger.record(&AttemptRecord::now(url, outcome))?;
            summary.tally(outcome);
            if outcome.retires_candidate() {
                retired.insert(url.to_string());
            }
        }

        Ok((summary, retired))
    }

    /// Acquire every active URL of a candidate list, then comment out the
    /// invalid and unreachable ones (after a `.bak` backup).
    pub async fn acquire_list(&self, ledger: &mut Ledger, list: &Path) -> anyhow::Result<AcquisitionSummary> {
        let urls: Vec<String> = candidates::read_active(list)?
            .into_iter()
            .map(|entry| entry.url)
            .collect();
        let already_inert = candidates::count_inert(list)?;

        let (mut summary, retired) = self.acquire_urls(ledger, &urls).await?;
        summary.already_inert = already_inert;
        summary.commented_out = candidates::comment_out(list, &retired)
            .with_context(|| format!("failed to retire URLs in {}", list.display()))?;
        Ok(summary)
    }
}

fn verify_checkout(destination: &Path, identity: &RepoIdentity) {
    match head_commit(destination) {
        Ok(head) if head != identity.content_marker => tracing::warn!(
            url = %identity.url,
            "remote moved during fetch: expected {}, checked out {}",
            identity.short_marker(),
            head
        ),
        Ok(_) => {}
        Err(err) => tracing::debug!(path = %destination.display(), "could not read checkout head: {}", err),
    }
}
