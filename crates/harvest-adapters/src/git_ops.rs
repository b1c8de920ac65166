//! Remote repository access through the `git` CLI, plus local HEAD reads
//! through libgit2.

use crate::util::{run_with_timeout, truncate};
use git2::Repository;
use harvest_core::{BoxFuture, FetchFailure, Fetcher, Reachability, RemoteProbe};
use std::path::Path;
use std::process::Command;
use std::time::Duration;

const DIAGNOSTIC_MAX_CHARS: usize = 240;

fn git_command() -> Command {
    let mut cmd = Command::new("git");
    cmd.env("GIT_TERMINAL_PROMPT", "0");
    cmd
}

fn is_http_url(url: &str) -> bool {
    let lower = url.trim().to_ascii_lowercase();
    lower.starts_with("http://") || lower.starts_with("https://")
}

fn is_object_id(token: &str) -> bool {
    matches!(token.len(), 40 | 64) && token.chars().all(|c| c.is_ascii_hexdigit())
}

/// Commit id the remote's HEAD points at, or `None` when the URL is not a
/// repository we can list.
pub fn ls_remote_head(url: &str, timeout: Duration) -> Option<String> {
    let mut cmd = git_command();
    cmd.args(["ls-remote", "--", url, "HEAD"]);
    let output = match run_with_timeout(&mut cmd, timeout) {
        Ok(output) => output,
        Err(e) => {
            tracing::warn!("git ls-remote: {:#}", e);
            return None;
        }
    };
    if !output.success() {
        tracing::debug!(
            url,
            timed_out = output.timed_out,
            "ls-remote failed: {}",
            truncate(output.stderr.trim(), DIAGNOSTIC_MAX_CHARS)
        );
        return None;
    }
    output
        .stdout
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .find(|token| is_object_id(token))
        .map(|token| token.to_ascii_lowercase())
}

/// Shallow, single-branch clone into `dest`. A failed or timed-out clone
/// leaves nothing behind at `dest`.
pub fn clone_shallow(url: &str, dest: &Path, timeout: Duration) -> Result<(), FetchFailure> {
    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent).map_err(|e| {
            FetchFailure::Spawn(format!("failed to create '{}': {}", parent.display(), e))
        })?;
    }

    let mut cmd = git_command();
    cmd.args(["clone", "--depth", "1", "--single-branch", "--", url])
        .arg(dest);
    let output = run_with_timeout(&mut cmd, timeout)
        .map_err(|e| FetchFailure::Spawn(format!("{:#}", e)))?;
    if output.success() {
        return Ok(());
    }

    if dest.exists() {
        let _ = std::fs::remove_dir_all(dest);
    }
    if output.timed_out {
        return Err(FetchFailure::TimedOut(timeout.as_secs()));
    }
    Err(FetchFailure::Exited {
        code: output.code(),
        diagnostic: truncate(output.stderr.trim(), DIAGNOSTIC_MAX_CHARS),
    })
}

/// Commit id checked out in a local repository.
pub fn head_commit(repo_path: &Path) -> anyhow::Result<String> {
    let repo = Repository::open(repo_path)?;
    let commit = repo.head()?.peel_to_commit()?;
    Ok(commit.id().to_string())
}

/// `RemoteProbe` and `Fetcher` backed by HTTP HEAD requests and the git CLI.
pub struct GitRemote {
    http: reqwest::Client,
    probe_timeout: Duration,
    clone_timeout: Duration,
}

impl GitRemote {
    pub fn new(probe_timeout: Duration, clone_timeout: Duration) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(probe_timeout)
            .user_agent("harvest-cli")
            .build()
            .map_err(|e| anyhow::anyhow!("Failed to create HTTP client: {}", e))?;
        Ok(Self {
            http,
            probe_timeout,
            clone_timeout,
        })
    }
}

impl RemoteProbe for GitRemote {
    fn probe<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Reachability> {
        Box::pin(async move {
            if !is_http_url(url) {
                return Reachability::Reachable;
            }
            match self.http.head(url.trim()).send().await {
                Ok(resp) if resp.status() == reqwest::StatusCode::NOT_FOUND => Reachability::NotFound,
                Ok(_) => Reachability::Reachable,
                Err(e) => Reachability::Unreachable(e.to_string()),
            }
        })
    }

    fn resolve_marker<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Option<String>> {
        Box::pin(async move {
            let url = url.trim().to_string();
            let timeout = self.probe_timeout;
            match tokio::task::spawn_blocking(move || ls_remote_head(&url, timeout)).await {
                Ok(marker) => marker,
                Err(e) => {
                    tracing::warn!("ls-remote task failed: {}", e);
                    None
                }
            }
        })
    }
}

impl Fetcher for GitRemote {
    fn fetch<'a>(&'a self, url: &'a str, destination: &'a Path) -> BoxFuture<'a, Result<(), FetchFailure>> {
        Box::pin(async move {
            let url = url.trim().to_string();
            let dest = destination.to_path_buf();
            let timeout = self.clone_timeout;
            tokio::task::spawn_blocking(move || clone_shallow(&url, &dest, timeout))
                .await
                .map_err(|e| FetchFailure::Spawn(format!("clone task failed: {}", e)))?
        })
    }
}
