//! Seams between the engine and the outside world.
//!
//! The engine only talks to remotes, validators and operators through these
//! traits, so every stage can be driven deterministically in tests.

use std::future::Future;
use std::path::Path;
use std::pin::Pin;

pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Answer to a confirmation prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Decision {
    Yes,
    No,
    /// Yes, and stop asking for the rest of this run.
    All,
}

impl Decision {
    pub fn accepted(&self) -> bool {
        matches!(self, Decision::Yes | Decision::All)
    }

    /// Parse a console answer. Anything unrecognised is a refusal.
    pub fn from_answer(answer: &str) -> Self {
        match answer.trim().to_ascii_lowercase().as_str() {
            "y" | "yes" => Decision::Yes,
            "a" | "all" => Decision::All,
            _ => Decision::No,
        }
    }
}

/// What is being asked, so providers can log or script per kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PromptKind {
    RemoveDuplicate,
    ApplyFix,
    Confirm,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Prompt {
    pub kind: PromptKind,
    pub message: String,
    /// Whether "all" is a meaningful answer.
    pub allow_all: bool,
}

impl Prompt {
    pub fn new(kind: PromptKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            allow_all: true,
        }
    }

    pub fn yes_no(message: impl Into<String>) -> Self {
        Self {
            kind: PromptKind::Confirm,
            message: message.into(),
            allow_all: false,
        }
    }
}

/// Source of confirmation answers (console, fixed policy, script).
pub trait DecisionProvider {
    fn decide(&mut self, prompt: &Prompt) -> Decision;
}

/// Accepts every prompt. "All" is never returned; callers don't need it.
#[derive(Debug, Default, Clone, Copy)]
pub struct AutoAccept;

impl DecisionProvider for AutoAccept {
    fn decide(&mut self, _prompt: &Prompt) -> Decision {
        Decision::Yes
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct AutoReject;

impl DecisionProvider for AutoReject {
    fn decide(&mut self, _prompt: &Prompt) -> Decision {
        Decision::No
    }
}

/// Result of one external validator run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    pub passed: bool,
    /// Diagnostic text (stderr) from the validator.
    pub diagnostics: String,
    pub timed_out: bool,
}

impl ValidationReport {
    pub fn pass() -> Self {
        Self {
            passed: true,
            diagnostics: String::new(),
            timed_out: false,
        }
    }

    pub fn fail(diagnostics: impl Into<String>) -> Self {
        Self {
            passed: false,
            diagnostics: diagnostics.into(),
            timed_out: false,
        }
    }
}

/// Black-box template validator.
pub trait Validator {
    fn validate(&self, path: &Path) -> anyhow::Result<ValidationReport>;
}

/// Outcome of the HEAD-style reachability probe.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Reachability {
    Reachable,
    NotFound,
    Unreachable(String),
}

/// Remote lookups performed before a fetch.
pub trait RemoteProbe: Send + Sync {
    fn probe<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Reachability>;

    /// Current head revision of the remote, or `None` when it is not a
    /// fetchable repository.
    fn resolve_marker<'a>(&'a self, url: &'a str) -> BoxFuture<'a, Option<String>>;
}

/// Why a fetch did not produce a checkout.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FetchFailure {
    #[error("timed out after {0}s")]
    TimedOut(u64),
    #[error("exited with status {code:?}: {diagnostic}")]
    Exited {
        code: Option<i32>,
        diagnostic: String,
    },
    #[error("could not start fetch: {0}")]
    Spawn(String),
}

pub trait Fetcher: Send + Sync {
    fn fetch<'a>(&'a self, url: &'a str, destination: &'a Path)
        -> BoxFuture<'a, Result<(), FetchFailure>>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn decision_parses_console_answers() {
        assert_eq!(Decision::from_answer("y"), Decision::Yes);
        assert_eq!(Decision::from_answer(" YES \n"), Decision::Yes);
        assert_eq!(Decision::from_answer("a"), Decision::All);
        assert_eq!(Decision::from_answer("n"), Decision::No);
        assert_eq!(Decision::from_answer(""), Decision::No);
        assert_eq!(Decision::from_answer("maybe"), Decision::No);
    }

    #[test]
    fn auto_providers_are_constant() {
        let prompt = Prompt::new(PromptKind::ApplyFix, "apply?");
        assert_eq!(AutoAccept.decide(&prompt), Decision::Yes);
        assert_eq!(AutoReject.decide(&prompt), Decision::No);
        assert!(Decision::All.accepted());
        assert!(!Decision::No.accepted());
    }
}
