use crate::util::run_with_timeout;
use anyhow::Context;
use harvest_core::{ValidationReport, Validator};
use std::path::Path;
use std::process::Command;
use std::time::Duration;

/// Runs `<bin> -validate -t <path>`; exit 0 is a pass, anything else a
/// failure with stderr as diagnostics.
#[derive(Debug, Clone)]
pub struct ExternalValidator {
    bin: String,
    timeout: Duration,
}

impl ExternalValidator {
    pub fn new(bin: impl Into<String>, timeout: Duration) -> Self {
        Self {
            bin: bin.into(),
            timeout,
        }
    }
}

impl Validator for ExternalValidator {
    fn validate(&self, path: &Path) -> anyhow::Result<ValidationReport> {
        let mut cmd = Command::new(&self.bin);
        cmd.arg("-validate").arg("-t").arg(path);
        let output = run_with_timeout(&mut cmd, self.timeout)
            .with_context(|| format!("validator {} could not be run", self.bin))?;

        if output.timed_out {
            return Ok(ValidationReport {
                passed: false,
                diagnostics: format!("validator timed out after {}s", self.timeout.as_secs()),
                timed_out: true,
            });
        }
        if output.success() {
            return Ok(ValidationReport::pass());
        }
        let diagnostics = if output.stderr.trim().is_empty() {
            output.stdout
        } else {
            output.stderr
        };
        Ok(ValidationReport::fail(diagnostics))
    }
}
