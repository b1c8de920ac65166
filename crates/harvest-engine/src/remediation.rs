//! Validate-classify-fix loop over a template tree.
//!
//! Each file is validated once, fixed where the operator (or the run's
//! policy) agrees, and re-validated at most once. Anything left unresolved
//! goes to the error log; files are never deleted here.

use crate::dedup::{dedup_tree, DedupSummary};
use harvest_adapters::ErrorLog;
use harvest_core::identity::walk;
use harvest_core::template::{
    apply_fix, classify, has_template_extension, propose_fix, EnumRule, Issue, RemediationPolicy,
    TemplateError,
};
use harvest_core::{DecisionProvider, Prompt, PromptKind, TemplateFile, ValidationState, Validator};
use std::fmt;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemediationSummary {
    pub files: usize,
    pub valid: usize,
    /// Files that passed re-validation after fixes.
    pub successful_fixes: usize,
    /// Files whose fixes did not make them pass.
    pub failed_fixes: usize,
    pub fixes_applied: usize,
    pub unfixable: usize,
    /// Entries written to the error log.
    pub unresolved_errors: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RemediationReport {
    pub dedup: DedupSummary,
    pub templates: RemediationSummary,
}

impl fmt::Display for RemediationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let d = &self.dedup;
        let t = &self.templates;
        writeln!(f, "Validation summary:")?;
        writeln!(f, "  Duplicate directories removed: {}", d.directories.removed)?;
        writeln!(f, "  Duplicate directories ignored: {}", d.directories.ignored)?;
        writeln!(f, "  Duplicate templates removed:   {}", d.files.removed)?;
        writeln!(f, "  Duplicate templates ignored:   {}", d.files.ignored)?;
        writeln!(f, "  Templates checked:             {}", t.files)?;
        writeln!(f, "  Successful fixes:              {}", t.successful_fixes)?;
        writeln!(f, "  Failed fixes:                  {}", t.failed_fixes)?;
        write!(f, "  Unresolved errors:             {}", t.unresolved_errors)
    }
}

pub struct Remediator<'a> {
    validator: &'a dyn Validator,
    error_log: &'a ErrorLog,
    enum_rules: &'a [EnumRule],
}

impl<'a> Remediator<'a> {
    pub fn new(validator: &'a dyn Validator, error_log: &'a ErrorLog, enum_rules: &'a [EnumRule]) -> Self {
        Self {
            validator,
            error_log,
            enum_rules,
        }
    }

    fn unresolved(&self, summary: &mut RemediationSummary, path: &Path, category: &str, detail: &str) {
        summary.unresolved_errors += 1;
        self.error_log.report(path, category, detail);
    }

    /// Run one file through the state machine. Only a validator that cannot
    /// be run at all is an error.
    pub fn remediate_file(
        &self,
        template: &mut TemplateFile,
        policy: &mut RemediationPolicy,
        decisions: &mut dyn DecisionProvider,
        summary: &mut RemediationSummary,
    ) -> anyhow::Result<ValidationState> {
        summary.files += 1;
        let state = self.run_file(template, policy, decisions, summary)?;
        template.validation_state = state;
        match state {
            ValidationState::Valid => summary.valid += 1,
            ValidationState::Fixed => summary.successful_fixes += 1,
            ValidationState::Unfixable => summary.unfixable += 1,
            ValidationState::Unchecked => {}
        }
        Ok(state)
    }

    fn run_file(
        &self,
        template: &mut TemplateFile,
        policy: &mut RemediationPolicy,
        decisions: &mut dyn DecisionProvider,
        summary: &mut RemediationSummary,
    ) -> anyhow::Result<ValidationState> {
        let path = template.path.clone();
        let report = self.validator.validate(&path)?;
        if report.passed {
            return Ok(ValidationState::Valid);
        }

        println!("\nError in {}:", path.display());
        if report.timed_out {
            println!("  {}", report.diagnostics);
            self.unresolved(summary, &path, "validator-timeout", &report.diagnostics);
            return Ok(ValidationState::Unfixable);
        }
        println!("{}", report.diagnostics.trim_end());

        let issues = classify(&report.diagnostics, self.enum_rules);
        if let Some(Issue::Unparseable { detail }) =
            issues.iter().find(|i| matches!(i, Issue::Unparseable { .. }))
        {
            println!("  YAML syntax error, manual fix required.");
            self.unresolved(summary, &path, "unparseable", detail);
            return Ok(ValidationState::Unfixable);
        }

        if let Err(err) = template.load().map(|_| ()) {
            let category = match err {
                TemplateError::Parse { .. } => "unparseable",
                _ => "unreadable",
            };
            println!("  {}", err);
            self.unresolved(summary, &path, category, &err.to_string());
            return Ok(ValidationState::Unfixable);
        }

        let mut applied = 0;
        for issue in &issues {
            if !issue.auto_fixable() {
                println!("  {}; manual fix required.", issue.describe());
                self.unresolved(summary, &path, issue.category(), &issue.describe());
                continue;
            }
            let Some(doc) = template.parsed_structure.as_mut() else {
                break;
            };
            let Some(fix) = propose_fix(issue, doc, self.enum_rules) else {
                println!("  {}; no automatic fix applies.", issue.describe());
                self.unresolved(summary, &path, issue.category(), &issue.describe());
                continue;
            };

            let accepted = if policy.is_auto(&fix) {
                println!("  Applying fix: {}", fix.summary());
                true
            } else {
                println!("  Proposed fix: {}", fix.summary());
                let prompt = Prompt::new(
                    PromptKind::ApplyFix,
                    format!("Apply this fix? (a = all future '{}' fixes)", fix.field()),
                );
                let decision = decisions.decide(&prompt);
                policy.record(&fix, decision).is_some()
            };
            if !accepted {
                self.unresolved(
                    summary,
                    &path,
                    issue.category(),
                    &format!("declined: {}", fix.summary()),
                );
                continue;
            }
            if apply_fix(doc, &fix, self.enum_rules) {
                applied += 1;
            }
        }

        if applied == 0 {
            return Ok(ValidationState::Unfixable);
        }
        if let Err(err) = template.save() {
            println!("  {}", err);
            self.unresolved(summary, &path, "write-failed", &err.to_string());
            return Ok(ValidationState::Unfixable);
        }
        summary.fixes_applied += applied;

        let recheck = self.validator.validate(&path)?;
        if recheck.passed {
            println!("  Fixed {}", path.display());
            return Ok(ValidationState::Fixed);
        }
        println!("  Still invalid after fixes: {}", path.display());
        summary.failed_fixes += 1;
        let category = if recheck.timed_out {
            "validator-timeout"
        } else {
            "revalidation-failed"
        };
        self.unresolved(summary, &path, category, &recheck.diagnostics);
        Ok(ValidationState::Unfixable)
    }

    /// Every template file below `root`, in stable walk order.
    pub fn template_paths(root: &Path, extensions: &[String], control_dirs: &[String]) -> Vec<PathBuf> {
        walk(root, control_dirs)
            .filter_map(|entry| match entry {
                Ok(entry) => Some(entry),
                Err(err) => {
                    tracing::warn!("skipping unreadable entry: {}", err);
                    None
                }
            })
            .filter(|entry| entry.file_type().is_file())
            .filter(|entry| has_template_extension(&entry.file_name().to_string_lossy(), extensions))
            .map(|entry| entry.into_path())
            .collect()
    }

    pub fn remediate_paths(
        &self,
        paths: &[PathBuf],
        policy: &mut RemediationPolicy,
        decisions: &mut dyn DecisionProvider,
    ) -> anyhow::Result<RemediationSummary> {
        let mut summary = RemediationSummary::default();
        for path in paths {
            let mut template = TemplateFile::new(path);
            self.remediate_file(&mut template, policy, decisions, &mut summary)?;
        }
        Ok(summary)
    }
}

/// Where and how to remediate.
pub struct RemediationSettings<'a> {
    pub root: &'a Path,
    pub extensions: &'a [String],
    pub control_dirs: &'a [String],
    pub enum_rules: &'a [EnumRule],
}

/// Dedup the tree, then validate and fix every template in it. The fix
/// policy lives for exactly this call.
pub fn remediate_tree(
    settings: &RemediationSettings<'_>,
    validator: &dyn Validator,
    decisions: &mut dyn DecisionProvider,
    error_log: &ErrorLog,
) -> anyhow::Result<RemediationReport> {
    let dedup = dedup_tree(settings.root, settings.control_dirs, decisions, error_log)?;

    println!("Validating templates...");
    let paths = Remediator::template_paths(settings.root, settings.extensions, settings.control_dirs);
    let mut policy = RemediationPolicy::new();
    let remediator = Remediator::new(validator, error_log, settings.enum_rules);
    let templates = remediator.remediate_paths(&paths, &mut policy, decisions)?;
    tracing::debug!(decisions = policy.decisions().len(), "remediation finished");

    Ok(RemediationReport { dedup, templates })
}

#[cfg(test)]
mod tests {
    use super::*;
    use harvest_core::template::{default_enum_rules, default_template_extensions};
    use harvest_core::{AutoAccept, AutoReject, Decision, ValidationReport};
    use std::cell::RefCell;
    use std::collections::VecDeque;
    use std::fs;

    /// Fails while the file contains any of the listed fragments, reporting
    /// the paired diagnostic.
    struct FakeValidator {
        rules: Vec<(&'static str, &'static str)>,
        calls: RefCell<Vec<PathBuf>>,
    }

    impl FakeValidator {
        fn new(rules: &[(&'static str, &'static str)]) -> Self {
            Self {
                rules: rules.to_vec(),
                calls: RefCell::new(Vec::new()),
            }
        }

        fn calls_for(&self, path: &Path) -> usize {
            self.calls.borrow().iter().filter(|p| p.as_path() == path).count()
        }
    }

    impl Validator for FakeValidator {
        fn validate(&self, path: &Path) -> anyhow::Result<ValidationReport> {
            self.calls.borrow_mut().push(path.to_path_buf());
            let content = fs::read_to_string(path)?;
            let diagnostics: Vec<&str> = self
                .rules
                .iter()
                .filter(|(fragment, _)| content.contains(fragment))
                .map(|(_, diagnostic)| *diagnostic)
                .collect();
            if diagnostics.is_empty() {
                Ok(ValidationReport::pass())
            } else {
                Ok(ValidationReport::fail(diagnostics.join("\n")))
            }
        }
    }

    struct Scripted {
        answers: VecDeque<Decision>,
        asked: usize,
    }

    impl DecisionProvider for Scripted {
        fn decide(&mut self, _prompt: &Prompt) -> Decision {
            self.asked += 1;
            self.answers.pop_front().unwrap_or(Decision::No)
        }
    }

    fn run_one(
        path: &Path,
        validator: &FakeValidator,
        decisions: &mut dyn DecisionProvider,
        log: &ErrorLog,
    ) -> (ValidationState, RemediationSummary) {
        let rules = default_enum_rules();
        let remediator = Remediator::new(validator, log, &rules);
        let mut policy = RemediationPolicy::new();
        let mut summary = RemediationSummary::default();
        let mut template = TemplateFile::new(path);
        let state = remediator
            .remediate_file(&mut template, &mut policy, decisions, &mut summary)
            .unwrap();
        assert_eq!(template.validation_state, state);
        (state, summary)
    }

    #[test]
    fn valid_file_is_left_alone() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("ok.yaml");
        fs::write(&path, "id: ok\n# keep me\n").unwrap();
        let validator = FakeValidator::new(&[]);
        let log = ErrorLog::new(tmp.path().join("errors.jsonl"));

        let (state, summary) = run_one(&path, &validator, &mut AutoReject, &log);
        assert_eq!(state, ValidationState::Valid);
        assert_eq!(summary.valid, 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), "id: ok\n# keep me\n");
    }

    #[test]
    fn invalid_attack_is_defaulted_with_one_revalidation() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("t.yaml");
        fs::write(&path, "id: t\nattack: \"bogus\"\n").unwrap();
        let validator = FakeValidator::new(&[("bogus", "invalid value 'bogus' for 'attack'")]);
        let log = ErrorLog::new(tmp.path().join("errors.jsonl"));

        let (state, summary) = run_one(&path, &validator, &mut AutoAccept, &log);
        assert_eq!(state, ValidationState::Fixed);
        assert_eq!(validator.calls_for(&path), 2);
        assert_eq!(summary.successful_fixes, 1);
        assert_eq!(summary.fixes_applied, 1);

        let doc: serde_yaml::Value = serde_yaml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(doc.get("attack").and_then(|v| v.as_str()), Some("network"));
        assert!(!log.path().exists());
    }

    #[test]
    fn unknown_field_removed_and_rest_preserved() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("t.yaml");
        fs::write(&path, "id: t\nrisk: high\ninfo:\n  name: x\n").unwrap();
        let validator = FakeValidator::new(&[("risk:", "line 2: field risk not found in type templates.Template")]);
        let log = ErrorLog::new(tmp.path().join("errors.jsonl"));

        let (state, _) = run_one(&path, &validator, &mut AutoAccept, &log);
        assert_eq!(state, ValidationState::Fixed);
        let doc: serde_yaml::Value = serde_yaml::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        let expected: serde_yaml::Value = serde_yaml::from_str("id: t\ninfo:\n  name: x\n").unwrap();
        assert_eq!(doc, expected);
    }

    #[test]
    fn fix_that_does_not_help_is_unfixable_after_one_recheck() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("t.yaml");
        fs::write(&path, "id: \"My Template!!\"\nname: broken\n").unwrap();
        let validator = FakeValidator::new(&[
            ("Template!!", "invalid field format for 'id'"),
            ("broken", "some other problem"),
        ]);
        let log = ErrorLog::new(tmp.path().join("errors.jsonl"));

        let (state, summary) = run_one(&path, &validator, &mut AutoAccept, &log);
        assert_eq!(state, ValidationState::Unfixable);
        assert_eq!(validator.calls_for(&path), 2);
        assert_eq!(summary.failed_fixes, 1);
        assert!(fs::read_to_string(&path).unwrap().contains("My_Template"));
        assert!(path.exists());
        let entries = fs::read_to_string(log.path()).unwrap();
        assert!(entries.contains("revalidation-failed"));
    }

    #[test]
    fn syntax_errors_skip_remediation() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("t.yaml");
        let original = "id: t\ninfo: [unclosed\n";
        fs::write(&path, original).unwrap();
        let validator = FakeValidator::new(&[("unclosed", "yaml: line 2: did not find expected ',' or ']'")]);
        let log = ErrorLog::new(tmp.path().join("errors.jsonl"));
        let mut decisions = Scripted {
            answers: VecDeque::new(),
            asked: 0,
        };

        let (state, summary) = run_one(&path, &validator, &mut decisions, &log);
        assert_eq!(state, ValidationState::Unfixable);
        assert_eq!(decisions.asked, 0);
        assert_eq!(validator.calls_for(&path), 1);
        assert_eq!(summary.unresolved_errors, 1);
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
        assert!(fs::read_to_string(log.path()).unwrap().contains("unparseable"));
    }

    #[test]
    fn structural_mismatch_needs_a_human() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("t.yaml");
        fs::write(&path, "id: t\nheaders:\n  - a\n").unwrap();
        let validator = FakeValidator::new(&[(
            "headers",
            "line 2: cannot unmarshal !!seq into map[string]string",
        )]);
        let log = ErrorLog::new(tmp.path().join("errors.jsonl"));

        let (state, summary) = run_one(&path, &validator, &mut AutoAccept, &log);
        assert_eq!(state, ValidationState::Unfixable);
        assert_eq!(summary.unresolved_errors, 1);
        assert_eq!(validator.calls_for(&path), 1);
    }

    #[test]
    fn declined_fix_leaves_file_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("t.yaml");
        let original = "id: t\nrisk: high\n";
        fs::write(&path, original).unwrap();
        let validator = FakeValidator::new(&[("risk:", "field risk not found")]);
        let log = ErrorLog::new(tmp.path().join("errors.jsonl"));

        let (state, _) = run_one(&path, &validator, &mut AutoReject, &log);
        assert_eq!(state, ValidationState::Unfixable);
        assert_eq!(fs::read_to_string(&path).unwrap(), original);
    }

    #[test]
    fn all_answer_applies_to_later_files_without_asking() {
        let tmp = tempfile::tempdir().unwrap();
        let first = tmp.path().join("a.yaml");
        let second = tmp.path().join("b.yaml");
        fs::write(&first, "id: a\nrisk: high\n").unwrap();
        fs::write(&second, "id: b\nrisk: low\n").unwrap();
        let validator = FakeValidator::new(&[("risk:", "field risk not found")]);
        let log = ErrorLog::new(tmp.path().join("errors.jsonl"));
        let rules = default_enum_rules();
        let remediator = Remediator::new(&validator, &log, &rules);
        let mut policy = RemediationPolicy::new();
        let mut decisions = Scripted {
            answers: VecDeque::from(vec![Decision::All]),
            asked: 0,
        };

        let summary = remediator
            .remediate_paths(&[first.clone(), second.clone()], &mut policy, &mut decisions)
            .unwrap();
        assert_eq!(decisions.asked, 1);
        assert_eq!(summary.successful_fixes, 2);
        assert!(!fs::read_to_string(&second).unwrap().contains("risk"));
    }

    /// Removes a directory the first time it is asked, then accepts.
    struct RemoveDirOnAsk {
        dir: PathBuf,
    }

    impl DecisionProvider for RemoveDirOnAsk {
        fn decide(&mut self, _prompt: &Prompt) -> Decision {
            if self.dir.exists() {
                fs::remove_dir_all(&self.dir).unwrap();
            }
            Decision::Yes
        }
    }

    #[test]
    fn failed_write_is_logged_and_later_files_still_run() {
        let tmp = tempfile::tempdir().unwrap();
        let gone = tmp.path().join("gone/a.yaml");
        let kept = tmp.path().join("kept/b.yaml");
        fs::create_dir_all(gone.parent().unwrap()).unwrap();
        fs::create_dir_all(kept.parent().unwrap()).unwrap();
        fs::write(&gone, "id: a\nrisk: high\n").unwrap();
        fs::write(&kept, "id: b\nrisk: low\n").unwrap();
        let validator = FakeValidator::new(&[("risk:", "field risk not found")]);
        let log = ErrorLog::new(tmp.path().join("errors.jsonl"));
        let rules = default_enum_rules();
        let remediator = Remediator::new(&validator, &log, &rules);
        let mut policy = RemediationPolicy::new();
        let mut decisions = RemoveDirOnAsk {
            dir: tmp.path().join("gone"),
        };

        let summary = remediator
            .remediate_paths(&[gone.clone(), kept.clone()], &mut policy, &mut decisions)
            .unwrap();
        assert_eq!(summary.files, 2);
        assert_eq!(summary.unfixable, 1);
        assert_eq!(summary.successful_fixes, 1);
        assert_eq!(summary.fixes_applied, 1);
        assert_eq!(summary.unresolved_errors, 1);
        assert_eq!(validator.calls_for(&gone), 1);
        assert_eq!(validator.calls_for(&kept), 2);
        let logged = fs::read_to_string(tmp.path().join("errors.jsonl")).unwrap();
        assert!(logged.contains("write-failed"));
        assert!(!fs::read_to_string(&kept).unwrap().contains("risk"));
    }

    #[test]
    fn tree_run_dedups_then_validates_templates_only() {
        let tmp = tempfile::tempdir().unwrap();
        let root = tmp.path().join("corpus");
        fs::create_dir_all(root.join("repo/.git")).unwrap();
        fs::create_dir_all(root.join("repo/http")).unwrap();
        fs::write(root.join("repo/http/a.yaml"), "id: a\n").unwrap();
        fs::write(root.join("repo/http/copy.yml"), "id: a\n").unwrap();
        fs::write(root.join("repo/README.md"), "readme").unwrap();
        fs::write(root.join("repo/.git/config.yaml"), "ignored").unwrap();

        let validator = FakeValidator::new(&[]);
        let log = ErrorLog::new(tmp.path().join("errors.jsonl"));
        let extensions = default_template_extensions();
        let control_dirs = harvest_core::identity::default_control_dirs();
        let rules = default_enum_rules();
        let settings = RemediationSettings {
            root: &root,
            extensions: &extensions,
            control_dirs: &control_dirs,
            enum_rules: &rules,
        };

        let report = remediate_tree(&settings, &validator, &mut AutoAccept, &log).unwrap();
        assert_eq!(report.dedup.files.removed, 1);
        assert_eq!(report.templates.files, 1);
        assert_eq!(report.templates.valid, 1);
        assert!(!root.join("repo/http/copy.yml").exists());
        assert_eq!(validator.calls.borrow().len(), 1);
    }
}
