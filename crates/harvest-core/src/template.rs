//! Template diagnostics classification and structural fixes.
//!
//! Fixes operate on the parsed YAML tree and the whole document is
//! re-serialized afterwards, so a fixed file is always well-formed YAML.
//! Comments and original formatting are not preserved.

use crate::model::{FixDecision, FixScope, TemplateFile};
use crate::protocol::Decision;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::{HashSet, VecDeque};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// Identifiers must match this after normalization.
pub const IDENTIFIER_PATTERN: &str = r"^[a-zA-Z0-9]+(-[a-zA-Z0-9]+|_[a-zA-Z0-9]+)*$";

const IDENTIFIER_FIELD: &str = "id";
const DETAIL_MAX_CHARS: usize = 240;

/// A field restricted to a fixed set of values.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnumRule {
    pub field: String,
    pub allowed: Vec<String>,
    /// Replacement used when the current value is not allowed.
    pub default: String,
}

impl EnumRule {
    pub fn allows(&self, value: &str) -> bool {
        self.allowed.iter().any(|allowed| allowed == value)
    }
}

pub fn default_enum_rules() -> Vec<EnumRule> {
    vec![EnumRule {
        field: "attack".to_string(),
        allowed: ["network", "clusterbomb", "pitchfork", "batteringram"]
            .iter()
            .map(|s| s.to_string())
            .collect(),
        default: "network".to_string(),
    }]
}

/// One problem recognised in validator output.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Issue {
    UnknownField { field: String, line: Option<u32> },
    MalformedIdentifier,
    InvalidEnumValue { field: String },
    StructuralMismatch { detail: String },
    Unparseable { detail: String },
    Unrecognized { detail: String },
}

impl Issue {
    pub fn category(&self) -> &'static str {
        match self {
            Issue::UnknownField { .. } => "unknown-field",
            Issue::MalformedIdentifier => "malformed-identifier",
            Issue::InvalidEnumValue { .. } => "invalid-enum-value",
            Issue::StructuralMismatch { .. } => "structural-mismatch",
            Issue::Unparseable { .. } => "unparseable",
            Issue::Unrecognized { .. } => "unrecognized",
        }
    }

    /// Whether a fix can be computed without a human.
    pub fn auto_fixable(&self) -> bool {
        matches!(
            self,
            Issue::UnknownField { .. } | Issue::MalformedIdentifier | Issue::InvalidEnumValue { .. }
        )
    }

    pub fn describe(&self) -> String {
        match self {
            Issue::UnknownField { field, line: Some(line) } => {
                format!("unknown field '{}' (line {})", field, line)
            }
            Issue::UnknownField { field, line: None } => format!("unknown field '{}'", field),
            Issue::MalformedIdentifier => "template id does not match the required pattern".to_string(),
            Issue::InvalidEnumValue { field } => format!("'{}' holds a value outside its allowed set", field),
            Issue::StructuralMismatch { detail } => format!("structural mismatch: {}", detail),
            Issue::Unparseable { detail } => format!("unparseable: {}", detail),
            Issue::Unrecognized { detail } => format!("unrecognized error: {}", detail),
        }
    }
}

struct Patterns {
    unknown_field: Regex,
    structural: Regex,
    identifier: Regex,
    enum_value: Regex,
    enum_type: Regex,
    syntax: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| Patterns {
        unknown_field: Regex::new(r"(?:line (\d+): )?field (\w+) not found").expect("valid regex"),
        structural: Regex::new(r"cannot unmarshal !!\w+(?: `[^`]*`)? into \S+").expect("valid regex"),
        identifier: Regex::new(r"(?i)invalid field format for '?id'?|invalid (?:template )?id\b")
            .expect("valid regex"),
        enum_value: Regex::new(r"(?i)invalid value (?:'[^']*' |\S+ )?for (?:field )?'?(\w+)'?")
            .expect("valid regex"),
        enum_type: Regex::new(r"(?i)invalid (\w+) type").expect("valid regex"),
        syntax: Regex::new(r"yaml: line \d+:").expect("valid regex"),
    })
}

fn identifier_regex() -> &'static Regex {
    static ID: OnceLock<Regex> = OnceLock::new();
    ID.get_or_init(|| Regex::new(IDENTIFIER_PATTERN).expect("valid regex"))
}

/// Classify validator diagnostics into issues, in order of first appearance.
/// Output that matches nothing known yields a single `Unrecognized` issue.
pub fn classify(diagnostics: &str, enum_rules: &[EnumRule]) -> Vec<Issue> {
    let p = patterns();
    let mut issues: Vec<Issue> = Vec::new();
    fn push(issue: Issue, issues: &mut Vec<Issue>) {
        if !issues.contains(&issue) {
            issues.push(issue);
        }
    }

    for line in diagnostics.lines() {
        let mut matched = false;
        for caps in p.unknown_field.captures_iter(line) {
            let field = caps[2].to_string();
            let line_no = caps.get(1).and_then(|m| m.as_str().parse().ok());
            if !issues
                .iter()
                .any(|i| matches!(i, Issue::UnknownField { field: f, .. } if *f == field))
            {
                push(Issue::UnknownField { field, line: line_no }, &mut issues);
            }
            matched = true;
        }
        if matched {
            continue;
        }
        if let Some(m) = p.structural.find(line) {
            push(
                Issue::StructuralMismatch {
                    detail: m.as_str().to_string(),
                },
                &mut issues,
            );
            continue;
        }
        if p.identifier.is_match(line) {
            push(Issue::MalformedIdentifier, &mut issues);
            continue;
        }
        let enum_field = p
            .enum_value
            .captures(line)
            .or_else(|| p.enum_type.captures(line))
            .map(|caps| caps[1].to_string())
            .filter(|field| enum_rules.iter().any(|rule| rule.field == *field));
        if let Some(field) = enum_field {
            push(Issue::InvalidEnumValue { field }, &mut issues);
            continue;
        }
        if p.syntax.is_match(line) {
            push(
                Issue::Unparseable {
                    detail: clip(line.trim()),
                },
                &mut issues,
            );
        }
    }

    if issues.is_empty() {
        let detail = diagnostics
            .lines()
            .map(str::trim)
            .find(|line| !line.is_empty())
            .unwrap_or("validator reported failure without diagnostics");
        issues.push(Issue::Unrecognized {
            detail: clip(detail),
        });
    }
    issues
}

fn clip(text: &str) -> String {
    if text.chars().count() <= DETAIL_MAX_CHARS {
        return text.to_string();
    }
    let mut out: String = text.chars().take(DETAIL_MAX_CHARS - 3).collect();
    out.push_str("...");
    out
}

/// Rewrite an identifier into `IDENTIFIER_PATTERN`: every character outside
/// `[A-Za-z0-9-]` becomes `_`, separator runs collapse to one character (`-`
/// only when the run is all hyphens), and leading/trailing separators are
/// dropped.
pub fn normalize_identifier(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending: Option<char> = None;
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() {
            if let Some(sep) = pending.take() {
                if !out.is_empty() {
                    out.push(sep);
                }
            }
            out.push(ch);
        } else {
            let sep = if ch == '-' { '-' } else { '_' };
            pending = Some(match pending {
                None => sep,
                Some('-') if sep == '-' => '-',
                Some(_) => '_',
            });
        }
    }
    out
}

pub fn is_valid_identifier(id: &str) -> bool {
    identifier_regex().is_match(id)
}

/// A concrete, reviewable change to a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fix {
    RemoveField { field: String },
    RewriteIdentifier { from: String, to: String },
    ReplaceEnum { field: String, from: String, to: String },
}

impl Fix {
    /// Key under which an "apply to all" answer is remembered.
    pub fn policy_key(&self) -> String {
        match self {
            Fix::RemoveField { field } => format!("remove:{}", field),
            Fix::RewriteIdentifier { .. } => format!("rewrite:{}", IDENTIFIER_FIELD),
            Fix::ReplaceEnum { field, .. } => format!("default:{}", field),
        }
    }

    pub fn field(&self) -> &str {
        match self {
            Fix::RemoveField { field } | Fix::ReplaceEnum { field, .. } => field,
            Fix::RewriteIdentifier { .. } => IDENTIFIER_FIELD,
        }
    }

    /// Before/after line for the operator.
    pub fn summary(&self) -> String {
        match self {
            Fix::RemoveField { field } => format!("remove '{}'", field),
            Fix::RewriteIdentifier { from, to } => format!("id: '{}' -> '{}'", from, to),
            Fix::ReplaceEnum { field, from, to } => format!("{}: '{}' -> '{}'", field, from, to),
        }
    }

    pub fn decision(&self, scope: FixScope) -> FixDecision {
        let proposed_value = match self {
            Fix::RemoveField { .. } => None,
            Fix::RewriteIdentifier { to, .. } | Fix::ReplaceEnum { to, .. } => Some(to.clone()),
        };
        FixDecision {
            field_or_attribute: self.field().to_string(),
            proposed_value,
            scope,
        }
    }
}

/// Compute the fix for an issue against the current document, if one exists.
pub fn propose_fix(issue: &Issue, doc: &Value, enum_rules: &[EnumRule]) -> Option<Fix> {
    match issue {
        Issue::UnknownField { field, .. } => shallowest_holder(doc, field).map(|_| Fix::RemoveField {
            field: field.clone(),
        }),
        Issue::MalformedIdentifier => {
            let current = doc.get(IDENTIFIER_FIELD).and_then(scalar_text)?;
            let normalized = normalize_identifier(&current);
            if normalized == current || !is_valid_identifier(&normalized) {
                return None;
            }
            Some(Fix::RewriteIdentifier {
                from: current,
                to: normalized,
            })
        }
        Issue::InvalidEnumValue { field } => {
            let rule = enum_rules.iter().find(|rule| rule.field == *field)?;
            let from = first_disallowed(doc, rule)?;
            Some(Fix::ReplaceEnum {
                field: field.clone(),
                from,
                to: rule.default.clone(),
            })
        }
        Issue::StructuralMismatch { .. } | Issue::Unparseable { .. } | Issue::Unrecognized { .. } => None,
    }
}

/// Apply a fix in place. Returns false when the document no longer needs it.
///
/// `RemoveField` removes the key from the shallowest mapping holding it;
/// `ReplaceEnum` replaces every disallowed occurrence of the field.
pub fn apply_fix(doc: &mut Value, fix: &Fix, enum_rules: &[EnumRule]) -> bool {
    match fix {
        Fix::RemoveField { field } => {
            let Some(path) = shallowest_holder(doc, field) else {
                return false;
            };
            match navigate_mut(doc, &path) {
                Some(Value::Mapping(map)) => map.remove(field.as_str()).is_some(),
                _ => false,
            }
        }
        Fix::RewriteIdentifier { to, .. } => match doc {
            Value::Mapping(map) => {
                map.insert(
                    Value::String(IDENTIFIER_FIELD.to_string()),
                    Value::String(to.clone()),
                );
                true
            }
            _ => false,
        },
        Fix::ReplaceEnum { field, to, .. } => {
            let Some(rule) = enum_rules.iter().find(|rule| rule.field == *field) else {
                return false;
            };
            replace_disallowed(doc, rule, to) > 0
        }
    }
}

#[derive(Debug, Clone)]
enum Seg {
    Key(Value),
    Index(usize),
}

fn shallowest_holder(doc: &Value, key: &str) -> Option<Vec<Seg>> {
    let mut queue: VecDeque<(Vec<Seg>, &Value)> = VecDeque::new();
    queue.push_back((Vec::new(), doc));
    while let Some((path, node)) = queue.pop_front() {
        match node {
            Value::Mapping(map) => {
                if map.contains_key(key) {
                    return Some(path);
                }
                for (k, v) in map {
                    let mut next = path.clone();
                    next.push(Seg::Key(k.clone()));
                    queue.push_back((next, v));
                }
            }
            Value::Sequence(items) => {
                for (idx, v) in items.iter().enumerate() {
                    let mut next = path.clone();
                    next.push(Seg::Index(idx));
                    queue.push_back((next, v));
                }
            }
            _ => {}
        }
    }
    None
}

fn navigate_mut<'a>(doc: &'a mut Value, path: &[Seg]) -> Option<&'a mut Value> {
    let mut node = doc;
    for seg in path {
        node = match (seg, node) {
            (Seg::Key(key), Value::Mapping(map)) => map.get_mut(key)?,
            (Seg::Index(idx), Value::Sequence(items)) => items.get_mut(*idx)?,
            _ => return None,
        };
    }
    Some(node)
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}

fn first_disallowed(doc: &Value, rule: &EnumRule) -> Option<String> {
    match doc {
        Value::Mapping(map) => {
            if let Some(value) = map.get(rule.field.as_str()) {
                let text = scalar_text(value).unwrap_or_default();
                if !rule.allows(&text) {
                    return Some(text);
                }
            }
            map.values().find_map(|v| first_disallowed(v, rule))
        }
        Value::Sequence(items) => items.iter().find_map(|v| first_disallowed(v, rule)),
        _ => None,
    }
}

fn replace_disallowed(doc: &mut Value, rule: &EnumRule, to: &str) -> usize {
    match doc {
        Value::Mapping(map) => {
            let mut replaced = 0;
            if let Some(value) = map.get_mut(rule.field.as_str()) {
                let text = scalar_text(value).unwrap_or_default();
                if !rule.allows(&text) {
                    *value = Value::String(to.to_string());
                    replaced += 1;
                }
            }
            for (key, value) in map.iter_mut() {
                if key.as_str() == Some(rule.field.as_str()) {
                    continue;
                }
                replaced += replace_disallowed(value, rule, to);
            }
            replaced
        }
        Value::Sequence(items) => items
            .iter_mut()
            .map(|v| replace_disallowed(v, rule, to))
            .sum(),
        _ => 0,
    }
}

/// Per-run memory of "apply to all" answers.
#[derive(Debug, Default)]
pub struct RemediationPolicy {
    auto_apply: HashSet<String>,
    decisions: Vec<FixDecision>,
}

impl RemediationPolicy {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_auto(&self, fix: &Fix) -> bool {
        self.auto_apply.contains(&fix.policy_key())
    }

    /// Record the answer given for `fix`. Returns the accepted decision, if any.
    pub fn record(&mut self, fix: &Fix, decision: Decision) -> Option<FixDecision> {
        let scope = match decision {
            Decision::No => return None,
            Decision::Yes => FixScope::ThisInstance,
            Decision::All => {
                self.auto_apply.insert(fix.policy_key());
                FixScope::AllFutureInstances
            }
        };
        let accepted = fix.decision(scope);
        self.decisions.push(accepted.clone());
        Some(accepted)
    }

    pub fn decisions(&self) -> &[FixDecision] {
        &self.decisions
    }
}

#[derive(Debug, thiserror::Error)]
pub enum TemplateError {
    #[error("failed to read {}: {source}", .path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {}: {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },
    #[error("failed to write {}: {message}", .path.display())]
    Write { path: PathBuf, message: String },
}

impl TemplateFile {
    /// Read and parse the file, caching the structure on success.
    pub fn load(&mut self) -> Result<&Value, TemplateError> {
        let content = fs::read_to_string(&self.path).map_err(|source| TemplateError::Read {
            path: self.path.clone(),
            source,
        })?;
        let parsed: Value = serde_yaml::from_str(&content).map_err(|source| TemplateError::Parse {
            path: self.path.clone(),
            source,
        })?;
        Ok(self.parsed_structure.insert(parsed))
    }

    /// Serialize the cached structure over the file.
    pub fn save(&self) -> Result<(), TemplateError> {
        let Some(doc) = self.parsed_structure.as_ref() else {
            return Err(TemplateError::Write {
                path: self.path.clone(),
                message: "nothing parsed".to_string(),
            });
        };
        write_structure(&self.path, doc)
    }
}

pub fn write_structure(path: &Path, doc: &Value) -> Result<(), TemplateError> {
    let content = serde_yaml::to_string(doc).map_err(|e| TemplateError::Write {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    fs::write(path, content).map_err(|e| TemplateError::Write {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

/// Whether a path has one of the template extensions (case-insensitive).
pub fn has_template_extension(name: &str, extensions: &[String]) -> bool {
    let lower = name.to_ascii_lowercase();
    extensions
        .iter()
        .any(|ext| lower.ends_with(&format!(".{}", ext.trim_start_matches('.').to_ascii_lowercase())))
}

pub fn default_template_extensions() -> Vec<String> {
    vec!["yaml".to_string(), "yml".to_string()]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc(yaml: &str) -> Value {
        serde_yaml::from_str(yaml).unwrap()
    }

    #[test]
    fn classify_unknown_fields_with_and_without_line() {
        let issues = classify(
            "[ERR] line 4: field risk not found in type model.Info\nfield detections not found\n",
            &default_enum_rules(),
        );
        assert_eq!(
            issues,
            vec![
                Issue::UnknownField {
                    field: "risk".to_string(),
                    line: Some(4)
                },
                Issue::UnknownField {
                    field: "detections".to_string(),
                    line: None
                },
            ]
        );
    }

    #[test]
    fn classify_identifier_enum_structural_and_syntax() {
        let text = "invalid field format for 'id' (allowed format is ^([a-zA-Z0-9]+[-_])*[a-zA-Z0-9]+$)\n\
                    invalid value 'bogus' for 'attack'\n\
                    line 9: cannot unmarshal !!seq into map[string]string\n\
                    yaml: line 3: mapping values are not allowed in this context\n";
        let issues = classify(text, &default_enum_rules());
        assert_eq!(issues.len(), 4);
        assert_eq!(issues[0], Issue::MalformedIdentifier);
        assert_eq!(
            issues[1],
            Issue::InvalidEnumValue {
                field: "attack".to_string()
            }
        );
        assert_eq!(issues[2].category(), "structural-mismatch");
        assert_eq!(issues[3].category(), "unparseable");
    }

    #[test]
    fn classify_enum_needs_a_rule() {
        let issues = classify("invalid severity type", &default_enum_rules());
        assert_eq!(issues.len(), 1);
        assert_eq!(issues[0].category(), "unrecognized");

        let issues = classify("invalid attack type", &default_enum_rules());
        assert_eq!(
            issues,
            vec![Issue::InvalidEnumValue {
                field: "attack".to_string()
            }]
        );
    }

    #[test]
    fn classify_falls_back_to_first_line() {
        let issues = classify("\n  something odd happened\nmore\n", &[]);
        assert_eq!(
            issues,
            vec![Issue::Unrecognized {
                detail: "something odd happened".to_string()
            }]
        );
        assert!(!issues[0].auto_fixable());
    }

    #[test]
    fn normalize_identifier_examples() {
        assert_eq!(normalize_identifier("My Template!!"), "My_Template");
        assert_eq!(normalize_identifier("--cve-2021__44228--"), "cve-2021_44228");
        assert_eq!(normalize_identifier("a-_b"), "a_b");
        assert_eq!(normalize_identifier("a---b"), "a-b");
        assert_eq!(normalize_identifier("héllo wörld"), "h_llo_w_rld");
        assert_eq!(normalize_identifier("!!!"), "");
        for raw in ["My Template!!", "x..y", "_lead", "trail_", "a -b"] {
            assert!(is_valid_identifier(&normalize_identifier(raw)), "{}", raw);
        }
    }

    #[test]
    fn removing_unknown_field_keeps_everything_else() {
        let mut d = doc("id: t\nfoo: 1\ninfo:\n  name: x\n  severity: low\n");
        let expected = doc("id: t\ninfo:\n  name: x\n  severity: low\n");
        let issue = Issue::UnknownField {
            field: "foo".to_string(),
            line: None,
        };
        let fix = propose_fix(&issue, &d, &[]).unwrap();
        assert!(apply_fix(&mut d, &fix, &[]));
        let reparsed: Value = serde_yaml::from_str(&serde_yaml::to_string(&d).unwrap()).unwrap();
        assert_eq!(reparsed, expected);
    }

    #[test]
    fn unknown_field_removed_from_shallowest_mapping_only() {
        let mut d = doc("info:\n  reference: a\nhttp:\n  - meta:\n      reference: b\n");
        let fix = Fix::RemoveField {
            field: "reference".to_string(),
        };
        assert!(apply_fix(&mut d, &fix, &[]));
        assert_eq!(d, doc("info: {}\nhttp:\n  - meta:\n      reference: b\n"));
    }

    #[test]
    fn absent_field_has_no_fix() {
        let d = doc("id: t\n");
        let issue = Issue::UnknownField {
            field: "missing".to_string(),
            line: Some(2),
        };
        assert_eq!(propose_fix(&issue, &d, &[]), None);
    }

    #[test]
    fn malformed_identifier_is_rewritten() {
        let mut d = doc("id: \"My Template!!\"\n");
        let fix = propose_fix(&Issue::MalformedIdentifier, &d, &[]).unwrap();
        assert_eq!(fix.summary(), "id: 'My Template!!' -> 'My_Template'");
        assert!(apply_fix(&mut d, &fix, &[]));
        assert_eq!(d.get("id").and_then(Value::as_str), Some("My_Template"));
    }

    #[test]
    fn invalid_enum_replaced_with_default_everywhere() {
        let rules = default_enum_rules();
        let mut d = doc("attack: bogus\nhttp:\n  - attack: pitchfork\n  - attack: nope\n");
        let issue = Issue::InvalidEnumValue {
            field: "attack".to_string(),
        };
        let fix = propose_fix(&issue, &d, &rules).unwrap();
        assert_eq!(
            fix,
            Fix::ReplaceEnum {
                field: "attack".to_string(),
                from: "bogus".to_string(),
                to: "network".to_string()
            }
        );
        assert!(apply_fix(&mut d, &fix, &rules));
        assert_eq!(
            d,
            doc("attack: network\nhttp:\n  - attack: pitchfork\n  - attack: network\n")
        );
        assert!(!apply_fix(&mut d, &fix, &rules));
    }

    #[test]
    fn policy_remembers_all_per_key() {
        let mut policy = RemediationPolicy::new();
        let foo = Fix::RemoveField {
            field: "foo".to_string(),
        };
        let bar = Fix::RemoveField {
            field: "bar".to_string(),
        };
        assert!(policy.record(&foo, Decision::No).is_none());
        assert!(!policy.is_auto(&foo));

        let accepted = policy.record(&foo, Decision::All).unwrap();
        assert_eq!(accepted.scope, FixScope::AllFutureInstances);
        assert!(policy.is_auto(&foo));
        assert!(!policy.is_auto(&bar));

        let accepted = policy.record(&bar, Decision::Yes).unwrap();
        assert_eq!(accepted.scope, FixScope::ThisInstance);
        assert!(!policy.is_auto(&bar));
        assert_eq!(policy.decisions().len(), 2);
    }

    #[test]
    fn template_extension_matching() {
        let exts = default_template_extensions();
        assert!(has_template_extension("cve.yaml", &exts));
        assert!(has_template_extension("CVE.YML", &exts));
        assert!(!has_template_extension("README.md", &exts));
        assert!(!has_template_extension("yaml", &exts));
    }

    #[test]
    fn template_file_load_and_save() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("t.yaml");
        fs::write(&path, "id: a\n# comment\nfoo: 1\n").unwrap();
        let mut template = TemplateFile::new(&path);
        let loaded = template.load().unwrap().clone();
        assert_eq!(loaded.get("foo"), Some(&Value::from(1)));
        if let Some(doc) = template.parsed_structure.as_mut() {
            apply_fix(
                doc,
                &Fix::RemoveField {
                    field: "foo".to_string(),
                },
                &[],
            );
        }
        template.save().unwrap();
        let written = fs::read_to_string(&path).unwrap();
        assert_eq!(written, "id: a\n");
    }
}
