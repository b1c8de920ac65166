//! Operator-confirmed removal of duplicate directories, then files.

use harvest_adapters::ErrorLog;
use harvest_core::identity::{find_duplicate_dirs, find_duplicate_files, DuplicateScan, SubjectKind};
use harvest_core::{Decision, DecisionProvider, Prompt, PromptKind};
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupCounts {
    pub removed: usize,
    pub ignored: usize,
    /// Pairs dropped because a path vanished earlier in the pass.
    pub vanished: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DedupSummary {
    pub directories: DedupCounts,
    pub files: DedupCounts,
}

/// Directory pass first, then a file pass over whatever survived.
pub fn dedup_tree(
    root: &Path,
    control_dirs: &[String],
    decisions: &mut dyn DecisionProvider,
    error_log: &ErrorLog,
) -> anyhow::Result<DedupSummary> {
    println!("Checking for duplicate directories...");
    let scan = find_duplicate_dirs(root, control_dirs)?;
    let directories = resolve(scan, decisions, error_log);

    println!("Checking for duplicate templates...");
    let scan = find_duplicate_files(root, control_dirs)?;
    let files = resolve(scan, decisions, error_log);

    Ok(DedupSummary { directories, files })
}

/// Walk the pairs in order. "all" switches the rest of this pass to
/// automatic removal.
pub fn resolve(scan: DuplicateScan, decisions: &mut dyn DecisionProvider, error_log: &ErrorLog) -> DedupCounts {
    let mut counts = DedupCounts::default();
    for (path, err) in &scan.skipped {
        tracing::warn!("skipped {}: {}", path.display(), err);
        error_log.report(path, "hash-failed", &err.to_string());
    }

    let mut remove_all = false;
    for pair in scan.pairs {
        if !pair.duplicate.exists() || !pair.canonical.exists() {
            counts.vanished += 1;
            continue;
        }

        let noun = pair.kind.noun();
        let decision = if remove_all {
            Decision::Yes
        } else {
            println!(
                "\nDuplicate {}s found:\n- {}\n- {}",
                noun,
                pair.canonical.display(),
                pair.duplicate.display()
            );
            let prompt = Prompt::new(
                PromptKind::RemoveDuplicate,
                format!("Delete the second {}? (a = all remaining duplicates)", noun),
            );
            decisions.decide(&prompt)
        };
        if decision == Decision::All {
            remove_all = true;
        }
        if !decision.accepted() {
            counts.ignored += 1;
            continue;
        }

        let removal = match pair.kind {
            SubjectKind::Directory => fs::remove_dir_all(&pair.duplicate),
            SubjectKind::File => fs::remove_file(&pair.duplicate),
        };
        match removal {
            Ok(()) => {
                println!("  - deleted {}", pair.duplicate.display());
                counts.removed += 1;
            }
            Err(err) => {
                println!("  ! failed to delete {}: {}", pair.duplicate.display(), err);
                error_log.report(&pair.duplicate, "remove-failed", &err.to_string());
                counts.failed += 1;
            }
        }
    }
    counts
}
