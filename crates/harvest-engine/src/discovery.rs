//! Search-driven discovery of new template repositories.

use harvest_adapters::candidates;
use harvest_adapters::{ApiClient, ApiError, DiscoveryLog};
use harvest_core::template::has_template_extension;
use harvest_core::{DecisionProvider, Prompt, RepoCandidate};
use std::collections::HashSet;
use std::path::Path;

pub struct DiscoverySettings<'a> {
    pub terms: &'a [String],
    pub template_extensions: &'a [String],
    /// Main candidate list; anything already in it is not new.
    pub candidate_list: &'a Path,
    /// Receives the newly found URLs.
    pub new_candidates: &'a Path,
}

#[derive(Debug, Default)]
pub struct DiscoveryReport {
    pub pages: usize,
    pub examined: usize,
    pub already_known: usize,
    pub not_templates: usize,
    /// Hits whose contents listing failed and were skipped.
    pub skipped: usize,
    pub found: Vec<RepoCandidate>,
    /// Set when a fatal API error ended the search early.
    pub aborted: Option<ApiError>,
}

impl DiscoveryReport {
    pub fn found_urls(&self) -> Vec<String> {
        self.found.iter().map(|c| c.source_url.clone()).collect()
    }
}

/// Search, keep hits whose repository root holds a template file, and write
/// the new ones to the new-candidates file. A rejected token is an error;
/// a 403 mid-search ends the search but keeps what was found.
pub async fn discover(
    client: &ApiClient,
    settings: &DiscoverySettings<'_>,
    log: &DiscoveryLog,
) -> anyhow::Result<DiscoveryReport> {
    match client.validate_token().await {
        Ok(Some(login)) => tracing::info!("GitHub token validated for {}", login),
        Ok(None) => println!("No GitHub token set; searching unauthenticated."),
        Err(err) => return Err(anyhow::anyhow!("GitHub token was rejected: {}", err)),
    }

    let mut known = candidates::read_all_urls(settings.candidate_list)?;
    known.extend(candidates::read_all_urls(settings.new_candidates)?);
    let mut seen: HashSet<String> = HashSet::new();

    let mut report = DiscoveryReport::default();
    let mut pager = client.search(settings.terms)?;
    let query = pager.query().to_string();
    println!("Searching repositories for: {}", query);

    'pages: while let Some(page) = pager.next_page().await {
        let page = match page {
            Ok(page) => page,
            Err(err) if err.is_fatal() => {
                report.aborted = Some(err);
                break;
            }
            Err(err) => {
                tracing::warn!("search page failed, ending query: {}", err);
                break;
            }
        };
        report.pages += 1;
        tracing::debug!(page = page.number, hits = page.items.len(), "search page");

        for hit in page.items {
            report.examined += 1;
            let url = hit.html_url.trim().to_string();
            if known.contains(&url) || !seen.insert(url.clone()) {
                report.already_known += 1;
                continue;
            }

            let entries = match client.list_contents(&hit.full_name).await {
                Ok(entries) => entries,
                Err(err) if err.is_fatal() => {
                    report.aborted = Some(err);
                    break 'pages;
                }
                Err(err) => {
                    tracing::warn!("skipping {}: {}", hit.full_name, err);
                    report.skipped += 1;
                    continue;
                }
            };
            let qualifies = entries
                .iter()
                .any(|entry| has_template_extension(&entry.name, settings.template_extensions));
            if !qualifies {
                report.not_templates += 1;
                continue;
            }

            println!("  + {}", url);
            let candidate = RepoCandidate::new(url, query.clone());
            if let Err(err) = log.append(&candidate) {
                tracing::warn!("{:#}", err);
            }
            report.found.push(candidate);
        }
    }

    if !report.found.is_empty() {
        candidates::append_urls(settings.new_candidates, &report.found_urls())?;
        println!(
            "Added {} new repositories to {}",
            report.found.len(),
            settings.new_candidates.display()
        );
    }
    Ok(report)
}

/// Offer to append discovered URLs to the main list. Returns how many were
/// appended.
pub fn promote(
    report: &DiscoveryReport,
    candidate_list: &Path,
    decisions: &mut dyn DecisionProvider,
) -> anyhow::Result<usize> {
    if report.found.is_empty() {
        return Ok(0);
    }
    let prompt = Prompt::yes_no(format!(
        "Add the {} new repositories to {}?",
        report.found.len(),
        candidate_list.display()
    ));
    if !decisions.decide(&prompt).accepted() {
        return Ok(0);
    }
    candidates::append_urls(candidate_list, &report.found_urls())
}
