//! harvest - collect and repair YAML scan-template repositories
//!
//! discover -> acquire -> remediate, each runnable on its own.

use anyhow::{Context, Result};
use clap::{Args as ClapArgs, Parser, Subcommand};
use harvest_adapters::{
    candidates, ApiClient, Config, DiscoveryLog, ErrorLog, ExternalValidator, GitRemote,
    InteractiveDecisions, Ledger,
};
use harvest_core::{AutoAccept, AutoReject, DecisionProvider, Prompt};
use harvest_engine::{
    discover, promote, remediate_tree, Acquisition, AcquisitionSummary, DiscoverySettings,
    RemediationSettings,
};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    name = "harvest",
    about = "Discover, clone, deduplicate and repair YAML template repositories",
    version
)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Verbose diagnostics on stderr
    #[arg(short, long, global = true)]
    debug: bool,

    /// Answer yes to every confirmation
    #[arg(short, long, global = true, conflicts_with = "no")]
    yes: bool,

    /// Answer no to every confirmation
    #[arg(short, long, global = true)]
    no: bool,

    /// Config file (defaults to ~/.config/harvest/config.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(flatten)]
    overrides: Overrides,
}

#[derive(ClapArgs, Debug, Default)]
struct Overrides {
    /// Candidate URL list
    #[arg(short = 'f', long = "file", global = true)]
    candidate_list: Option<PathBuf>,

    /// Directory clones are written to and remediated in
    #[arg(long, global = true)]
    clone_dir: Option<PathBuf>,

    /// Attempt ledger
    #[arg(long, global = true)]
    ledger: Option<PathBuf>,

    /// Template validator executable
    #[arg(long, global = true)]
    validator: Option<String>,

    /// Search API base URL
    #[arg(long, global = true)]
    api_url: Option<String>,
}

impl Overrides {
    fn apply(&self, config: &mut Config) {
        if let Some(path) = &self.candidate_list {
            config.candidate_list = path.clone();
        }
        if let Some(dir) = &self.clone_dir {
            config.clone_dir = dir.clone();
        }
        if let Some(path) = &self.ledger {
            config.ledger = path.clone();
        }
        if let Some(bin) = &self.validator {
            config.validator_bin = bin.clone();
        }
        if let Some(url) = &self.api_url {
            config.api_base_url = url.trim_end_matches('/').to_string();
        }
    }
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Search for new template repositories
    Discover {
        /// Search terms (joined with OR); defaults to the configured terms
        terms: Vec<String>,
        /// Append new repositories to the candidate list without asking
        #[arg(long)]
        append: bool,
        /// Clone new repositories right away without asking
        #[arg(long)]
        acquire: bool,
    },
    /// Clone every active URL in the candidate list
    Acquire,
    /// Remove duplicates, then validate and fix templates
    Remediate {
        /// Template tree (defaults to the clone directory)
        #[arg(long = "dir")]
        directory: Option<PathBuf>,
    },
    /// Discover, acquire and remediate in one go
    Run,
    /// Manage the attempt ledger
    Ledger {
        #[command(subcommand)]
        action: LedgerAction,
    },
    /// Show the effective configuration
    Config {
        /// Write the effective configuration to the config file
        #[arg(long)]
        save: bool,
    },
}

#[derive(Subcommand, Debug)]
enum LedgerAction {
    /// Forget every attempt so URLs are tried again
    Reset,
}

fn init_tracing(debug: bool) {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn decision_provider(args: &Args) -> Box<dyn DecisionProvider> {
    if args.yes {
        Box::new(AutoAccept)
    } else if args.no {
        Box::new(AutoReject)
    } else {
        Box::new(InteractiveDecisions::stdio())
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.debug);

    let mut config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };
    args.overrides.apply(&mut config);

    let mut decisions = decision_provider(&args);
    let error_log = ErrorLog::new(&config.error_log);
    tracing::debug!(run_id = %error_log.run_id(), "starting");

    let result = match &args.command {
        Command::Discover {
            terms,
            append,
            acquire,
        } => {
            if !terms.is_empty() {
                config.search_terms = terms.clone();
            }
            run_discover(&config, decisions.as_mut(), &error_log, *append, *acquire).await
        }
        Command::Acquire => run_acquire(&config, &error_log).await.map(|_| ()),
        Command::Remediate { directory } => {
            let root = directory.clone().unwrap_or_else(|| config.clone_dir.clone());
            run_remediate(&config, &root, decisions.as_mut(), &error_log)
        }
        Command::Run => run_all(&config, decisions.as_mut(), &error_log).await,
        Command::Ledger {
            action: LedgerAction::Reset,
        } => reset_ledger(&config.ledger, decisions.as_mut()),
        Command::Config { save } => show_config(&config, &args, *save),
    };

    if error_log.path().exists() {
        println!("Error log: {}", error_log.path().display());
    }
    result
}

async fn run_discover(
    config: &Config,
    decisions: &mut dyn DecisionProvider,
    error_log: &ErrorLog,
    append: bool,
    acquire: bool,
) -> Result<()> {
    let client = ApiClient::new(&config.api_base_url, config.api_token(), config.low_water_mark)?;
    let settings = DiscoverySettings {
        terms: &config.search_terms,
        template_extensions: &config.template_extensions,
        candidate_list: &config.candidate_list,
        new_candidates: &config.new_candidates,
    };
    let report = discover(&client, &settings, &DiscoveryLog::new(&config.discovery_log)).await?;

    println!();
    println!("Discovery summary:");
    println!("  Pages searched:       {}", report.pages);
    println!("  Repositories seen:    {}", report.examined);
    println!("  Already known:        {}", report.already_known);
    println!("  Without templates:    {}", report.not_templates);
    println!("  Skipped on error:     {}", report.skipped);
    println!("  New repositories:     {}", report.found.len());

    if !report.found.is_empty() {
        let appended = if append {
            candidates::append_urls(&config.candidate_list, &report.found_urls())?
        } else {
            promote(&report, &config.candidate_list, decisions)?
        };
        if appended > 0 {
            println!("  + appended {} to {}", appended, config.candidate_list.display());
        }

        let clone_now = acquire
            || decisions
                .decide(&Prompt::yes_no("Clone the new repositories now?"))
                .accepted();
        if clone_now {
            let remote = GitRemote::new(config.probe_timeout(), config.clone_timeout())?;
            let acquisition = Acquisition::new(&remote, &remote, &config.clone_dir, error_log);
            let mut ledger = Ledger::load(&config.ledger)?;
            let (summary, retired) = acquisition
                .acquire_urls(&mut ledger, &report.found_urls())
                .await?;
            if appended > 0 {
                candidates::comment_out(&config.candidate_list, &retired)?;
            }
            println!();
            println!("{}", summary);
        }
    }

    match report.aborted {
        Some(err) => Err(anyhow::anyhow!("discovery stopped early: {}", err)),
        None => Ok(()),
    }
}

async fn run_acquire(config: &Config, error_log: &ErrorLog) -> Result<AcquisitionSummary> {
    let remote = GitRemote::new(config.probe_timeout(), config.clone_timeout())?;
    let acquisition = Acquisition::new(&remote, &remote, &config.clone_dir, error_log);
    let mut ledger = Ledger::load(&config.ledger)?;
    println!(
        "Acquiring from {} ({} URLs already attempted)",
        config.candidate_list.display(),
        ledger.len()
    );
    let summary = acquisition
        .acquire_list(&mut ledger, &config.candidate_list)
        .await?;
    println!();
    println!("{}", summary);
    Ok(summary)
}

fn run_remediate(
    config: &Config,
    root: &Path,
    decisions: &mut dyn DecisionProvider,
    error_log: &ErrorLog,
) -> Result<()> {
    let validator = ExternalValidator::new(&config.validator_bin, config.validate_timeout());
    let settings = RemediationSettings {
        root,
        extensions: &config.template_extensions,
        control_dirs: &config.control_dirs,
        enum_rules: &config.enum_rules,
    };
    let report = remediate_tree(&settings, &validator, decisions, error_log)
        .with_context(|| format!("remediation of {} failed", root.display()))?;
    println!();
    println!("{}", report);
    Ok(())
}

/// Every stage runs even when an earlier one stopped early; the first
/// failure decides the exit status.
async fn run_all(
    config: &Config,
    decisions: &mut dyn DecisionProvider,
    error_log: &ErrorLog,
) -> Result<()> {
    let mut first_error = None;

    if let Err(err) = run_discover(config, decisions, error_log, false, false).await {
        eprintln!("  ! {:#}", err);
        first_error.get_or_insert(err);
    }
    if let Err(err) = run_acquire(config, error_log).await {
        eprintln!("  ! {:#}", err);
        first_error.get_or_insert(err);
    }
    if let Err(err) = run_remediate(config, &config.clone_dir, decisions, error_log) {
        eprintln!("  ! {:#}", err);
        first_error.get_or_insert(err);
    }

    match first_error {
        Some(err) => Err(err),
        None => Ok(()),
    }
}

fn reset_ledger(path: &Path, decisions: &mut dyn DecisionProvider) -> Result<()> {
    let prompt = Prompt::yes_no(format!(
        "Forget every attempt recorded in {}?",
        path.display()
    ));
    if !decisions.decide(&prompt).accepted() {
        println!("Ledger left unchanged.");
        return Ok(());
    }
    let forgotten = Ledger::reset(path)?;
    println!("  + forgot {} URLs", forgotten);
    Ok(())
}

fn show_config(config: &Config, args: &Args, save: bool) -> Result<()> {
    let location = match &args.config {
        Some(path) => path.display().to_string(),
        None => Config::config_location(),
    };
    println!("# {}", location);
    println!(
        "{}",
        serde_json::to_string_pretty(config).context("failed to render config")?
    );
    println!(
        "# API token: {}",
        if config.api_token().is_some() {
            "set"
        } else {
            "not set"
        }
    );
    if save {
        match &args.config {
            Some(path) => config.save_to(path),
            None => config.save(),
        }
        .map_err(|e| anyhow::anyhow!(e))?;
        println!("  + saved {}", location);
    }
    Ok(())
}
