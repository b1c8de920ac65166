//! Filesystem, network and subprocess adapters for the harvest engine.

pub mod candidates;
pub mod config;
pub mod error_log;
pub mod git_ops;
pub mod github;
pub mod ledger;
pub mod prompt;
pub mod util;
pub mod validator;

pub use config::Config;
pub use error_log::{DiscoveryLog, ErrorLog};
pub use git_ops::GitRemote;
pub use github::{ApiClient, ApiError};
pub use ledger::Ledger;
pub use prompt::InteractiveDecisions;
pub use validator::ExternalValidator;
