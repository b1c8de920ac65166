//! Pipeline stages: discovery, acquisition, dedup and remediation.

pub mod acquisition;
pub mod dedup;
pub mod discovery;
pub mod remediation;

pub use acquisition::{Acquisition, AcquisitionSummary};
pub use dedup::{dedup_tree, DedupCounts, DedupSummary};
pub use discovery::{discover, promote, DiscoveryReport, DiscoverySettings};
pub use remediation::{remediate_tree, RemediationReport, RemediationSettings, RemediationSummary, Remediator};
