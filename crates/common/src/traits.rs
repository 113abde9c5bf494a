//! Collaborator traits at the edges of the recon core
//!
//! - `TargetStore`: lookup of targets and findings, owned outside the core
//! - `TextGenerator`: opaque async text generation (reports, analyses)

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::RedopsResult;
use crate::types::{Finding, Target, TargetStatus};

/// Target and finding data consulted by the orchestrator.
///
/// Calls are made while a session lock is held, so implementations must not
/// block for long.
pub trait TargetStore: Send + Sync {
    /// Look up a target by id.
    fn get(&self, target_id: &str) -> Option<Target>;

    /// Record a scan status change for a target. Unknown ids are ignored.
    fn set_status(&self, target_id: &str, status: TargetStatus, last_scan: Option<DateTime<Utc>>);

    /// All known targets, in catalog order.
    fn list(&self) -> Vec<Target> {
        Vec::new()
    }

    /// Findings recorded against a target.
    fn findings(&self, _target_id: &str) -> Vec<Finding> {
        Vec::new()
    }
}

/// External text-generation service.
///
/// The core treats it as a string-or-error call and never lets its failure
/// reach a running scan.
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generate markdown for a prompt.
    async fn generate(&self, prompt: &str) -> RedopsResult<String>;

    /// Model or backend identifier, for logs.
    fn name(&self) -> &str;
}
