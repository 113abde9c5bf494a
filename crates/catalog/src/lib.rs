//! Target Catalog - in-memory targets and findings
//!
//! Implements the `TargetStore` collaborator for the orchestrator and the CLI.
//! Targets can be looked up by id or by domain; domains are normalized
//! before validation, so all of these refer to the same scope:
//! - `"corp-internal.demo.com"`
//! - `"https://Corp-Internal.demo.com/"`
//! - `"1"` (its id)

mod seed;

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use parking_lot::RwLock;
use regex::Regex;
use tracing::debug;

use redops_common::{
    Finding, RedopsError, RedopsResult, Target, TargetStatus, TargetStore,
};

static DOMAIN_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?:[a-z0-9](?:[a-z0-9-]{0,61}[a-z0-9])?\.)+[a-z]{2,63}$")
        .expect("domain regex is valid")
});

#[derive(Debug, Default)]
pub struct TargetCatalog {
    targets: RwLock<Vec<Target>>,
    findings: RwLock<Vec<Finding>>,
}

impl TargetCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Catalog pre-loaded with the dashboard's demo scopes and findings.
    pub fn demo() -> Self {
        Self {
            targets: RwLock::new(seed::targets()),
            findings: RwLock::new(seed::findings()),
        }
    }

    /// Add a new scope. The domain is normalized and validated; duplicates are rejected.
    pub fn add_target<S: Into<String>>(
        &self,
        domain: &str,
        tags: impl IntoIterator<Item = S>,
    ) -> RedopsResult<Target> {
        let domain = normalize_domain(domain)?;
        let mut targets = self.targets.write();
        if targets.iter().any(|t| t.domain == domain) {
            return Err(RedopsError::InvalidTarget(format!(
                "{} is already in scope",
                domain
            )));
        }

        let next_id = targets
            .iter()
            .filter_map(|t| t.id.parse::<u64>().ok())
            .max()
            .unwrap_or(0)
            + 1;
        let target = Target::new(next_id.to_string(), domain).with_tags(tags);
        debug!("Added target {}", target);
        targets.push(target.clone());
        Ok(target)
    }

    /// Resolve an id or a domain to a target.
    pub fn resolve(&self, query: &str) -> RedopsResult<Target> {
        let query = query.trim();
        if query.is_empty() {
            return Err(RedopsError::InvalidTarget("no target specified".to_string()));
        }

        let targets = self.targets.read();
        if let Some(t) = targets.iter().find(|t| t.id == query) {
            return Ok(t.clone());
        }
        let domain = normalize_domain(query)?;
        targets
            .iter()
            .find(|t| t.domain == domain)
            .cloned()
            .ok_or_else(|| RedopsError::NotFound(format!("target '{}'", query)))
    }

    pub fn add_finding(&self, finding: Finding) {
        self.findings.write().push(finding);
    }

    pub fn finding(&self, finding_id: &str) -> Option<Finding> {
        self.findings
            .read()
            .iter()
            .find(|f| f.id == finding_id)
            .cloned()
    }
}

impl TargetStore for TargetCatalog {
    fn get(&self, target_id: &str) -> Option<Target> {
        self.targets
            .read()
            .iter()
            .find(|t| t.id == target_id)
            .cloned()
    }

    fn set_status(&self, target_id: &str, status: TargetStatus, last_scan: Option<DateTime<Utc>>) {
        let mut targets = self.targets.write();
        if let Some(target) = targets.iter_mut().find(|t| t.id == target_id) {
            target.status = status;
            if last_scan.is_some() {
                target.last_scan = last_scan;
            }
        }
    }

    fn list(&self) -> Vec<Target> {
        self.targets.read().clone()
    }

    fn findings(&self, target_id: &str) -> Vec<Finding> {
        self.findings
            .read()
            .iter()
            .filter(|f| f.target_id == target_id)
            .cloned()
            .collect()
    }
}

/// Lowercase, strip scheme, path and port, then validate as a DNS name.
pub fn normalize_domain(raw: &str) -> RedopsResult<String> {
    let mut domain = raw.trim().to_ascii_lowercase();
    for scheme in ["https://", "http://"] {
        if let Some(rest) = domain.strip_prefix(scheme) {
            domain = rest.to_string();
        }
    }
    if let Some(idx) = domain.find('/') {
        domain.truncate(idx);
    }
    if let Some(idx) = domain.find(':') {
        domain.truncate(idx);
    }
    let domain = domain.trim_end_matches('.').to_string();

    if domain.len() > 253 || !DOMAIN_RE.is_match(&domain) {
        return Err(RedopsError::InvalidTarget(format!(
            "'{}' is not a valid domain",
            raw.trim()
        )));
    }
    Ok(domain)
}
