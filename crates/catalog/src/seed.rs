//! Demo scopes and findings shown on the dashboard

use chrono::{DateTime, NaiveDateTime, Utc};

use redops_common::{Finding, FindingCounts, FindingSeverity, Target, TargetStatus};

fn at(stamp: &str) -> Option<DateTime<Utc>> {
    NaiveDateTime::parse_from_str(stamp, "%Y-%m-%d %H:%M")
        .ok()
        .map(|naive| naive.and_utc())
}

pub(crate) fn targets() -> Vec<Target> {
    let mut corp = Target::new("1", "corp-internal.demo.com")
        .with_status(TargetStatus::Completed)
        .with_risk_score(85)
        .with_tags(["Production", "Internal", "AWS"])
        .with_findings_count(FindingCounts::new(2, 5, 12, 8));
    corp.last_scan = at("2023-10-27 14:30");

    let mut legacy = Target::new("2", "legacy-api.demo.com")
        .with_risk_score(92)
        .with_tags(["Legacy", "External", "API"])
        .with_findings_count(FindingCounts::new(4, 3, 5, 20));
    legacy.last_scan = at("2023-10-25 09:15");

    let staging = Target::new("3", "staging-auth.demo.com").with_tags(["Staging", "Auth"]);

    vec![corp, legacy, staging]
}

pub(crate) fn findings() -> Vec<Finding> {
    vec![
        Finding::new("f1", "1", "SQL Injection in /login parameter", "Nuclei", FindingSeverity::Critical)
            .with_cvss(9.8)
            .with_description("Boolean-based blind SQL injection detected in the username parameter.")
            .with_remediation("Use prepared statements or parameterized queries.")
            .with_timestamp("2023-10-27 14:35")
            .with_category("Injection"),
        Finding::new("f2", "1", "Exposed .git Directory", "GoBuster", FindingSeverity::High)
            .with_cvss(7.5)
            .with_description("Source code repository exposed via /.git/HEAD")
            .with_remediation("Deny access to .git directories in web server config.")
            .with_timestamp("2023-10-27 14:32")
            .with_category("Information Disclosure"),
        Finding::new("f3", "1", "Outdated Apache Version 2.4.49", "Nmap", FindingSeverity::High)
            .with_cvss(7.5)
            .with_description("Server is running a version vulnerable to Path Traversal (CVE-2021-41773).")
            .with_timestamp("2023-10-27 14:30")
            .with_category("Vulnerable Component"),
        Finding::new("f4", "1", "Missing Security Headers", "HTTPx", FindingSeverity::Low)
            .with_cvss(0.0)
            .with_description("X-Frame-Options and Content-Security-Policy are missing.")
            .with_timestamp("2023-10-27 14:28")
            .with_category("Misconfiguration"),
        Finding::new("f5", "2", "RCE via Log4Shell", "Nuclei", FindingSeverity::Critical)
            .with_cvss(10.0)
            .with_description("JNDI injection vulnerability detected in User-Agent header.")
            .with_remediation("Patch Log4j to version 2.17.1 or higher.")
            .with_timestamp("2023-10-25 09:10")
            .with_category("Injection"),
        Finding::new("f6", "2", "Open Redis Instance", "Nmap", FindingSeverity::High)
            .with_cvss(8.0)
            .with_description("Redis service on port 6379 is accessible without authentication.")
            .with_timestamp("2023-10-25 09:05")
            .with_category("Misconfiguration"),
    ]
}
