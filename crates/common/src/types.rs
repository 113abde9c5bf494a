//! Core data types for the RedOps recon pipeline
//!
//! Everything here is plain data. Session state is only ever advanced through
//! [`ScanSession::transition`], which is where the monotonic lifecycle is
//! enforced; the orchestrator owns every call to it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use uuid::Uuid;

use crate::error::{RedopsError, RedopsResult};

/// Identifier of one scan session.
pub type SessionId = Uuid;

/// Placeholder substituted with the target domain in stage message templates.
pub const TARGET_PLACEHOLDER: &str = "{target}";

/// Severity of a log event. Closed set; unknown levels are rejected when a
/// pipeline is authored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

impl Severity {
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Severity::Info => "INFO",
            Severity::Success => "SUCCESS",
            Severity::Warning => "WARNING",
            Severity::Error => "ERROR",
        }
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Severity {
    type Err = RedopsError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "INFO" => Ok(Severity::Info),
            "SUCCESS" => Ok(Severity::Success),
            "WARNING" => Ok(Severity::Warning),
            "ERROR" => Ok(Severity::Error),
            other => Err(RedopsError::InvalidDefinition(format!(
                "unknown severity level '{}'",
                other
            ))),
        }
    }
}

/// Scan status of a target as shown on the dashboard.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TargetStatus {
    Idle,
    Scanning,
    Completed,
    Error,
}

impl TargetStatus {
    /// Target status implied by a session state.
    #[must_use]
    pub const fn for_session(state: SessionState) -> Self {
        match state {
            SessionState::Idle | SessionState::Cancelled => TargetStatus::Idle,
            SessionState::Running => TargetStatus::Scanning,
            SessionState::Completed => TargetStatus::Completed,
            SessionState::Failed => TargetStatus::Error,
        }
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TargetStatus::Idle => "IDLE",
            TargetStatus::Scanning => "SCANNING",
            TargetStatus::Completed => "COMPLETED",
            TargetStatus::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Open finding counts per severity bucket.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FindingCounts {
    pub critical: u32,
    pub high: u32,
    pub medium: u32,
    pub low: u32,
}

impl FindingCounts {
    #[inline]
    #[must_use]
    pub const fn new(critical: u32, high: u32, medium: u32, low: u32) -> Self {
        Self {
            critical,
            high,
            medium,
            low,
        }
    }

    #[inline]
    #[must_use]
    pub const fn total(&self) -> u32 {
        self.critical + self.high + self.medium + self.low
    }
}

/// A scope under assessment.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Target {
    pub id: String,
    pub domain: String,
    pub status: TargetStatus,
    pub last_scan: Option<DateTime<Utc>>,
    pub risk_score: u8,
    pub tags: Vec<String>,
    pub findings_count: FindingCounts,
}

impl Target {
    #[must_use]
    pub fn new<I: Into<String>, D: Into<String>>(id: I, domain: D) -> Self {
        Self {
            id: id.into(),
            domain: domain.into(),
            status: TargetStatus::Idle,
            last_scan: None,
            risk_score: 0,
            tags: Vec::new(),
            findings_count: FindingCounts::default(),
        }
    }

    #[must_use]
    pub fn with_status(mut self, status: TargetStatus) -> Self {
        self.status = status;
        self
    }

    #[must_use]
    pub fn with_last_scan(mut self, last_scan: DateTime<Utc>) -> Self {
        self.last_scan = Some(last_scan);
        self
    }

    #[must_use]
    pub fn with_risk_score(mut self, risk_score: u8) -> Self {
        self.risk_score = risk_score.min(100);
        self
    }

    #[must_use]
    pub fn with_tags<S: Into<String>>(mut self, tags: impl IntoIterator<Item = S>) -> Self {
        self.tags = tags.into_iter().map(Into::into).collect();
        self
    }

    #[must_use]
    pub fn with_findings_count(mut self, counts: FindingCounts) -> Self {
        self.findings_count = counts;
        self
    }
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.domain, self.id)
    }
}

/// One declared unit of simulated tool work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineStage {
    pub tool: String,
    pub message: String,
    /// Delay from session start at which the stage fires.
    pub offset: Duration,
    /// Declared level; `None` leaves the choice to the classifier.
    pub severity: Option<Severity>,
    pub terminal: bool,
}

impl PipelineStage {
    #[must_use]
    pub fn new<T: Into<String>, M: Into<String>>(tool: T, message: M, offset: Duration) -> Self {
        Self {
            tool: tool.into(),
            message: message.into(),
            offset,
            severity: None,
            terminal: false,
        }
    }

    #[must_use]
    pub fn with_severity(mut self, severity: Severity) -> Self {
        self.severity = Some(severity);
        self
    }

    #[must_use]
    pub fn terminal(mut self) -> Self {
        self.terminal = true;
        self
    }

    /// Message text with the target domain substituted in.
    #[must_use]
    pub fn render(&self, domain: &str) -> String {
        self.message.replace(TARGET_PLACEHOLDER, domain)
    }
}

/// Lifecycle state of a scan session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SessionState {
    Idle,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl SessionState {
    #[inline]
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        matches!(
            self,
            SessionState::Completed | SessionState::Cancelled | SessionState::Failed
        )
    }

    /// Whether `self -> next` is a legal lifecycle step.
    ///
    /// The normal path is Idle -> Running -> terminal. Idle -> Failed exists
    /// only for a start whose stage timers could not be armed.
    #[must_use]
    pub const fn can_transition_to(&self, next: SessionState) -> bool {
        match (self, next) {
            (SessionState::Idle, SessionState::Running) => true,
            (SessionState::Idle, SessionState::Failed) => true,
            (SessionState::Running, s) => s.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SessionState::Idle => "IDLE",
            SessionState::Running => "RUNNING",
            SessionState::Completed => "COMPLETED",
            SessionState::Cancelled => "CANCELLED",
            SessionState::Failed => "FAILED",
        };
        f.write_str(s)
    }
}

/// One execution of the pipeline against one target.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanSession {
    pub id: SessionId,
    pub target_id: String,
    pub state: SessionState,
    pub started_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
    /// Sequence number the next published event will carry. Starts at 1.
    pub next_sequence: u64,
    pub cancel_requested: bool,
}

impl ScanSession {
    #[must_use]
    pub fn new<T: Into<String>>(id: SessionId, target_id: T) -> Self {
        Self {
            id,
            target_id: target_id.into(),
            state: SessionState::Idle,
            started_at: Utc::now(),
            finished_at: None,
            next_sequence: 1,
            cancel_requested: false,
        }
    }

    /// Advance the lifecycle. Rejects anything but Idle -> Running -> terminal.
    pub fn transition(&mut self, next: SessionState) -> RedopsResult<()> {
        if !self.state.can_transition_to(next) {
            return Err(RedopsError::InvalidTransition {
                session: self.id,
                from: self.state,
                to: next,
            });
        }
        self.state = next;
        if next == SessionState::Cancelled {
            self.cancel_requested = true;
        }
        if next.is_terminal() {
            self.finished_at = Some(Utc::now());
        }
        Ok(())
    }

    /// Hand out the next sequence number.
    pub fn take_sequence(&mut self) -> u64 {
        let seq = self.next_sequence;
        self.next_sequence += 1;
        seq
    }

    #[inline]
    #[must_use]
    pub const fn events_published(&self) -> u64 {
        self.next_sequence - 1
    }

    #[inline]
    #[must_use]
    pub const fn is_running(&self) -> bool {
        matches!(self.state, SessionState::Running)
    }
}

/// Immutable, ordered progress message belonging to a session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogEvent {
    pub session_id: SessionId,
    pub sequence: u64,
    pub timestamp: DateTime<Utc>,
    pub tool: String,
    pub message: String,
    pub severity: Severity,
}

impl LogEvent {
    #[must_use]
    pub fn new<T: Into<String>, M: Into<String>>(
        session_id: SessionId,
        sequence: u64,
        tool: T,
        message: M,
        severity: Severity,
    ) -> Self {
        Self {
            session_id,
            sequence,
            timestamp: Utc::now(),
            tool: tool.into(),
            message: message.into(),
            severity,
        }
    }
}

/// Severity of a vulnerability finding (distinct from log [`Severity`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum FindingSeverity {
    Critical,
    High,
    Medium,
    Low,
    Info,
}

impl FindingSeverity {
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            FindingSeverity::Critical => "CRITICAL",
            FindingSeverity::High => "HIGH",
            FindingSeverity::Medium => "MEDIUM",
            FindingSeverity::Low => "LOW",
            FindingSeverity::Info => "INFO",
        }
    }
}

impl fmt::Display for FindingSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Finding {
    pub id: String,
    pub target_id: String,
    pub title: String,
    pub tool: String,
    pub severity: FindingSeverity,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cvss_score: Option<f32>,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remediation: Option<String>,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
}

impl Finding {
    #[must_use]
    pub fn new(
        id: impl Into<String>,
        target_id: impl Into<String>,
        title: impl Into<String>,
        tool: impl Into<String>,
        severity: FindingSeverity,
    ) -> Self {
        Self {
            id: id.into(),
            target_id: target_id.into(),
            title: title.into(),
            tool: tool.into(),
            severity,
            cvss_score: None,
            description: String::new(),
            remediation: None,
            timestamp: String::new(),
            category: None,
        }
    }

    #[must_use]
    pub fn with_cvss(mut self, score: f32) -> Self {
        self.cvss_score = Some(score);
        self
    }

    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    #[must_use]
    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }

    #[must_use]
    pub fn with_timestamp(mut self, timestamp: impl Into<String>) -> Self {
        self.timestamp = timestamp.into();
        self
    }

    #[must_use]
    pub fn with_category(mut self, category: impl Into<String>) -> Self {
        self.category = Some(category.into());
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportKind {
    Executive,
    Technical,
    Compliance,
}

impl ReportKind {
    #[inline]
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            ReportKind::Executive => "EXECUTIVE",
            ReportKind::Technical => "TECHNICAL",
            ReportKind::Compliance => "COMPLIANCE",
        }
    }
}

impl fmt::Display for ReportKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum ReportStatus {
    Ready,
    Generating,
    Failed,
}

/// Generated free-text report about one target.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Report {
    pub id: String,
    pub title: String,
    pub target_id: String,
    #[serde(rename = "type")]
    pub kind: ReportKind,
    pub generated_at: DateTime<Utc>,
    pub status: ReportStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}
