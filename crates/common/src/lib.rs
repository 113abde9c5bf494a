//! RedOps Common - Shared types and traits
//!
//! This crate provides the data model, collaborator traits and error
//! taxonomy used across the RedOps recon workspace.

pub mod error;
pub mod traits;
pub mod types;

// Re-export commonly used types
pub use error::{RedopsError, RedopsResult};
pub use traits::{TargetStore, TextGenerator};
pub use types::{
    Finding, FindingCounts, FindingSeverity, LogEvent, PipelineStage, Report, ReportKind,
    ReportStatus, ScanSession, SessionId, SessionState, Severity, Target, TargetStatus,
    TARGET_PLACEHOLDER,
};

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
