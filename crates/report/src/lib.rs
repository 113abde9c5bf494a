//! RedOps Report - generated risk reports and finding analyses
//!
//! Prompts are built from targets and findings and sent to any
//! [`TextGenerator`](redops_common::TextGenerator); [`GeminiClient`] is the
//! HTTPS implementation. This crate never touches running scans.

mod gemini;
pub mod prompts;
mod service;

pub use gemini::{GeminiClient, DEFAULT_MODEL};
pub use service::{ReportService, ANALYSIS_FALLBACK, EMPTY_REPORT, REPORT_FALLBACK};
