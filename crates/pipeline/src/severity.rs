//! Severity classification for fired stages

use redops_common::{PipelineStage, Severity};

/// Maps a stage to the severity its log event carries.
///
/// A declared level always wins. Undeclared terminal stages report
/// `terminal`, everything else `default`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeverityClassifier {
    default: Severity,
    terminal: Severity,
}

impl SeverityClassifier {
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn with_default(mut self, severity: Severity) -> Self {
        self.default = severity;
        self
    }

    #[must_use]
    pub fn with_terminal(mut self, severity: Severity) -> Self {
        self.terminal = severity;
        self
    }

    #[inline]
    #[must_use]
    pub fn classify(&self, stage: &PipelineStage) -> Severity {
        match stage.severity {
            Some(declared) => declared,
            None if stage.terminal => self.terminal,
            None => self.default,
        }
    }
}

impl Default for SeverityClassifier {
    fn default() -> Self {
        Self {
            default: Severity::Info,
            terminal: Severity::Success,
        }
    }
}
