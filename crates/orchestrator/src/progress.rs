//! Progress tracking for a watched session

use std::collections::HashMap;
use tracing::{info, warn};

use redops_common::{LogEvent, SessionState, Severity};

/// Folds a session's events into progress counters.
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    total: usize,
    received: usize,
    last_sequence: u64,
    gaps: usize,
    by_severity: HashMap<Severity, usize>,
}

impl ProgressTracker {
    /// `total` is the number of stages the session can publish.
    pub fn new(total: usize) -> Self {
        Self {
            total,
            received: 0,
            last_sequence: 0,
            gaps: 0,
            by_severity: HashMap::new(),
        }
    }

    /// Count an event. Returns false when its sequence does not follow the
    /// previous one.
    pub fn observe(&mut self, event: &LogEvent) -> bool {
        let contiguous = event.sequence == self.last_sequence + 1;
        if !contiguous {
            warn!(
                expected = self.last_sequence + 1,
                got = event.sequence,
                "Sequence gap"
            );
            self.gaps += 1;
        }
        self.last_sequence = event.sequence;
        self.received += 1;
        *self.by_severity.entry(event.severity).or_insert(0) += 1;
        contiguous
    }

    pub fn received(&self) -> usize {
        self.received
    }

    pub fn last_sequence(&self) -> u64 {
        self.last_sequence
    }

    pub fn gaps(&self) -> usize {
        self.gaps
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.by_severity.get(&severity).copied().unwrap_or(0)
    }

    /// Share of stages published so far, 0.0..=100.0.
    pub fn percent(&self) -> f64 {
        if self.total == 0 {
            return 100.0;
        }
        (self.received.min(self.total) as f64 / self.total as f64) * 100.0
    }

    pub fn print_summary(&self, outcome: Option<SessionState>) {
        info!("Scan Summary:");
        if let Some(state) = outcome {
            info!("  Outcome: {}", state);
        }
        info!("  Stages: {}/{}", self.received, self.total);
        for severity in [
            Severity::Info,
            Severity::Success,
            Severity::Warning,
            Severity::Error,
        ] {
            let n = self.count(severity);
            if n > 0 {
                info!("  {}: {}", severity, n);
            }
        }
        if self.gaps > 0 {
            info!("  Sequence gaps: {}", self.gaps);
        }
        info!("  Progress: {:.1}%", self.percent());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    fn event(sequence: u64, severity: Severity) -> LogEvent {
        LogEvent::new(Uuid::new_v4(), sequence, "nuclei", "running", severity)
    }

    #[test]
    fn counts_events_by_severity() {
        let mut tracker = ProgressTracker::new(4);
        assert!(tracker.observe(&event(1, Severity::Info)));
        assert!(tracker.observe(&event(2, Severity::Warning)));
        assert!(tracker.observe(&event(3, Severity::Info)));

        assert_eq!(tracker.received(), 3);
        assert_eq!(tracker.count(Severity::Info), 2);
        assert_eq!(tracker.count(Severity::Warning), 1);
        assert_eq!(tracker.count(Severity::Error), 0);
        assert!((tracker.percent() - 75.0).abs() < f64::EPSILON);
    }

    #[test]
    fn flags_sequence_gaps() {
        let mut tracker = ProgressTracker::new(3);
        assert!(tracker.observe(&event(1, Severity::Info)));
        assert!(!tracker.observe(&event(3, Severity::Success)));
        assert_eq!(tracker.gaps(), 1);
        assert_eq!(tracker.last_sequence(), 3);
    }

    #[test]
    fn empty_pipeline_is_complete() {
        let tracker = ProgressTracker::new(0);
        assert_eq!(tracker.percent(), 100.0);
    }
}
