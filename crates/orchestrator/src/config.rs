//! Orchestrator tuning options

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use redops_common::{RedopsError, RedopsResult};

/// Runtime options for the orchestrator, its bus and its registry.
///
/// Every field has a default, so a config file only needs the keys it changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OrchestratorConfig {
    /// Backlog bound per subscriber before it is disconnected.
    pub bus_capacity: usize,
    /// Retired sessions kept per target for replay.
    pub history_limit: usize,
    /// Upper bound on concurrently armed stage timers; `None` is unbounded.
    pub max_armed_timers: Option<usize>,
    /// Random extra delay (0..=n ms) added to every stage timer.
    pub stage_jitter_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            bus_capacity: 256,
            history_limit: 20,
            max_armed_timers: None,
            stage_jitter_ms: 0,
        }
    }
}

impl OrchestratorConfig {
    /// Small buffers and short history, for embedding next to a UI.
    #[must_use]
    pub fn compact() -> Self {
        Self {
            bus_capacity: 32,
            history_limit: 5,
            max_armed_timers: Some(1_024),
            stage_jitter_ms: 0,
        }
    }

    /// Load options from a JSON file and validate them.
    pub fn from_json_file(path: impl AsRef<Path>) -> RedopsResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            RedopsError::Config(format!("{}: {}", path.as_ref().display(), e))
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> RedopsResult<()> {
        if self.bus_capacity == 0 {
            return Err(RedopsError::Config("bus_capacity must be at least 1".into()));
        }
        if self.history_limit == 0 {
            return Err(RedopsError::Config("history_limit must be at least 1".into()));
        }
        if self.max_armed_timers == Some(0) {
            return Err(RedopsError::Config(
                "max_armed_timers must be at least 1 when set".into(),
            ));
        }
        Ok(())
    }

    #[inline]
    #[must_use]
    pub fn stage_jitter(&self) -> Duration {
        Duration::from_millis(self.stage_jitter_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: OrchestratorConfig = serde_json::from_str(r#"{"bus_capacity": 8}"#).unwrap();
        assert_eq!(config.bus_capacity, 8);
        assert_eq!(config.history_limit, 20);
        assert_eq!(config.max_armed_timers, None);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(serde_json::from_str::<OrchestratorConfig>(r#"{"bus_size": 8}"#).is_err());
    }

    #[test]
    fn zero_sizes_fail_validation() {
        let mut config = OrchestratorConfig::default();
        config.bus_capacity = 0;
        assert!(matches!(config.validate(), Err(RedopsError::Config(_))));

        let config = OrchestratorConfig {
            max_armed_timers: Some(0),
            ..OrchestratorConfig::compact()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn jitter_converts_to_duration() {
        let config = OrchestratorConfig {
            stage_jitter_ms: 250,
            ..Default::default()
        };
        assert_eq!(config.stage_jitter(), Duration::from_millis(250));
    }
}
