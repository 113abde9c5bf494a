//! Pipeline definitions
//!
//! A definition is validated once, when it is authored (in code or loaded
//! from JSON). After that it is immutable and shared between sessions.

use serde::Deserialize;
use std::collections::HashSet;
use std::path::Path;
use std::time::Duration;
use tracing::warn;

use redops_common::{PipelineStage, RedopsError, RedopsResult, Severity};

/// Ordered, validated catalog of pipeline stages.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PipelineDefinition {
    stages: Vec<PipelineStage>,
    terminal_index: usize,
}

/// JSON authoring form of a stage.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StageSpec {
    pub tool: String,
    pub message: String,
    pub offset_ms: u64,
    #[serde(default)]
    pub level: Option<Severity>,
    #[serde(default)]
    pub terminal: bool,
}

impl From<StageSpec> for PipelineStage {
    fn from(spec: StageSpec) -> Self {
        PipelineStage {
            tool: spec.tool,
            message: spec.message,
            offset: Duration::from_millis(spec.offset_ms),
            severity: spec.level,
            terminal: spec.terminal,
        }
    }
}

impl PipelineDefinition {
    /// Validate and build a definition.
    ///
    /// Offsets must be non-decreasing, every (tool, offset) pair unique, and at
    /// least one stage terminal. Stages after the first terminal stage are kept
    /// but will never be published.
    pub fn new(stages: Vec<PipelineStage>) -> RedopsResult<Self> {
        if stages.is_empty() {
            return Err(RedopsError::InvalidDefinition(
                "pipeline has no stages".to_string(),
            ));
        }

        let mut seen = HashSet::with_capacity(stages.len());
        let mut previous: Option<&PipelineStage> = None;
        for (index, stage) in stages.iter().enumerate() {
            if stage.tool.trim().is_empty() {
                return Err(RedopsError::InvalidDefinition(format!(
                    "stage {} has an empty tool name",
                    index
                )));
            }
            if let Some(prev) = previous {
                if stage.offset < prev.offset {
                    return Err(RedopsError::InvalidDefinition(format!(
                        "stage {} ({}) fires at {}ms, before stage {} ({}) at {}ms",
                        index,
                        stage.tool,
                        stage.offset.as_millis(),
                        index - 1,
                        prev.tool,
                        prev.offset.as_millis()
                    )));
                }
            }
            if !seen.insert((stage.tool.as_str(), stage.offset)) {
                return Err(RedopsError::InvalidDefinition(format!(
                    "stage {} duplicates tool '{}' at {}ms",
                    index,
                    stage.tool,
                    stage.offset.as_millis()
                )));
            }
            previous = Some(stage);
        }

        let terminal_index = stages
            .iter()
            .position(|s| s.terminal)
            .ok_or_else(|| {
                RedopsError::InvalidDefinition("pipeline has no terminal stage".to_string())
            })?;

        let unreachable = stages.len() - terminal_index - 1;
        if unreachable > 0 {
            warn!(
                "{} stage(s) declared after terminal stage '{}' will never fire",
                unreachable, stages[terminal_index].tool
            );
        }

        Ok(Self {
            stages,
            terminal_index,
        })
    }

    /// Parse a JSON array of stage specs.
    pub fn from_json(json: &str) -> RedopsResult<Self> {
        let specs: Vec<StageSpec> = serde_json::from_str(json)
            .map_err(|e| RedopsError::InvalidDefinition(format!("malformed pipeline JSON: {}", e)))?;
        Self::new(specs.into_iter().map(PipelineStage::from).collect())
    }

    /// Load a JSON pipeline definition from disk.
    pub fn from_json_file(path: impl AsRef<Path>) -> RedopsResult<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_json(&raw)
    }

    /// The dashboard's standard recon pipeline.
    #[must_use]
    pub fn recon_default() -> Self {
        let ms = Duration::from_millis;
        let stages = vec![
            PipelineStage::new("dnsx", "Resolving DNS for {target}...", ms(500)),
            PipelineStage::new("subfinder", "Found 12 subdomains via passive sources", ms(1500))
                .with_severity(Severity::Success),
            PipelineStage::new("httpx", "Active probing started on 12 hosts", ms(2500)),
            PipelineStage::new("nmap", "Port scanning top 1000 ports", ms(4000)),
            PipelineStage::new("nmap", "Discovered Open Port: 80, 443, 8080", ms(5500))
                .with_severity(Severity::Warning),
            PipelineStage::new("ffuf", "Fuzzing directories on port 8080...", ms(7000)),
            PipelineStage::new("nuclei", "Running template scan (CVE-2023-*)", ms(9000)),
            PipelineStage::new("nuclei", "[CRITICAL] Found blind SQLi detected", ms(10500))
                .with_severity(Severity::Error),
            PipelineStage::new("system", "Pipeline completed successfully.", ms(12000))
                .with_severity(Severity::Success)
                .terminal(),
        ];
        let terminal_index = stages.len() - 1;
        Self {
            stages,
            terminal_index,
        }
    }

    /// All declared stages, in order.
    #[inline]
    #[must_use]
    pub fn stages(&self) -> &[PipelineStage] {
        &self.stages
    }

    /// Stages that can actually publish: everything up to the first terminal stage.
    #[inline]
    #[must_use]
    pub fn reachable_stages(&self) -> &[PipelineStage] {
        &self.stages[..=self.terminal_index]
    }

    #[inline]
    #[must_use]
    pub fn terminal_index(&self) -> usize {
        self.terminal_index
    }

    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.stages.len()
    }

    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }

    /// Time from session start to the terminal stage.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.stages[self.terminal_index].offset
    }
}
