//! Report and analysis generation on top of a [`TextGenerator`]

use chrono::Utc;
use tracing::{info, instrument, warn};
use uuid::Uuid;

use redops_common::{Finding, Report, ReportKind, ReportStatus, Target, TextGenerator};

use crate::prompts;

pub const REPORT_FALLBACK: &str = "Unable to generate report. Please check API Key configuration.";
pub const EMPTY_REPORT: &str = "Failed to generate report content.";
pub const ANALYSIS_FALLBACK: &str = "Analysis failed.";

/// Turns targets and findings into generated reports and analyses.
///
/// Generator failures never surface as errors: reports come back FAILED with
/// a fallback body, analyses come back as [`ANALYSIS_FALLBACK`].
pub struct ReportService<G> {
    generator: G,
}

impl<G: TextGenerator> ReportService<G> {
    pub fn new(generator: G) -> Self {
        Self { generator }
    }

    pub fn generator(&self) -> &G {
        &self.generator
    }

    #[instrument(skip(self, target, findings), fields(target = %target.domain, generator = self.generator.name()))]
    pub async fn generate_report(
        &self,
        target: &Target,
        findings: &[Finding],
        kind: ReportKind,
    ) -> Report {
        let prompt = prompts::report_prompt(target, findings, kind);
        let (status, content) = match self.generator.generate(&prompt).await {
            Ok(text) if text.trim().is_empty() => (ReportStatus::Ready, EMPTY_REPORT.to_string()),
            Ok(text) => (ReportStatus::Ready, text),
            Err(err) => {
                warn!("Report generation failed: {}", err);
                (ReportStatus::Failed, REPORT_FALLBACK.to_string())
            }
        };
        info!(%kind, ?status, findings = findings.len(), "Report generated");

        Report {
            id: Uuid::new_v4().simple().to_string(),
            title: prompts::report_title(&target.domain, kind),
            target_id: target.id.clone(),
            kind,
            generated_at: Utc::now(),
            status,
            content: Some(content),
        }
    }

    pub async fn analyze_finding(&self, finding: &Finding) -> String {
        let prompt = prompts::finding_prompt(finding);
        self.analysis(&prompt).await
    }

    pub async fn analyze_tool_output(&self, raw_output: &str, tool: &str) -> String {
        let prompt = prompts::tool_output_prompt(raw_output, tool);
        self.analysis(&prompt).await
    }

    /// Analyze a finding as if its tool had just printed it.
    pub async fn triage_finding(&self, finding: &Finding, domain: &str) -> String {
        let raw = prompts::simulated_tool_output(finding, domain);
        self.analyze_tool_output(&raw, &finding.tool).await
    }

    async fn analysis(&self, prompt: &str) -> String {
        match self.generator.generate(prompt).await {
            Ok(text) => text,
            Err(err) => {
                warn!("Analysis failed: {}", err);
                ANALYSIS_FALLBACK.to_string()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use redops_catalog::TargetCatalog;
    use redops_common::{RedopsError, RedopsResult, TargetStore};

    #[derive(Default)]
    struct ScriptedGenerator {
        reply: Option<String>,
        prompts: Mutex<Vec<String>>,
    }

    impl ScriptedGenerator {
        fn replying(text: &str) -> Self {
            Self {
                reply: Some(text.to_string()),
                ..Default::default()
            }
        }

        fn last_prompt(&self) -> String {
            self.prompts.lock().last().cloned().unwrap_or_default()
        }
    }

    #[async_trait]
    impl TextGenerator for ScriptedGenerator {
        async fn generate(&self, prompt: &str) -> RedopsResult<String> {
            self.prompts.lock().push(prompt.to_string());
            self.reply
                .clone()
                .ok_or_else(|| RedopsError::Generation("API_KEY is not defined".into()))
        }

        fn name(&self) -> &str {
            "scripted"
        }
    }

    #[tokio::test]
    async fn report_is_ready_with_generated_content() {
        let catalog = TargetCatalog::demo();
        let target = catalog.get("1").unwrap();
        let findings = catalog.findings("1");
        let service = ReportService::new(ScriptedGenerator::replying("# Executive Summary"));

        let report = service
            .generate_report(&target, &findings, ReportKind::Executive)
            .await;
        assert_eq!(report.status, ReportStatus::Ready);
        assert_eq!(report.content.as_deref(), Some("# Executive Summary"));
        assert_eq!(report.title, "corp-internal.demo.com - Executive Report");
        assert_eq!(report.target_id, "1");
        assert_eq!(report.kind, ReportKind::Executive);

        let prompt = service.generator().last_prompt();
        assert!(prompt.contains("SQL Injection in /login parameter"));
        assert!(!prompt.contains("RCE via Log4Shell"));
    }

    #[tokio::test]
    async fn failing_generator_yields_failed_report() {
        let catalog = TargetCatalog::demo();
        let target = catalog.get("2").unwrap();
        let service = ReportService::new(ScriptedGenerator::default());

        let report = service
            .generate_report(&target, &catalog.findings("2"), ReportKind::Technical)
            .await;
        assert_eq!(report.status, ReportStatus::Failed);
        assert_eq!(report.content.as_deref(), Some(REPORT_FALLBACK));
    }

    #[tokio::test]
    async fn blank_generation_is_replaced() {
        let catalog = TargetCatalog::demo();
        let target = catalog.get("3").unwrap();
        let service = ReportService::new(ScriptedGenerator::replying("  "));

        let report = service
            .generate_report(&target, &[], ReportKind::Compliance)
            .await;
        assert_eq!(report.status, ReportStatus::Ready);
        assert_eq!(report.content.as_deref(), Some(EMPTY_REPORT));
    }

    #[tokio::test]
    async fn analyses_fall_back_on_failure() {
        let catalog = TargetCatalog::demo();
        let finding = catalog.finding("f6").unwrap();

        let failing = ReportService::new(ScriptedGenerator::default());
        assert_eq!(failing.analyze_finding(&finding).await, ANALYSIS_FALLBACK);
        assert_eq!(
            failing.analyze_tool_output("PORT 6379 open", "nmap").await,
            ANALYSIS_FALLBACK
        );

        let working = ReportService::new(ScriptedGenerator::replying("### 1. Classification"));
        let analysis = working.triage_finding(&finding, "legacy-api.demo.com").await;
        assert_eq!(analysis, "### 1. Classification");
        let prompt = working.generator().last_prompt();
        assert!(prompt.contains("Scan ID: VULN-F6"));
        assert!(prompt.contains(r#"security tool "Nmap""#));
    }
}
