// runner.rs
use anyhow::{anyhow, Context, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

use redops_catalog::TargetCatalog;
use redops_common::{RedopsError, ReportKind, ReportStatus, Target, TargetStore};
use redops_orchestrator::{OrchestratorConfig, ProgressTracker, ScanOrchestrator};
use redops_pipeline::PipelineDefinition;
use redops_report::{GeminiClient, ReportService};

use crate::output::{print_event, print_pipeline, print_session, print_targets};

pub struct ScanOptions {
    pub target: String,
    pub config: Option<PathBuf>,
    pub pipeline: Option<PathBuf>,
    pub jitter_ms: Option<u64>,
    pub bus_capacity: Option<usize>,
    pub output_format: String,
}

pub async fn run_scan(opts: ScanOptions) -> Result<()> {
    let config = load_config(opts.config.as_deref(), opts.jitter_ms, opts.bus_capacity)?;
    let pipeline = load_pipeline(opts.pipeline.as_deref())?;
    let catalog = Arc::new(TargetCatalog::demo());
    let target = resolve_or_add(&catalog, &opts.target)?;

    info!("Starting scan...");
    info!("Target: {} (id {})", target.domain, target.id);
    info!("Stages: {}", pipeline.reachable_stages().len());
    info!("Bus capacity: {}", config.bus_capacity);
    if config.stage_jitter_ms > 0 {
        info!("Stage jitter: up to {}ms", config.stage_jitter_ms);
    }

    let store: Arc<dyn TargetStore> = catalog.clone();
    let orchestrator = ScanOrchestrator::builder(pipeline, store)
        .config(config)
        .build();
    let mut tracker = ProgressTracker::new(orchestrator.pipeline().reachable_stages().len());
    let live_output = is_text(&opts.output_format);

    let scan_start = Instant::now();
    let (session_id, mut subscription) = orchestrator
        .start_watched(&target.id)
        .with_context(|| format!("Failed to start scan of {}", target.domain))?;

    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);
    let mut interrupted = false;
    let mut events = Vec::new();

    loop {
        tokio::select! {
            next = subscription.next() => match next {
                Some(Ok(event)) => {
                    tracker.observe(&event);
                    if live_output {
                        print_event(&event);
                    }
                    events.push(event);
                }
                Some(Err(err)) => return Err(anyhow!(err).context("Lost the live log stream")),
                None => break,
            },
            _ = &mut ctrl_c, if !interrupted => {
                interrupted = true;
                warn!("Interrupted, cancelling session {}", session_id);
                let state = orchestrator.cancel(session_id)?;
                info!("Session is now {}", state);
            }
        }
    }
    let scan_duration = scan_start.elapsed();

    tracker.print_summary(subscription.outcome());
    let session = orchestrator
        .session(session_id)
        .ok_or_else(|| anyhow!("session {} vanished from the registry", session_id))?;
    print_session(&session, &target.domain, &events, &opts.output_format, scan_duration)?;
    Ok(())
}

pub fn list_targets(output_format: &str) -> Result<()> {
    let catalog = TargetCatalog::demo();
    print_targets(&catalog.list(), output_format)
}

pub fn show_pipeline(path: Option<&Path>, output_format: &str) -> Result<()> {
    let pipeline = load_pipeline(path)?;
    print_pipeline(&pipeline, output_format)
}

pub async fn run_report(target: &str, kind: &str, out: Option<&Path>, json: bool) -> Result<()> {
    let kind = parse_kind(kind)?;
    let catalog = TargetCatalog::demo();
    let target = catalog.resolve(target)?;
    let findings = catalog.findings(&target.id);
    let service = ReportService::new(GeminiClient::from_env()?);

    info!(
        "Generating {} report for {} ({} findings)",
        kind,
        target.domain,
        findings.len()
    );
    let report = service.generate_report(&target, &findings, kind).await;
    if report.status == ReportStatus::Failed {
        warn!("Report generation failed, returning fallback text");
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }
    let content = report.content.unwrap_or_default();
    match out {
        Some(path) => {
            std::fs::write(path, &content)
                .with_context(|| format!("Failed to write report to {}", path.display()))?;
            info!("Report written to {}", path.display());
        }
        None => println!("{}", content),
    }
    Ok(())
}

pub async fn run_analyze(finding_id: &str, brief: bool) -> Result<()> {
    let catalog = TargetCatalog::demo();
    let finding = catalog
        .finding(finding_id)
        .ok_or_else(|| RedopsError::NotFound(format!("finding '{}'", finding_id)))?;
    let service = ReportService::new(GeminiClient::from_env()?);

    let analysis = if brief {
        service.analyze_finding(&finding).await
    } else {
        let domain = catalog
            .get(&finding.target_id)
            .map(|t| t.domain)
            .unwrap_or_else(|| "unknown".to_string());
        service.triage_finding(&finding, &domain).await
    };
    println!("{}", analysis);
    Ok(())
}

/// Config file (or defaults) with command-line overrides applied.
fn load_config(
    path: Option<&Path>,
    jitter_ms: Option<u64>,
    bus_capacity: Option<usize>,
) -> Result<OrchestratorConfig> {
    let mut config = match path {
        Some(path) => OrchestratorConfig::from_json_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()))?,
        None => OrchestratorConfig::default(),
    };
    if let Some(jitter) = jitter_ms {
        config.stage_jitter_ms = jitter;
    }
    if let Some(capacity) = bus_capacity {
        config.bus_capacity = capacity;
    }
    config.validate()?;
    Ok(config)
}

fn load_pipeline(path: Option<&Path>) -> Result<PipelineDefinition> {
    match path {
        Some(path) => PipelineDefinition::from_json_file(path)
            .with_context(|| format!("Invalid pipeline {}", path.display())),
        None => Ok(PipelineDefinition::recon_default()),
    }
}

/// Look a target up by id or domain; unknown domains become ad-hoc scopes.
fn resolve_or_add(catalog: &TargetCatalog, query: &str) -> Result<Target> {
    match catalog.resolve(query) {
        Ok(target) => Ok(target),
        Err(RedopsError::NotFound(_)) => {
            let target = catalog.add_target(query, ["Ad-hoc"])?;
            info!("Added {} to scope", target.domain);
            Ok(target)
        }
        Err(err) => Err(err.into()),
    }
}

fn parse_kind(kind: &str) -> Result<ReportKind> {
    match kind.trim().to_lowercase().as_str() {
        "executive" => Ok(ReportKind::Executive),
        "technical" => Ok(ReportKind::Technical),
        "compliance" => Ok(ReportKind::Compliance),
        other => Err(anyhow!("Invalid report type '{}'", other)),
    }
}

fn is_text(format: &str) -> bool {
    matches!(format.trim().to_lowercase().as_str(), "text" | "table" | "t" | "")
}
