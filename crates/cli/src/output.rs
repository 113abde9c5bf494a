//! Output formatting for scan logs, targets and pipelines

use anyhow::Result;
use chrono::Local;
use serde_json::json;
use std::time::Duration;

use redops_common::{LogEvent, ScanSession, Target};
use redops_pipeline::PipelineDefinition;

/// One terminal line: `[HH:MM:SS] TOOL message`
pub fn format_event_line(event: &LogEvent) -> String {
    format!(
        "[{}] {:<10} {:<8} {}",
        event.timestamp.with_timezone(&Local).format("%H:%M:%S"),
        event.tool.to_uppercase(),
        event.severity,
        event.message
    )
}

pub fn print_event(event: &LogEvent) {
    println!("{}", format_event_line(event));
}

/// Print the outcome of a scan session in the specified format
pub fn print_session(
    session: &ScanSession,
    domain: &str,
    events: &[LogEvent],
    format: &str,
    scan_duration: Duration,
) -> Result<()> {
    let format = format.trim().to_lowercase();
    match format.as_str() {
        "json" | "j" => print_session_json(session, domain, events, scan_duration)?,
        "csv" | "c" => print_events_csv(events),
        "table" | "text" | "t" | "" => print_session_summary(session, domain, events, scan_duration),
        _ => {
            eprintln!("Warning: Unknown format '{}', using default text format", format);
            print_session_summary(session, domain, events, scan_duration);
        }
    }
    Ok(())
}

fn print_session_summary(
    session: &ScanSession,
    domain: &str,
    events: &[LogEvent],
    scan_duration: Duration,
) {
    println!("{:-<80}", "");
    println!("Summary for {}:", domain);
    println!("  Session: {}", session.id);
    println!("  State: {}", session.state);
    println!("  Events: {}", events.len());
    println!("  Duration: {}", format_duration(scan_duration));
    println!();
}

fn print_session_json(
    session: &ScanSession,
    domain: &str,
    events: &[LogEvent],
    scan_duration: Duration,
) -> Result<()> {
    let output = json!({
        "scan_info": {
            "target": domain,
            "duration_seconds": scan_duration.as_secs_f64(),
            "duration_formatted": format_duration(scan_duration),
        },
        "session": session,
        "events": events,
    });
    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

fn print_events_csv(events: &[LogEvent]) {
    println!("sequence,timestamp,tool,severity,message");
    for event in events {
        println!(
            "{},{},{},{},{}",
            event.sequence,
            event.timestamp.to_rfc3339(),
            event.tool,
            event.severity,
            csv_field(&event.message)
        );
    }
}

/// Print targets in the specified format
pub fn print_targets(targets: &[Target], format: &str) -> Result<()> {
    match format.trim().to_lowercase().as_str() {
        "json" | "j" => println!("{}", serde_json::to_string_pretty(targets)?),
        "csv" | "c" => {
            println!("id,domain,status,risk_score,last_scan,tags");
            for t in targets {
                println!(
                    "{},{},{},{},{},{}",
                    t.id,
                    t.domain,
                    t.status,
                    t.risk_score,
                    t.last_scan.map(|ts| ts.to_rfc3339()).unwrap_or_default(),
                    csv_field(&t.tags.join(";"))
                );
            }
        }
        _ => {
            println!("\n{:-<80}", "");
            println!(
                "{:<4} {:<28} {:<10} {:<5} {:<8} {:<20}",
                "ID", "DOMAIN", "STATUS", "RISK", "CRIT/HI", "LAST SCAN"
            );
            println!("{:-<80}", "");
            for t in targets {
                println!(
                    "{:<4} {:<28} {:<10} {:<5} {:<8} {:<20}",
                    t.id,
                    t.domain,
                    t.status,
                    t.risk_score,
                    format!("{}/{}", t.findings_count.critical, t.findings_count.high),
                    t.last_scan
                        .map(|ts| ts.format("%Y-%m-%d %H:%M").to_string())
                        .unwrap_or_else(|| "never".to_string())
                );
            }
            println!("{:-<80}\n", "");
        }
    }
    Ok(())
}

/// Print a pipeline definition in the specified format
pub fn print_pipeline(pipeline: &PipelineDefinition, format: &str) -> Result<()> {
    if matches!(format.trim().to_lowercase().as_str(), "json" | "j") {
        let stages: Vec<_> = pipeline
            .stages()
            .iter()
            .map(|s| {
                json!({
                    "tool": s.tool,
                    "message": s.message,
                    "offset_ms": s.offset.as_millis() as u64,
                    "level": s.severity,
                    "terminal": s.terminal,
                })
            })
            .collect();
        println!("{}", serde_json::to_string_pretty(&stages)?);
        return Ok(());
    }

    println!("\n{:-<80}", "");
    println!("{:<4} {:<10} {:<10} {:<8} {:<44}", "#", "AT", "TOOL", "LEVEL", "MESSAGE");
    println!("{:-<80}", "");
    for (i, s) in pipeline.stages().iter().enumerate() {
        let marker = if i > pipeline.terminal_index() { " (unreachable)" } else { "" };
        println!(
            "{:<4} {:<10} {:<10} {:<8} {}{}",
            i + 1,
            format_duration(s.offset),
            s.tool,
            s.severity.map(|l| l.to_string()).unwrap_or_else(|| "-".to_string()),
            s.message,
            marker
        );
    }
    println!("{:-<80}", "");
    println!("  Total duration: {}\n", format_duration(pipeline.duration()));
    Ok(())
}

fn csv_field(value: &str) -> String {
    let escaped = value.replace('"', "\"\"").replace('\n', " ").replace('\r', "");
    format!("\"{}\"", escaped)
}

/// Format duration in a human-readable way
pub fn format_duration(duration: Duration) -> String {
    let total_secs = duration.as_secs();
    let millis = duration.subsec_millis();

    if total_secs == 0 {
        format!("{}ms", millis)
    } else if total_secs < 60 {
        if millis > 0 {
            format!("{}.{:03}s", total_secs, millis)
        } else {
            format!("{}s", total_secs)
        }
    } else {
        let mins = total_secs / 60;
        let secs = total_secs % 60;
        if secs > 0 {
            format!("{}m {}s", mins, secs)
        } else {
            format!("{}m", mins)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use redops_common::{SessionState, Severity};
    use uuid::Uuid;

    fn sample() -> (ScanSession, Vec<LogEvent>) {
        let mut session = ScanSession::new(Uuid::new_v4(), "1");
        session.transition(SessionState::Running).unwrap();
        let events = vec![
            LogEvent::new(session.id, 1, "dnsx", "Resolving DNS for a.demo.com...", Severity::Info),
            LogEvent::new(session.id, 2, "nuclei", "Found \"blind\" SQLi", Severity::Error),
        ];
        session.transition(SessionState::Completed).unwrap();
        (session, events)
    }

    #[test]
    fn test_event_line_uppercases_tool() {
        let (_, events) = sample();
        let line = format_event_line(&events[0]);
        assert!(line.starts_with('['));
        assert!(line.contains("] DNSX"));
        assert!(line.contains("INFO"));
        assert!(line.ends_with("Resolving DNS for a.demo.com..."));
    }

    #[test]
    fn test_print_session_formats() {
        let (session, events) = sample();
        for format in ["json", "csv", "text", "bogus"] {
            assert!(print_session(&session, "a.demo.com", &events, format, Duration::from_secs(12)).is_ok());
        }
    }

    #[test]
    fn test_print_targets_and_pipeline() {
        let targets = vec![Target::new("1", "a.demo.com").with_tags(["Prod", "AWS"])];
        assert!(print_targets(&targets, "text").is_ok());
        assert!(print_targets(&targets, "csv").is_ok());

        let pipeline = PipelineDefinition::recon_default();
        assert!(print_pipeline(&pipeline, "text").is_ok());
        assert!(print_pipeline(&pipeline, "json").is_ok());
    }

    #[test]
    fn test_csv_field_escapes_quotes() {
        assert_eq!(csv_field("a \"b\"\nc"), "\"a \"\"b\"\" c\"");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_millis(500)), "500ms");
        assert_eq!(format_duration(Duration::from_secs(5)), "5s");
        assert_eq!(format_duration(Duration::from_millis(5500)), "5.500s");
        assert_eq!(format_duration(Duration::from_secs(65)), "1m 5s");
        assert_eq!(format_duration(Duration::from_secs(120)), "2m");
    }
}
