mod args;
mod output;
mod runner;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, EnvFilter};

use args::{Cli, Commands};
use runner::{list_targets, run_analyze, run_report, run_scan, show_pipeline, ScanOptions};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Scan {
            target,
            config,
            pipeline,
            jitter_ms,
            bus_capacity,
            output_format,
        } => {
            run_scan(ScanOptions {
                target,
                config,
                pipeline,
                jitter_ms,
                bus_capacity,
                output_format,
            })
            .await?;
        }
        Commands::Targets { output_format } => list_targets(&output_format)?,
        Commands::Pipeline {
            pipeline,
            output_format,
        } => show_pipeline(pipeline.as_deref(), &output_format)?,
        Commands::Report {
            target,
            kind,
            out,
            json,
        } => run_report(&target, &kind, out.as_deref(), json).await?,
        Commands::Analyze { finding, brief } => run_analyze(&finding, brief).await?,
    }

    Ok(())
}

fn init_logging(verbose: u8) {
    let log_level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .compact()
        .init();
}
