use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "redops")]
#[command(version = "0.1.0")]
#[command(about = "Recon pipeline orchestrator with live scan logs", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the recon pipeline against a target and stream its log
    Scan {
        /// Target id or domain. Unknown domains are added as ad-hoc scopes
        #[arg(short = 't', long, required = true)]
        target: String,

        /// Orchestrator config file (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Pipeline definition file (JSON). Defaults to the standard recon pipeline
        #[arg(short, long)]
        pipeline: Option<PathBuf>,

        /// Random extra delay per stage in milliseconds (overrides config)
        #[arg(long)]
        jitter_ms: Option<u64>,

        /// Per-subscriber backlog bound (overrides config)
        #[arg(long)]
        bus_capacity: Option<usize>,

        /// Output format: text, json, csv
        #[arg(short, long, default_value = "text")]
        output_format: String,
    },

    /// List targets in scope
    Targets {
        /// Output format: text, json, csv
        #[arg(short, long, default_value = "text")]
        output_format: String,
    },

    /// Validate and print a pipeline definition
    Pipeline {
        /// Pipeline definition file (JSON). Defaults to the standard recon pipeline
        #[arg(short, long)]
        pipeline: Option<PathBuf>,

        /// Output format: text, json
        #[arg(short, long, default_value = "text")]
        output_format: String,
    },

    /// Generate a risk report for a target
    Report {
        /// Target id or domain
        #[arg(short = 't', long, required = true)]
        target: String,

        /// Report type
        #[arg(short, long, default_value = "executive", value_parser = ["executive", "technical", "compliance"])]
        kind: String,

        /// Write the report markdown here instead of stdout
        #[arg(long)]
        out: Option<PathBuf>,

        /// Print the report record as JSON
        #[arg(long)]
        json: bool,
    },

    /// Analyze a finding
    Analyze {
        /// Finding id, e.g. f1
        #[arg(short, long, required = true)]
        finding: String,

        /// Analyze the finding record only, without reconstructed tool output
        #[arg(long)]
        brief: bool,
    },
}
