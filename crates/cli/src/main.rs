//! Scaling bench operator CLI
//!
//! Queries a running scaling bench for its progress and results, and
//! inspects or checks timing baselines offline.

mod client;
mod commands;
mod config;
mod output;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use commands::{baseline, results, status};
use std::path::PathBuf;
use std::process::ExitCode;

/// Scaling bench CLI
#[derive(Parser)]
#[command(name = "scalectl")]
#[command(author, version, about = "CLI for the Cluster Scaling Bench", long_about = None)]
pub struct Cli {
    /// Bench API URL (can also be set via SCALECTL_API_URL env var)
    #[arg(long, env = "SCALECTL_API_URL")]
    pub api_url: Option<String>,

    /// Output format
    #[arg(long, short, default_value = "table")]
    pub format: output::OutputFormat,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Show the current phase of the bench
    Status,

    /// Show scaling results collected so far
    Results {
        /// Only show this scaling target
        #[arg(long, short)]
        target: Option<u32>,
    },

    /// Inspect and check timing baselines
    #[command(subcommand)]
    Baseline(BaselineCommands),
}

#[derive(Subcommand)]
pub enum BaselineCommands {
    /// Show the entries of a baseline file
    Show {
        /// Baseline file (defaults to the configured one)
        #[arg(long)]
        file: Option<PathBuf>,

        /// Only show this compute instance type
        #[arg(long, short)]
        instance: Option<String>,
    },

    /// Check results against a baseline file
    Check {
        /// Baseline file (defaults to the configured one)
        #[arg(long)]
        file: Option<PathBuf>,

        /// Read results from a report directory instead of the bench API
        #[arg(long)]
        reports: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            output::print_error(&format!("{:#}", e));
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = config::Config::load()?;
    let client = client::ApiClient::new(&config.api_url(cli.api_url.as_deref()))?;

    match cli.command {
        Commands::Status => status::show_status(&client, cli.format).await?,
        Commands::Results { target } => {
            results::show_results(&client, target, cli.format).await?;
        }
        Commands::Baseline(baseline_cmd) => match baseline_cmd {
            BaselineCommands::Show { file, instance } => {
                let path = baseline_file(file, &config)?;
                baseline::show_baseline(&path, instance.as_deref(), cli.format)?;
            }
            BaselineCommands::Check { file, reports } => {
                let path = baseline_file(file, &config)?;
                let reports = reports.or_else(|| config.report_dir.clone());
                let source = match &reports {
                    Some(dir) => baseline::ResultSource::Reports(dir),
                    None => baseline::ResultSource::Api(&client),
                };
                baseline::check_baseline(&path, source, cli.format).await?;
            }
        },
    }

    Ok(())
}

fn baseline_file(flag: Option<PathBuf>, config: &config::Config) -> Result<PathBuf> {
    flag.or_else(|| config.baseline_path.clone())
        .context("No baseline file given; pass --file or set baseline_path in the config")
}
