//! Scaling bench - drives a running cluster through scaling cycles
//!
//! Runs either the fixed-size smoke test or the scale-up/scale-down stress
//! test, serving health, metrics and progress over HTTP meanwhile.

use anyhow::Result;
use bench_lib::{
    cluster::PclusterCli,
    collector::{ParallelClusterProbe, PollingCollectorBuilder},
    driver::ScalingDriver,
    executor::{RemoteExecutor, SshExecutor},
    health::{Component, HealthRegistry},
    models::RunPhase,
    observability::{BenchMetrics, StructuredLogger},
    progress::RunTracker,
    report::JsonFileReporter,
    scheduler::SlurmCommands,
    smoke::run_smoke_test,
};
use clap::{Parser, Subcommand};
use scaling_bench::{api, config::BenchConfig};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const BENCH_VERSION: &str = env!("CARGO_PKG_VERSION");

#[derive(Parser)]
#[command(name = "scaling-bench")]
#[command(about = "Cluster scaling benchmark runner", long_about = None)]
#[command(version)]
struct Cli {
    /// Configuration file (TOML, JSON or YAML)
    #[arg(short, long, env = "SCALING_CONFIG")]
    config: Option<PathBuf>,

    /// Keep serving status and results after the run until interrupted
    #[arg(long)]
    wait_for_shutdown: bool,

    #[command(subcommand)]
    command: Mode,
}

#[derive(Subcommand)]
enum Mode {
    /// Scale up and down through every configured target
    Stress,

    /// Run one large job and check for bootstrap failures
    Smoke {
        /// Nodes requested by the job (overrides the config)
        #[arg(long)]
        max_nodes: Option<u32>,
    },
}

impl Mode {
    fn name(&self) -> &'static str {
        match self {
            Mode::Stress => "stress",
            Mode::Smoke { .. } => "smoke",
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %format!("{:#}", e), "Scaling bench failed");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let config = BenchConfig::load(cli.config.as_deref())?;
    info!(
        cluster = %config.cluster_name,
        region = %config.region,
        targets = ?config.scaling_targets,
        "Bench configured"
    );

    let health_registry = HealthRegistry::new();

    let metrics = BenchMetrics::new();
    metrics.set_run_info(
        &config.region,
        &config.compute_instance_type,
        config.scaling_strategy.as_str(),
    );

    let logger = StructuredLogger::new(&config.cluster_name);
    logger.log_startup(BENCH_VERSION, cli.command.name());

    let tracker = RunTracker::new();
    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics.clone(),
        tracker.clone(),
    ));
    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    let executor: Arc<dyn RemoteExecutor> = Arc::new(SshExecutor::new(config.ssh_config()));
    let preflight = executor.run_checked("hostname").await;
    health_registry
        .observe(Component::HeadNode, &preflight)
        .await;
    preflight?;
    health_registry.set_ready(true).await;

    let scheduler = Arc::new(SlurmCommands::new(executor.clone())?);

    let outcome = match cli.command {
        Mode::Smoke { max_nodes } => {
            let max_nodes = max_nodes.unwrap_or(config.smoke.max_nodes);
            tracker.set_phase(RunPhase::SmokeTest, Some(max_nodes)).await;
            let outcome =
                run_smoke_test(executor.as_ref(), scheduler.as_ref(), &logger, max_nodes).await;
            health_registry
                .observe(Component::Scheduler, &outcome)
                .await;
            match &outcome {
                Ok(()) => tracker.complete().await,
                Err(e) => tracker.fail(format!("{:#}", e)).await,
            }
            outcome
        }
        Mode::Stress => {
            let collector = PollingCollectorBuilder::new()
                .probe(Arc::new(ParallelClusterProbe::new(executor.clone())))
                .sample_interval(config.sample_interval())
                .health(health_registry.clone())
                .build()?;

            let driver = ScalingDriver::new(
                config.scaling_context(),
                executor.clone(),
                scheduler,
                Arc::new(PclusterCli::new(&config.cluster_name, &config.region)),
                Arc::new(collector),
                Arc::new(JsonFileReporter::new(&config.report_dir)),
            )
            .with_tracker(tracker.clone());

            let outcome = driver.run_stress_test().await;
            health_registry
                .observe(Component::ComputeFleet, &outcome)
                .await;
            outcome.map(|results| {
                info!(targets = results.len(), "Stress test finished");
            })
        }
    };

    if cli.wait_for_shutdown {
        info!(port = config.api_port, "Run finished, serving results until interrupted");
        tokio::signal::ctrl_c().await?;
        logger.log_shutdown("SIGINT received");
    } else {
        logger.log_shutdown("run finished");
    }
    api_handle.abort();

    outcome
}
