//! Compute fleet lifecycle through the `pcluster` CLI

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::executor::{run_local_checked, RemoteExecutor};

/// clustermgtd configuration on the head node
pub const CLUSTERMGTD_CONFIG: &str =
    "/etc/parallelcluster/slurm_plugin/parallelcluster_clustermgtd.conf";

/// Start/stop of the compute fleet of an existing cluster
#[async_trait]
pub trait ClusterLifecycle: Send + Sync {
    fn name(&self) -> &str;

    /// Request the fleet to start, optionally waiting until it is running
    async fn start(&self, wait_running: bool) -> Result<()>;

    /// Request the fleet to stop; does not wait for nodes to go away
    async fn stop(&self) -> Result<()>;
}

/// Fleet status as reported by `pcluster describe-compute-fleet`
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ComputeFleetStatus {
    pub status: String,
    #[serde(default)]
    pub last_status_updated_time: Option<String>,
}

/// [`ClusterLifecycle`] implemented with the local `pcluster` CLI
pub struct PclusterCli {
    cluster_name: String,
    region: String,
    poll_interval: Duration,
    start_timeout: Duration,
}

impl PclusterCli {
    pub fn new(cluster_name: impl Into<String>, region: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
            region: region.into(),
            poll_interval: Duration::from_secs(10),
            start_timeout: Duration::from_secs(15 * 60),
        }
    }

    async fn update_fleet(&self, status: &str) -> Result<()> {
        run_local_checked(
            "pcluster",
            &[
                "update-compute-fleet",
                "--cluster-name",
                &self.cluster_name,
                "--region",
                &self.region,
                "--status",
                status,
            ],
        )
        .await
        .with_context(|| format!("Failed to set compute fleet of {} to {}", self.cluster_name, status))?;
        Ok(())
    }

    async fn describe_fleet(&self) -> Result<ComputeFleetStatus> {
        let output = run_local_checked(
            "pcluster",
            &[
                "describe-compute-fleet",
                "--cluster-name",
                &self.cluster_name,
                "--region",
                &self.region,
            ],
        )
        .await?;

        parse_fleet_status(&output.stdout)
    }
}

pub fn parse_fleet_status(stdout: &str) -> Result<ComputeFleetStatus> {
    serde_json::from_str(stdout).context("Failed to parse describe-compute-fleet output")
}

#[async_trait]
impl ClusterLifecycle for PclusterCli {
    fn name(&self) -> &str {
        &self.cluster_name
    }

    async fn start(&self, wait_running: bool) -> Result<()> {
        self.update_fleet("START_REQUESTED").await?;
        info!(cluster = %self.cluster_name, "Compute fleet start requested");

        if !wait_running {
            return Ok(());
        }

        let started = Instant::now();
        loop {
            let fleet = self.describe_fleet().await?;
            if fleet.status == "RUNNING" {
                info!(cluster = %self.cluster_name, "Compute fleet running");
                return Ok(());
            }
            debug!(cluster = %self.cluster_name, status = %fleet.status, "Waiting for compute fleet");

            if started.elapsed() >= self.start_timeout {
                anyhow::bail!(
                    "Compute fleet of {} still {} after {:?}",
                    self.cluster_name,
                    fleet.status,
                    started.elapsed()
                );
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn stop(&self) -> Result<()> {
        self.update_fleet("STOP_REQUESTED").await?;
        info!(cluster = %self.cluster_name, "Compute fleet stop requested");
        Ok(())
    }
}

/// Stop clustermgtd from halting scaling after repeated bootstrap failures
pub async fn disable_protected_mode(executor: &dyn RemoteExecutor) -> Result<()> {
    let command = format!(
        "sudo sed -i -E 's/^protected_failure_count *=.*/protected_failure_count = -1/' {0} && \
         (grep -q '^protected_failure_count' {0} || echo 'protected_failure_count = -1' | sudo tee -a {0} > /dev/null)",
        CLUSTERMGTD_CONFIG
    );
    executor
        .run_checked(&command)
        .await
        .context("Failed to disable protected mode")?;
    info!("Protected mode disabled");
    Ok(())
}
