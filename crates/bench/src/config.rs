//! Bench configuration

use anyhow::{Context, Result};
use bench_lib::driver::ScalingContext;
use bench_lib::executor::SshConfig;
use bench_lib::models::ScalingStrategy;
use bench_lib::smoke::DEFAULT_MAX_NODES;
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Prefix of the environment variables overriding the config file
const ENV_PREFIX: &str = "SCALING";

/// Bench configuration
#[derive(Debug, Clone, Deserialize)]
pub struct BenchConfig {
    /// Name of the running cluster to drive
    pub cluster_name: String,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default = "default_os")]
    pub os: String,

    #[serde(default = "default_instance_type")]
    pub compute_instance_type: String,

    #[serde(default = "default_instance_type")]
    pub head_node_instance_type: String,

    #[serde(default)]
    pub scaling_strategy: ScalingStrategy,

    /// Cluster sizes to scale to, in order
    #[serde(default = "default_scaling_targets")]
    pub scaling_targets: Vec<u32>,

    /// Budget for each scale-up and scale-down window
    #[serde(default = "default_max_monitoring_minutes")]
    pub max_monitoring_minutes: u64,

    /// Pause between scaling targets
    #[serde(default = "default_refill_delay")]
    pub refill_delay_secs: u64,

    #[serde(default = "default_sample_interval")]
    pub sample_interval_secs: u64,

    #[serde(default = "default_publish_metrics")]
    pub publish_metrics: bool,

    #[serde(default = "default_baseline_path")]
    pub baseline_path: PathBuf,

    #[serde(default = "default_report_dir")]
    pub report_dir: PathBuf,

    /// API server port for health/metrics/progress
    #[serde(default = "default_api_port")]
    pub api_port: u16,

    pub ssh: SshSettings,

    #[serde(default)]
    pub smoke: SmokeSettings,
}

/// Head node connection
#[derive(Debug, Clone, Deserialize)]
pub struct SshSettings {
    pub host: String,

    #[serde(default = "default_ssh_user")]
    pub user: String,

    #[serde(default)]
    pub key_path: Option<PathBuf>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SmokeSettings {
    #[serde(default = "default_max_nodes")]
    pub max_nodes: u32,
}

impl Default for SmokeSettings {
    fn default() -> Self {
        Self {
            max_nodes: default_max_nodes(),
        }
    }
}

fn default_region() -> String {
    "us-east-1".to_string()
}

fn default_os() -> String {
    "alinux2".to_string()
}

fn default_instance_type() -> String {
    "c5.large".to_string()
}

fn default_scaling_targets() -> Vec<u32> {
    vec![1000, 2000, 3000, 4000]
}

fn default_max_monitoring_minutes() -> u64 {
    20
}

fn default_refill_delay() -> u64 {
    300
}

fn default_sample_interval() -> u64 {
    20
}

fn default_publish_metrics() -> bool {
    true
}

fn default_baseline_path() -> PathBuf {
    PathBuf::from("baseline/scaling.json")
}

fn default_report_dir() -> PathBuf {
    PathBuf::from("reports")
}

fn default_api_port() -> u16 {
    8080
}

fn default_ssh_user() -> String {
    "ec2-user".to_string()
}

fn default_max_nodes() -> u32 {
    DEFAULT_MAX_NODES
}

impl BenchConfig {
    /// Load configuration from an optional file, overridden by `SCALING_*`
    /// environment variables (`__` separates nested keys)
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::load_from(path, None)
    }

    fn load_from(path: Option<&Path>, env: Option<HashMap<String, String>>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(config::File::from(path));
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix(ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("scaling_targets")
                    .source(env),
            )
            .build()
            .context("Failed to read bench configuration")?;

        let config: BenchConfig = config
            .try_deserialize()
            .context("Invalid bench configuration")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.scaling_targets.is_empty() {
            anyhow::bail!("scaling_targets must list at least one cluster size");
        }
        if self.sample_interval_secs == 0 {
            anyhow::bail!("sample_interval_secs must be positive");
        }
        Ok(())
    }

    pub fn max_monitoring_time(&self) -> Duration {
        Duration::from_secs(self.max_monitoring_minutes * 60)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_secs(self.sample_interval_secs)
    }

    pub fn scaling_context(&self) -> ScalingContext {
        ScalingContext {
            region: self.region.clone(),
            os: self.os.clone(),
            compute_instance_type: self.compute_instance_type.clone(),
            head_node_instance_type: self.head_node_instance_type.clone(),
            scaling_strategy: self.scaling_strategy,
            max_monitoring_time: self.max_monitoring_time(),
            baseline_path: self.baseline_path.clone(),
            refill_delay: Duration::from_secs(self.refill_delay_secs),
            scaling_targets: self.scaling_targets.clone(),
            publish_metrics: self.publish_metrics,
        }
    }

    pub fn ssh_config(&self) -> SshConfig {
        SshConfig {
            host: self.ssh.host.clone(),
            user: self.ssh.user.clone(),
            key_path: self.ssh.key_path.clone(),
            ..Default::default()
        }
    }
}
