//! Scaling metrics collection
//!
//! This module samples a cluster during a scaling phase and returns the
//! parallel EC2-capacity / joined-node / timestamp series. Sampling goes
//! through a [`ClusterProbe`] so the polling loop can be driven by fakes in
//! tests and by the AWS CLI plus Slurm on a real cluster.

mod r#loop;
mod probe;

pub use probe::{parse_instance_ids, parse_joined_nodes, ParallelClusterProbe};
pub use r#loop::{CollectionConfig, PollingCollector, PollingCollectorBuilder};

use crate::models::ScalingSeries;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// Point-in-time counts for a cluster
#[async_trait]
pub trait ClusterProbe: Send + Sync {
    /// EC2 instances launched for the compute fleet (pending or running)
    async fn ec2_capacity(&self, region: &str, cluster_name: &str) -> Result<u32>;

    /// Compute nodes that have joined the scheduler
    async fn joined_nodes(&self) -> Result<u32>;
}

/// Parameters of one monitoring window
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CollectRequest {
    pub max_monitoring_time: Duration,
    pub region: String,
    pub cluster_name: String,
    /// Publish every sample to the metrics registry
    pub publish_metrics: bool,
    /// Stop sampling once both counts equal this size
    pub target_cluster_size: u32,
}

/// Trait for scaling metrics collection implementations
#[async_trait]
pub trait ScalingCollector: Send + Sync {
    /// Sample the cluster until it reaches the target size or the window
    /// closes. Reaching the end of the window is not an error: the caller
    /// finds out from the series.
    async fn collect(&self, request: &CollectRequest) -> Result<ScalingSeries>;
}
