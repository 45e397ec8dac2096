//! Scaling metrics polling loop
//!
//! Samples the cluster at a fixed interval until both counts reach the
//! target size or the monitoring budget runs out.

use super::{ClusterProbe, CollectRequest, ScalingCollector};
use crate::health::{Component, HealthRegistry, HealthStatus};
use crate::models::{utc_to_epoch, ScalingSample, ScalingSeries};
use crate::observability::BenchMetrics;
use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tracing::{debug, info, warn};

/// Configuration for the polling loop
#[derive(Debug, Clone)]
pub struct CollectionConfig {
    /// Time between samples (default: 20 seconds)
    pub sample_interval: Duration,
    /// Consecutive failed samples before the collector reports degraded
    pub degraded_after: usize,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            sample_interval: Duration::from_secs(20),
            degraded_after: 3,
        }
    }
}

/// [`ScalingCollector`] that polls a [`ClusterProbe`]
pub struct PollingCollector {
    probe: Arc<dyn ClusterProbe>,
    config: CollectionConfig,
    metrics: BenchMetrics,
    health: Option<HealthRegistry>,
}

impl PollingCollector {
    pub fn new(probe: Arc<dyn ClusterProbe>, config: CollectionConfig) -> Self {
        Self {
            probe,
            config,
            metrics: BenchMetrics::new(),
            health: None,
        }
    }

    async fn mark_health(&self, status: HealthStatus, detail: Option<String>) {
        if let Some(health) = &self.health {
            health.mark(Component::Collector, status, detail).await;
        }
    }

    /// Take one sample, timestamped when both counts are in
    async fn sample(&self, request: &CollectRequest) -> Result<ScalingSample> {
        let ec2_capacity = self
            .probe
            .ec2_capacity(&request.region, &request.cluster_name)
            .await?;
        let compute_nodes = self.probe.joined_nodes().await?;

        Ok(ScalingSample {
            ec2_capacity,
            compute_nodes,
            timestamp: utc_to_epoch(Utc::now()),
        })
    }
}

#[async_trait]
impl ScalingCollector for PollingCollector {
    async fn collect(&self, request: &CollectRequest) -> Result<ScalingSeries> {
        info!(
            cluster = %request.cluster_name,
            target_cluster_size = request.target_cluster_size,
            max_monitoring_secs = request.max_monitoring_time.as_secs(),
            "Monitoring cluster size"
        );

        let deadline = Instant::now() + request.max_monitoring_time;
        let mut samples = Vec::new();
        let mut errors = 0usize;
        let mut consecutive_errors = 0usize;

        loop {
            match self.sample(request).await {
                Ok(sample) => {
                    if consecutive_errors >= self.config.degraded_after {
                        self.mark_health(HealthStatus::Healthy, None).await;
                    }
                    consecutive_errors = 0;
                    debug!(
                        cluster = %request.cluster_name,
                        ec2_capacity = sample.ec2_capacity,
                        compute_nodes = sample.compute_nodes,
                        "Cluster sampled"
                    );
                    if request.publish_metrics {
                        self.metrics.record_sample(
                            &request.cluster_name,
                            sample.ec2_capacity,
                            sample.compute_nodes,
                            request.target_cluster_size,
                        );
                    }
                    samples.push(sample);

                    if sample.ec2_capacity == request.target_cluster_size
                        && sample.compute_nodes == request.target_cluster_size
                    {
                        info!(
                            cluster = %request.cluster_name,
                            target_cluster_size = request.target_cluster_size,
                            samples = samples.len(),
                            "Cluster reached target size"
                        );
                        break;
                    }
                }
                Err(e) => {
                    errors += 1;
                    consecutive_errors += 1;
                    self.metrics.inc_probe_errors();
                    warn!(cluster = %request.cluster_name, error = %e, "Failed to sample cluster");

                    if consecutive_errors == self.config.degraded_after {
                        self.mark_health(
                            HealthStatus::Degraded,
                            Some(format!("{} consecutive samples failed: {:#}", consecutive_errors, e)),
                        )
                        .await;
                    }
                }
            }

            let now = Instant::now();
            if now >= deadline {
                warn!(
                    cluster = %request.cluster_name,
                    target_cluster_size = request.target_cluster_size,
                    samples = samples.len(),
                    errors,
                    "Monitoring window closed before the cluster reached target size"
                );
                break;
            }
            tokio::time::sleep(self.config.sample_interval.min(deadline - now)).await;
        }

        Ok(ScalingSeries::from_samples(&samples, Utc::now()))
    }
}

/// Builder for creating the polling collector
pub struct PollingCollectorBuilder {
    probe: Option<Arc<dyn ClusterProbe>>,
    config: CollectionConfig,
    health: Option<HealthRegistry>,
}

impl PollingCollectorBuilder {
    /// Create a new builder with default configuration
    pub fn new() -> Self {
        Self {
            probe: None,
            config: CollectionConfig::default(),
            health: None,
        }
    }

    /// Set the cluster probe
    pub fn probe(mut self, probe: Arc<dyn ClusterProbe>) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Set the sampling interval
    pub fn sample_interval(mut self, interval: Duration) -> Self {
        self.config.sample_interval = interval;
        self
    }

    /// Report repeated sampling failures to a health registry
    pub fn health(mut self, registry: HealthRegistry) -> Self {
        self.health = Some(registry);
        self
    }

    /// Build the collector
    pub fn build(self) -> Result<PollingCollector> {
        let probe = self
            .probe
            .ok_or_else(|| anyhow::anyhow!("Probe is required"))?;

        let mut collector = PollingCollector::new(probe, self.config);
        collector.health = self.health;
        Ok(collector)
    }
}

impl Default for PollingCollectorBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Probe replaying a fixed sequence of (ec2, nodes) counts; `None` fails
    struct ReplayProbe {
        counts: Mutex<VecDeque<Option<(u32, u32)>>>,
        current: Mutex<Option<(u32, u32)>>,
    }

    impl ReplayProbe {
        fn new(counts: Vec<Option<(u32, u32)>>) -> Self {
            Self {
                counts: Mutex::new(counts.into()),
                current: Mutex::new(None),
            }
        }
    }

    #[async_trait]
    impl ClusterProbe for ReplayProbe {
        async fn ec2_capacity(&self, _region: &str, _cluster_name: &str) -> Result<u32> {
            let next = self.counts.lock().unwrap().pop_front().flatten();
            *self.current.lock().unwrap() = next;
            next.map(|(ec2, _)| ec2)
                .ok_or_else(|| anyhow::anyhow!("describe-instances throttled"))
        }

        async fn joined_nodes(&self) -> Result<u32> {
            self.current
                .lock()
                .unwrap()
                .map(|(_, nodes)| nodes)
                .ok_or_else(|| anyhow::anyhow!("no sample"))
        }
    }

    fn request(target: u32, budget: Duration) -> CollectRequest {
        CollectRequest {
            max_monitoring_time: budget,
            region: "us-east-1".to_string(),
            cluster_name: "bench".to_string(),
            publish_metrics: true,
            target_cluster_size: target,
        }
    }

    fn collector(counts: Vec<Option<(u32, u32)>>) -> PollingCollector {
        PollingCollectorBuilder::new()
            .probe(Arc::new(ReplayProbe::new(counts)))
            .sample_interval(Duration::from_millis(1))
            .build()
            .unwrap()
    }

    #[test]
    fn test_collection_config_default() {
        let config = CollectionConfig::default();
        assert_eq!(config.sample_interval, Duration::from_secs(20));
        assert_eq!(config.degraded_after, 3);
    }

    #[test]
    fn test_builder_missing_probe() {
        assert!(PollingCollectorBuilder::new().build().is_err());
    }

    #[tokio::test]
    async fn test_collect_stops_at_target() {
        let collector = collector(vec![
            Some((0, 0)),
            Some((6, 2)),
            Some((10, 7)),
            Some((10, 10)),
            Some((10, 10)),
        ]);

        let series = collector
            .collect(&request(10, Duration::from_secs(5)))
            .await
            .unwrap();

        assert_eq!(series.ec2_capacity(), &[0, 6, 10, 10]);
        assert_eq!(series.compute_nodes(), &[0, 2, 7, 10]);
        assert_eq!(series.timestamps().len(), 4);
        assert!(series.timestamps().windows(2).all(|w| w[0] <= w[1]));
    }

    #[tokio::test]
    async fn test_collect_skips_failed_samples() {
        let collector = collector(vec![Some((1, 0)), None, Some((0, 0))]);

        let series = collector
            .collect(&request(0, Duration::from_secs(5)))
            .await
            .unwrap();

        assert_eq!(series.ec2_capacity(), &[1, 0]);
        assert_eq!(series.compute_nodes(), &[0, 0]);
    }

    #[tokio::test]
    async fn test_collect_returns_partial_series_when_window_closes() {
        let counts = (0..10_000).map(|_| Some((3, 1))).collect();
        let collector = collector(counts);

        let series = collector
            .collect(&request(10, Duration::from_millis(30)))
            .await
            .unwrap();

        assert!(!series.is_empty());
        assert_eq!(series.peak_ec2_capacity(), Some(3));
        assert_eq!(series.ec2_capacity().len(), series.timestamps().len());
    }

    fn collector_with_health(
        counts: Vec<Option<(u32, u32)>>,
        registry: &HealthRegistry,
    ) -> PollingCollector {
        PollingCollectorBuilder::new()
            .probe(Arc::new(ReplayProbe::new(counts)))
            .sample_interval(Duration::from_millis(1))
            .health(registry.clone())
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_repeated_failures_degrade_collector() {
        let registry = HealthRegistry::new();
        let collector = collector_with_health(vec![Some((1, 1)), None, None, None], &registry);

        // Probe keeps failing once the script runs out
        collector
            .collect(&request(0, Duration::from_millis(30)))
            .await
            .unwrap();

        let report = registry.report().await;
        let health = &report.components[&Component::Collector];
        assert_eq!(health.status, HealthStatus::Degraded);
        assert!(health
            .detail
            .as_deref()
            .unwrap()
            .starts_with("3 consecutive samples failed"));
    }

    #[tokio::test]
    async fn test_isolated_failures_keep_collector_healthy() {
        let registry = HealthRegistry::new();
        let collector = collector_with_health(
            vec![None, None, Some((2, 2)), None, None, Some((0, 0))],
            &registry,
        );

        collector
            .collect(&request(0, Duration::from_secs(5)))
            .await
            .unwrap();

        let report = registry.report().await;
        assert_eq!(report.components[&Component::Collector].status, HealthStatus::Healthy);
    }

    #[tokio::test]
    async fn test_good_sample_restores_collector() {
        let registry = HealthRegistry::new();
        let collector =
            collector_with_health(vec![None, None, None, None, Some((0, 0))], &registry);

        let series = collector
            .collect(&request(0, Duration::from_secs(5)))
            .await
            .unwrap();

        assert_eq!(series.ec2_capacity(), &[0]);
        let report = registry.report().await;
        let health = &report.components[&Component::Collector];
        assert_eq!(health.status, HealthStatus::Healthy);
        assert!(health.detail.is_none());
    }
}
