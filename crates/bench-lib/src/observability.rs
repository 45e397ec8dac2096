//! Observability infrastructure for the scaling bench
//!
//! Provides:
//! - Prometheus metrics (sampled cluster size, scaling durations, probe errors)
//! - Structured JSON logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram_vec, register_int_gauge, register_int_gauge_vec,
    GaugeVec, HistogramVec, IntGauge, IntGaugeVec,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Histogram buckets for scaling durations (in seconds)
const SCALING_DURATION_BUCKETS: &[f64] = &[
    30.0, 60.0, 120.0, 180.0, 240.0, 300.0, 420.0, 600.0, 900.0, 1200.0, 1800.0,
];

/// Global metrics instance (registered once)
static GLOBAL_METRICS: OnceLock<BenchMetricsInner> = OnceLock::new();

/// Inner metrics structure that holds the actual Prometheus metrics
struct BenchMetricsInner {
    ec2_capacity: IntGaugeVec,
    compute_nodes: IntGaugeVec,
    target_cluster_size: IntGaugeVec,
    scaling_duration_seconds: HistogramVec,
    probe_errors: IntGauge,
    assertion_failures: IntGauge,
    run_info: GaugeVec,
}

impl BenchMetricsInner {
    fn new() -> Self {
        Self {
            ec2_capacity: register_int_gauge_vec!(
                "scaling_bench_ec2_capacity",
                "EC2 instances launched for the compute fleet at the last sample",
                &["cluster"]
            )
            .expect("Failed to register ec2_capacity"),

            compute_nodes: register_int_gauge_vec!(
                "scaling_bench_compute_nodes",
                "Compute nodes joined to the scheduler at the last sample",
                &["cluster"]
            )
            .expect("Failed to register compute_nodes"),

            target_cluster_size: register_int_gauge_vec!(
                "scaling_bench_target_cluster_size",
                "Cluster size the current monitoring window waits for",
                &["cluster"]
            )
            .expect("Failed to register target_cluster_size"),

            scaling_duration_seconds: register_histogram_vec!(
                "scaling_bench_scaling_duration_seconds",
                "Observed time to reach a scaling target",
                &["phase"],
                SCALING_DURATION_BUCKETS.to_vec()
            )
            .expect("Failed to register scaling_duration_seconds"),

            probe_errors: register_int_gauge!(
                "scaling_bench_probe_errors_total",
                "Total number of failed cluster samples"
            )
            .expect("Failed to register probe_errors"),

            assertion_failures: register_int_gauge!(
                "scaling_bench_assertion_failures",
                "Soft assertion failures accumulated in the current run"
            )
            .expect("Failed to register assertion_failures"),

            run_info: register_gauge_vec!(
                "scaling_bench_run_info",
                "Information about the current benchmark run",
                &["region", "compute_node", "scaling_strategy"]
            )
            .expect("Failed to register run_info"),
        }
    }
}

/// Bench metrics for Prometheus exposition
///
/// This is a lightweight handle to the global metrics instance.
/// Multiple clones share the same underlying metrics.
#[derive(Clone)]
pub struct BenchMetrics {
    _private: (),
}

impl Default for BenchMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl BenchMetrics {
    /// Create a new metrics handle (initializes global metrics if needed)
    pub fn new() -> Self {
        GLOBAL_METRICS.get_or_init(BenchMetricsInner::new);
        Self { _private: () }
    }

    fn inner(&self) -> &BenchMetricsInner {
        GLOBAL_METRICS.get_or_init(BenchMetricsInner::new)
    }

    /// Publish one cluster sample
    pub fn record_sample(&self, cluster: &str, ec2_capacity: u32, compute_nodes: u32, target: u32) {
        let inner = self.inner();
        inner
            .ec2_capacity
            .with_label_values(&[cluster])
            .set(i64::from(ec2_capacity));
        inner
            .compute_nodes
            .with_label_values(&[cluster])
            .set(i64::from(compute_nodes));
        inner
            .target_cluster_size
            .with_label_values(&[cluster])
            .set(i64::from(target));
    }

    /// Record how long a phase took (`scale_up_ec2`, `scale_up_scheduler`, `scale_down`)
    pub fn observe_scaling_duration(&self, phase: &str, secs: i64) {
        self.inner()
            .scaling_duration_seconds
            .with_label_values(&[phase])
            .observe(secs as f64);
    }

    /// Increment failed samples counter
    pub fn inc_probe_errors(&self) {
        self.inner().probe_errors.inc();
    }

    pub fn set_assertion_failures(&self, count: usize) {
        self.inner().assertion_failures.set(count as i64);
    }

    /// Update run info
    pub fn set_run_info(&self, region: &str, compute_node: &str, scaling_strategy: &str) {
        self.inner().run_info.reset();
        self.inner()
            .run_info
            .with_label_values(&[region, compute_node, scaling_strategy])
            .set(1.0);
    }
}

/// Structured logger for bench events
///
/// Provides consistent JSON-formatted logging for phase transitions and
/// results.
#[derive(Clone)]
pub struct StructuredLogger {
    cluster_name: String,
}

impl StructuredLogger {
    pub fn new(cluster_name: impl Into<String>) -> Self {
        Self {
            cluster_name: cluster_name.into(),
        }
    }

    /// Log bench startup
    pub fn log_startup(&self, version: &str, mode: &str) {
        info!(
            event = "bench_started",
            cluster = %self.cluster_name,
            bench_version = %version,
            mode = %mode,
            "Scaling bench started"
        );
    }

    /// Log bench shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "bench_shutdown",
            cluster = %self.cluster_name,
            reason = %reason,
            "Scaling bench shutting down"
        );
    }

    pub fn log_job_submitted(&self, job_id: &str, nodes: u32) {
        info!(
            event = "job_submitted",
            cluster = %self.cluster_name,
            job_id = %job_id,
            nodes = nodes,
            "Submitted job"
        );
    }

    pub fn log_job_running(&self, job_id: &str) {
        info!(
            event = "job_running",
            cluster = %self.cluster_name,
            job_id = %job_id,
            "Job is running"
        );
    }

    pub fn log_job_cancelled(&self, job_id: &str) {
        info!(
            event = "job_cancelled",
            cluster = %self.cluster_name,
            job_id = %job_id,
            "Job cancelled"
        );
    }

    /// Log the end of a scale-up phase
    pub fn log_scale_up(&self, target: u32, ec2_secs: i64, scheduler_secs: i64) {
        info!(
            event = "scale_up_complete",
            cluster = %self.cluster_name,
            scaling_target = target,
            scale_up_time_ec2 = ec2_secs,
            scale_up_time_scheduler = scheduler_secs,
            "Scale up complete"
        );
    }

    /// Log the end of a scale-down phase
    pub fn log_scale_down(&self, target: u32, secs: i64) {
        info!(
            event = "scale_down_complete",
            cluster = %self.cluster_name,
            scaling_target = target,
            scale_down_time = secs,
            "Scale down complete"
        );
    }

    pub fn log_waiting_for_refill(&self, delay_secs: u64) {
        info!(
            event = "waiting_for_refill",
            cluster = %self.cluster_name,
            delay_secs = delay_secs,
            "Waiting for the RunInstances Resource Token Bucket to refill"
        );
    }

    /// Log a missing baseline entry
    pub fn log_baseline_missing(
        &self,
        instance: &str,
        target: u32,
        strategy: &str,
        baseline_path: &str,
    ) {
        warn!(
            event = "baseline_missing",
            cluster = %self.cluster_name,
            compute_node = %instance,
            scaling_target = target,
            scaling_strategy = %strategy,
            baseline_path = %baseline_path,
            "Baseline for ComputeNode ({}), ScalingTarget ({}), ScalingStrategy ({}) not found. \
             You need to build it in {}",
            instance,
            target,
            strategy,
            baseline_path
        );
    }

    /// Log a failed soft assertion
    pub fn log_assertion_failure(&self, target: u32, check: &str, expected: &str, actual: &str) {
        warn!(
            event = "assertion_failed",
            cluster = %self.cluster_name,
            scaling_target = target,
            check = %check,
            expected = %expected,
            actual = %actual,
            "Soft assertion failed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_bench_metrics_creation() {
        let metrics = BenchMetrics::new();

        metrics.record_sample("test-cluster", 10, 8, 1000);
        metrics.observe_scaling_duration("scale_up_ec2", 290);
        metrics.inc_probe_errors();
        metrics.set_assertion_failures(2);
        metrics.set_run_info("us-east-1", "c5.large", "best-effort");

        let families = prometheus::gather();
        let names: Vec<&str> = families.iter().map(|f| f.get_name()).collect();
        assert!(names.contains(&"scaling_bench_ec2_capacity"));
        assert!(names.contains(&"scaling_bench_scaling_duration_seconds"));
    }

    #[test]
    fn test_structured_logger_creation() {
        let logger = StructuredLogger::new("test-cluster");
        assert_eq!(logger.cluster_name, "test-cluster");
    }
}
