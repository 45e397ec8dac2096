//! Scale-up/scale-down cycles and the stress test loop
//!
//! One cycle starts the compute fleet, submits a placeholder job sized to
//! the target, watches the cluster grow, cancels the job, stops the fleet
//! and watches it shrink back to zero. Timings come from the collected
//! series; checks that should not abort the run go to [`SoftAssertions`].

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use crate::assertions::SoftAssertions;
use crate::baseline::{compare, BaselineComparison, BaselineStore};
use crate::cluster::{disable_protected_mode, ClusterLifecycle};
use crate::collector::{CollectRequest, ScalingCollector};
use crate::executor::RemoteExecutor;
use crate::models::{RunPhase, ScalingResult, ScalingStrategy};
use crate::observability::{BenchMetrics, StructuredLogger};
use crate::progress::RunTracker;
use crate::report::{ScalingReport, ScalingReporter};
use crate::scheduler::{SchedulerCommands, SubmitJob};
use crate::timing::{locate, truncate_to_minute};

/// Static description of the run
#[derive(Debug, Clone)]
pub struct ScalingContext {
    pub region: String,
    pub os: String,
    pub compute_instance_type: String,
    pub head_node_instance_type: String,
    pub scaling_strategy: ScalingStrategy,
    /// Budget for each monitoring window
    pub max_monitoring_time: Duration,
    pub baseline_path: PathBuf,
    /// Pause between scaling targets for the launch token bucket to refill
    pub refill_delay: Duration,
    pub scaling_targets: Vec<u32>,
    pub publish_metrics: bool,
}

/// Runs scaling cycles against one cluster
pub struct ScalingDriver {
    context: ScalingContext,
    executor: Arc<dyn RemoteExecutor>,
    scheduler: Arc<dyn SchedulerCommands>,
    cluster: Arc<dyn ClusterLifecycle>,
    collector: Arc<dyn ScalingCollector>,
    reporter: Arc<dyn ScalingReporter>,
    tracker: RunTracker,
    logger: StructuredLogger,
    metrics: BenchMetrics,
    clock: fn() -> DateTime<Utc>,
}

impl ScalingDriver {
    pub fn new(
        context: ScalingContext,
        executor: Arc<dyn RemoteExecutor>,
        scheduler: Arc<dyn SchedulerCommands>,
        cluster: Arc<dyn ClusterLifecycle>,
        collector: Arc<dyn ScalingCollector>,
        reporter: Arc<dyn ScalingReporter>,
    ) -> Self {
        let logger = StructuredLogger::new(cluster.name());
        Self {
            context,
            executor,
            scheduler,
            cluster,
            collector,
            reporter,
            tracker: RunTracker::new(),
            logger,
            metrics: BenchMetrics::new(),
            clock: Utc::now,
        }
    }

    /// Publish progress through an existing tracker
    pub fn with_tracker(mut self, tracker: RunTracker) -> Self {
        self.tracker = tracker;
        self
    }

    pub fn with_clock(mut self, clock: fn() -> DateTime<Utc>) -> Self {
        self.clock = clock;
        self
    }

    pub fn tracker(&self) -> &RunTracker {
        &self.tracker
    }

    fn request(&self, target_cluster_size: u32) -> CollectRequest {
        CollectRequest {
            max_monitoring_time: self.context.max_monitoring_time,
            region: self.context.region.clone(),
            cluster_name: self.cluster.name().to_string(),
            publish_metrics: self.context.publish_metrics,
            target_cluster_size,
        }
    }

    /// Scale the cluster to `target` nodes and back to zero.
    ///
    /// A target never observed in a series aborts the cycle. Size checks
    /// and baseline regressions are recorded in `soft`.
    pub async fn scale_up_and_down(
        &self,
        target: u32,
        soft: &mut SoftAssertions,
    ) -> Result<ScalingResult> {
        self.executor.reset_connection().await?;
        self.cluster
            .start(true)
            .await
            .context("Failed to start the compute fleet")?;

        let budget_secs = self.context.max_monitoring_time.as_secs();
        let job = SubmitJob::new(format!("srun sleep {}", budget_secs)).nodes(target);
        let job_id = self.scheduler.submit(&job).await?;
        self.logger.log_job_submitted(&job_id, target);

        let scale_up_start = truncate_to_minute((self.clock)());
        self.tracker.set_phase(RunPhase::ScalingUp, Some(target)).await;
        let up = self.collector.collect(&self.request(target)).await?;

        let ec2_event = locate(up.ec2_capacity(), up.timestamps(), target, scale_up_start)
            .context("EC2 capacity never reached the scaling target")?;
        let scheduler_event = locate(up.compute_nodes(), up.timestamps(), target, scale_up_start)
            .context("Joined compute nodes never reached the scaling target")?;
        self.logger.log_scale_up(
            target,
            ec2_event.elapsed_secs,
            scheduler_event.elapsed_secs,
        );

        self.scheduler.cancel_job(&job_id).await?;
        self.logger.log_job_cancelled(&job_id);
        self.cluster
            .stop()
            .await
            .context("Failed to stop the compute fleet")?;

        let scale_down_start = truncate_to_minute((self.clock)());
        self.tracker.set_phase(RunPhase::ScalingDown, Some(target)).await;
        let down = self.collector.collect(&self.request(0)).await?;

        let down_event = locate(down.compute_nodes(), down.timestamps(), 0, scale_down_start)
            .context("Joined compute nodes never scaled down to zero")?;
        self.logger.log_scale_down(target, down_event.elapsed_secs);

        let result = ScalingResult {
            region: self.context.region.clone(),
            os: self.context.os.clone(),
            compute_node: self.context.compute_instance_type.clone(),
            head_node: self.context.head_node_instance_type.clone(),
            scaling_target: target,
            scaling_strategy: self.context.scaling_strategy,
            scale_up_time_ec2: ec2_event.elapsed_secs,
            scale_up_time_scheduler: scheduler_event.elapsed_secs,
            scale_down_time: down_event.elapsed_secs,
        };
        info!(result = ?result, "Scaling result");

        self.metrics
            .observe_scaling_duration("scale_up_ec2", result.scale_up_time_ec2);
        self.metrics
            .observe_scaling_duration("scale_up_scheduler", result.scale_up_time_scheduler);
        self.metrics
            .observe_scaling_duration("scale_down", result.scale_down_time);

        self.reporter
            .report(&ScalingReport {
                title: result.title(),
                region: self.context.region.clone(),
                cluster_name: self.cluster.name().to_string(),
                start_time: scale_up_start,
                end_time: down.end_time,
                scaling_target: target,
                scaling_target_time: truncate_to_minute(scheduler_event.reached_at),
                result: result.clone(),
            })
            .await?;

        let before = soft.len();
        soft.assert_eq(
            target,
            "max_ec2_capacity",
            up.peak_ec2_capacity().unwrap_or(0),
            target,
        );
        soft.assert_eq(
            target,
            "max_compute_nodes",
            up.peak_compute_nodes().unwrap_or(0),
            target,
        );
        soft.assert_eq(
            target,
            "final_compute_nodes",
            down.last_compute_nodes().unwrap_or(0),
            0,
        );
        self.check_baseline(&result, soft)?;

        for failure in &soft.failures()[before..] {
            self.logger.log_assertion_failure(
                failure.scaling_target,
                &failure.check,
                &failure.expected,
                &failure.actual,
            );
        }
        Ok(result)
    }

    fn check_baseline(&self, result: &ScalingResult, soft: &mut SoftAssertions) -> Result<()> {
        let path = &self.context.baseline_path;
        let store = BaselineStore::load(path)?;

        match compare(&store, result) {
            BaselineComparison::Missing => {
                self.logger.log_baseline_missing(
                    &result.compute_node,
                    result.scaling_target,
                    result.scaling_strategy.as_str(),
                    &path.display().to_string(),
                );
            }
            BaselineComparison::Compared(checks) => {
                for check in checks {
                    soft.assert_le(
                        result.scaling_target,
                        check.metric,
                        check.observed,
                        check.baseline,
                    );
                }
            }
        }
        Ok(())
    }

    /// Run one cycle per configured target, pausing between targets.
    ///
    /// Soft assertion failures from every target are returned together once
    /// the loop is done.
    pub async fn run_stress_test(&self) -> Result<Vec<ScalingResult>> {
        let outcome = self.stress_loop().await;
        match &outcome {
            Ok(_) => self.tracker.complete().await,
            Err(e) => self.tracker.fail(format!("{:#}", e)).await,
        }
        outcome
    }

    async fn stress_loop(&self) -> Result<Vec<ScalingResult>> {
        disable_protected_mode(self.executor.as_ref()).await?;
        self.metrics.set_run_info(
            &self.context.region,
            &self.context.compute_instance_type,
            self.context.scaling_strategy.as_str(),
        );

        let mut soft = SoftAssertions::new();
        let mut results = Vec::with_capacity(self.context.scaling_targets.len());
        let targets = &self.context.scaling_targets;

        for (i, &target) in targets.iter().enumerate() {
            let result = self.scale_up_and_down(target, &mut soft).await?;
            self.tracker.record_result(result.clone()).await;
            self.tracker.set_assertion_failures(soft.failures()).await;
            self.metrics.set_assertion_failures(soft.len());
            results.push(result);

            if i + 1 < targets.len() {
                self.tracker.set_phase(RunPhase::WaitingForRefill, None).await;
                self.logger
                    .log_waiting_for_refill(self.context.refill_delay.as_secs());
                tokio::time::sleep(self.context.refill_delay).await;
            }
        }

        soft.finish()?;
        Ok(results)
    }
}
