//! Fixed-size scaling smoke test

use anyhow::{Context, Result};

use crate::assertions::assert_no_msg_in_logs;
use crate::executor::RemoteExecutor;
use crate::observability::StructuredLogger;
use crate::scheduler::{SchedulerCommands, SubmitJob};

pub const CLUSTERMGTD_LOG: &str = "/var/log/parallelcluster/clustermgtd";
pub const BOOTSTRAP_FAILURE_MARKER: &str = "Found the following bootstrap failure nodes";
pub const SMOKE_PARTITION: &str = "queue-0";
pub const DEFAULT_MAX_NODES: u32 = 1000;

/// Run one `max_nodes`-wide job, cancel it once it runs and make sure
/// clustermgtd saw no bootstrap failures
pub async fn run_smoke_test(
    executor: &dyn RemoteExecutor,
    scheduler: &dyn SchedulerCommands,
    logger: &StructuredLogger,
    max_nodes: u32,
) -> Result<()> {
    let job = SubmitJob::new("srun sleep 10")
        .partition(SMOKE_PARTITION)
        .nodes(max_nodes)
        .slots(max_nodes);
    let job_id = scheduler
        .submit(&job)
        .await
        .context("Smoke test job was not accepted")?;
    logger.log_job_submitted(&job_id, max_nodes);

    scheduler.wait_job_running(&job_id).await?;
    logger.log_job_running(&job_id);

    scheduler.cancel_job(&job_id).await?;
    logger.log_job_cancelled(&job_id);

    assert_no_msg_in_logs(executor, &[CLUSTERMGTD_LOG], &[BOOTSTRAP_FAILURE_MARKER]).await
}
