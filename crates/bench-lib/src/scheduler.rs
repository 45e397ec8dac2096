//! Slurm command adapter
//!
//! Submits, watches and cancels jobs by running `sbatch`, `scontrol` and
//! `scancel` on the head node through a [`RemoteExecutor`].

use anyhow::{Context, Result};
use async_trait::async_trait;
use regex::Regex;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info};

use crate::executor::RemoteExecutor;

/// Scheduler failures callers may want to tell apart
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("job was not accepted by the scheduler: {0}")]
    JobNotAccepted(String),

    #[error("job {job_id} ended in state {state} before running")]
    JobEnded { job_id: String, state: String },

    #[error("job {job_id} not running after {waited:?}")]
    WaitTimeout { job_id: String, waited: Duration },
}

/// Job submission request
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmitJob {
    /// Command wrapped into the batch script
    pub command: String,
    pub partition: Option<String>,
    pub nodes: Option<u32>,
    /// Number of tasks
    pub slots: Option<u32>,
}

impl SubmitJob {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            partition: None,
            nodes: None,
            slots: None,
        }
    }

    pub fn partition(mut self, partition: impl Into<String>) -> Self {
        self.partition = Some(partition.into());
        self
    }

    pub fn nodes(mut self, nodes: u32) -> Self {
        self.nodes = Some(nodes);
        self
    }

    pub fn slots(mut self, slots: u32) -> Self {
        self.slots = Some(slots);
        self
    }

    /// Render the `sbatch` invocation
    pub fn to_sbatch(&self) -> String {
        let mut cmd = format!("sbatch --wrap \"{}\"", self.command.replace('"', "\\\""));
        if let Some(partition) = &self.partition {
            cmd.push_str(&format!(" -p {}", partition));
        }
        if let Some(nodes) = self.nodes {
            cmd.push_str(&format!(" -N {}", nodes));
        }
        if let Some(slots) = self.slots {
            cmd.push_str(&format!(" -n {}", slots));
        }
        cmd
    }
}

/// Batch scheduler operations used by the bench
#[async_trait]
pub trait SchedulerCommands: Send + Sync {
    /// Submit a job and return its id; fails if the scheduler rejects it
    async fn submit(&self, job: &SubmitJob) -> Result<String>;

    /// Block until the job is running
    async fn wait_job_running(&self, job_id: &str) -> Result<()>;

    async fn cancel_job(&self, job_id: &str) -> Result<()>;
}

/// Job state as reported by `scontrol`
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobState {
    Pending,
    Running,
    Ended(String),
    Other(String),
}

impl JobState {
    fn from_slurm(state: &str) -> Self {
        match state {
            "PENDING" | "CONFIGURING" | "REQUEUED" => JobState::Pending,
            "RUNNING" => JobState::Running,
            "FAILED" | "CANCELLED" | "TIMEOUT" | "NODE_FAIL" | "COMPLETED" | "OUT_OF_MEMORY"
            | "BOOT_FAIL" | "DEADLINE" | "PREEMPTED" => JobState::Ended(state.to_string()),
            other => JobState::Other(other.to_string()),
        }
    }
}

/// Slurm implementation of [`SchedulerCommands`]
pub struct SlurmCommands {
    executor: Arc<dyn RemoteExecutor>,
    submit_regex: Regex,
    state_regex: Regex,
    poll_interval: Duration,
    running_timeout: Duration,
}

impl SlurmCommands {
    pub fn new(executor: Arc<dyn RemoteExecutor>) -> Result<Self> {
        Ok(Self {
            executor,
            submit_regex: Regex::new(r"Submitted batch job (\d+)")?,
            state_regex: Regex::new(r"JobState=(\S+)")?,
            poll_interval: Duration::from_secs(10),
            running_timeout: Duration::from_secs(30 * 60),
        })
    }

    /// Override how often and how long to wait for a job to start
    pub fn with_polling(mut self, poll_interval: Duration, running_timeout: Duration) -> Self {
        self.poll_interval = poll_interval;
        self.running_timeout = running_timeout;
        self
    }

    fn parse_job_id(&self, stdout: &str) -> Option<String> {
        self.submit_regex
            .captures(stdout)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str().to_string())
    }

    async fn job_state(&self, job_id: &str) -> Result<JobState> {
        let output = self
            .executor
            .run_checked(&format!("scontrol show jobs -o {}", job_id))
            .await?;

        let state = self
            .state_regex
            .captures(&output.stdout)
            .and_then(|c| c.get(1))
            .map(|m| m.as_str())
            .with_context(|| format!("No JobState in scontrol output for job {}", job_id))?;

        Ok(JobState::from_slurm(state))
    }
}

#[async_trait]
impl SchedulerCommands for SlurmCommands {
    async fn submit(&self, job: &SubmitJob) -> Result<String> {
        let output = self.executor.run(&job.to_sbatch()).await?;

        let job_id = match (output.success(), self.parse_job_id(&output.stdout)) {
            (true, Some(id)) => id,
            _ => {
                let detail = format!("{}{}", output.stdout.trim(), output.stderr.trim());
                return Err(SchedulerError::JobNotAccepted(detail).into());
            }
        };

        info!(
            job_id = %job_id,
            nodes = ?job.nodes,
            partition = ?job.partition,
            "Job submitted"
        );
        Ok(job_id)
    }

    async fn wait_job_running(&self, job_id: &str) -> Result<()> {
        let started = Instant::now();
        loop {
            match self.job_state(job_id).await? {
                JobState::Running => return Ok(()),
                JobState::Ended(state) => {
                    return Err(SchedulerError::JobEnded {
                        job_id: job_id.to_string(),
                        state,
                    }
                    .into())
                }
                state => debug!(job_id, ?state, "Job not running yet"),
            }

            if started.elapsed() >= self.running_timeout {
                return Err(SchedulerError::WaitTimeout {
                    job_id: job_id.to_string(),
                    waited: started.elapsed(),
                }
                .into());
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    async fn cancel_job(&self, job_id: &str) -> Result<()> {
        self.executor
            .run_checked(&format!("scancel {}", job_id))
            .await
            .with_context(|| format!("Failed to cancel job {}", job_id))?;
        info!(job_id, "Job cancelled");
        Ok(())
    }
}
