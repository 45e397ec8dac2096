//! In-memory fakes for the executor, scheduler, cluster, collector and
//! reporter traits

use anyhow::Result;
use async_trait::async_trait;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use crate::cluster::ClusterLifecycle;
use crate::collector::{CollectRequest, ScalingCollector};
use crate::executor::{CommandOutput, RemoteExecutor};
use crate::models::ScalingSeries;
use crate::report::{ScalingReport, ScalingReporter};
use crate::scheduler::{SchedulerCommands, SubmitJob};

/// Ordered record of calls shared between fakes
#[derive(Debug, Clone, Default)]
pub struct EventLog(Arc<Mutex<Vec<String>>>);

impl EventLog {
    pub fn push(&self, event: impl Into<String>) {
        self.0.lock().unwrap().push(event.into());
    }

    pub fn events(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Executor answering commands from per-prefix queues
pub struct ScriptedExecutor {
    scripts: Mutex<Vec<(String, VecDeque<CommandOutput>)>>,
    default_stdout: Mutex<String>,
    commands: Mutex<Vec<String>>,
    resets: Mutex<usize>,
    log: EventLog,
}

impl ScriptedExecutor {
    pub fn new() -> Self {
        Self::with_log(EventLog::default())
    }

    pub fn with_log(log: EventLog) -> Self {
        Self {
            scripts: Mutex::new(Vec::new()),
            default_stdout: Mutex::new(String::new()),
            commands: Mutex::new(Vec::new()),
            resets: Mutex::new(0),
            log,
        }
    }

    /// Queue a response for the next command starting with `prefix`
    pub fn respond(&self, prefix: &str, exit_code: i32, stdout: &str) {
        self.respond_with(prefix, exit_code, stdout, "");
    }

    pub fn respond_with(&self, prefix: &str, exit_code: i32, stdout: &str, stderr: &str) {
        let output = CommandOutput {
            exit_code,
            stdout: stdout.to_string(),
            stderr: stderr.to_string(),
        };
        let mut scripts = self.scripts.lock().unwrap();
        match scripts.iter_mut().find(|(p, _)| p == prefix) {
            Some((_, queue)) => queue.push_back(output),
            None => scripts.push((prefix.to_string(), VecDeque::from([output]))),
        }
    }

    /// Stdout for commands with no queued response (exit code 0)
    pub fn set_default(&self, stdout: &str) {
        *self.default_stdout.lock().unwrap() = stdout.to_string();
    }

    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().unwrap().clone()
    }

    pub fn resets(&self) -> usize {
        *self.resets.lock().unwrap()
    }
}

impl Default for ScriptedExecutor {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteExecutor for ScriptedExecutor {
    async fn run(&self, command: &str) -> Result<CommandOutput> {
        self.commands.lock().unwrap().push(command.to_string());
        self.log.push(format!("run {}", command));

        let mut scripts = self.scripts.lock().unwrap();
        let scripted = scripts
            .iter_mut()
            .find(|(prefix, queue)| command.starts_with(prefix.as_str()) && !queue.is_empty())
            .and_then(|(_, queue)| queue.pop_front());

        Ok(scripted.unwrap_or_else(|| CommandOutput {
            exit_code: 0,
            stdout: self.default_stdout.lock().unwrap().clone(),
            stderr: String::new(),
        }))
    }

    async fn reset_connection(&self) -> Result<()> {
        *self.resets.lock().unwrap() += 1;
        self.log.push("reset_connection");
        Ok(())
    }
}

/// Scheduler handing out sequential job ids
pub struct FakeScheduler {
    next_id: Mutex<u32>,
    submitted: Mutex<Vec<SubmitJob>>,
    fail_running: bool,
    log: EventLog,
}

impl FakeScheduler {
    pub fn new(log: EventLog) -> Self {
        Self {
            next_id: Mutex::new(100),
            submitted: Mutex::new(Vec::new()),
            fail_running: false,
            log,
        }
    }

    /// Make `wait_job_running` fail
    pub fn never_running(mut self) -> Self {
        self.fail_running = true;
        self
    }

    pub fn submitted(&self) -> Vec<SubmitJob> {
        self.submitted.lock().unwrap().clone()
    }
}

#[async_trait]
impl SchedulerCommands for FakeScheduler {
    async fn submit(&self, job: &SubmitJob) -> Result<String> {
        self.submitted.lock().unwrap().push(job.clone());
        let mut next_id = self.next_id.lock().unwrap();
        let id = next_id.to_string();
        *next_id += 1;
        self.log.push(format!("submit {}", id));
        Ok(id)
    }

    async fn wait_job_running(&self, job_id: &str) -> Result<()> {
        self.log.push(format!("wait_running {}", job_id));
        if self.fail_running {
            anyhow::bail!("job {} never started", job_id);
        }
        Ok(())
    }

    async fn cancel_job(&self, job_id: &str) -> Result<()> {
        self.log.push(format!("cancel {}", job_id));
        Ok(())
    }
}

pub struct FakeCluster {
    log: EventLog,
}

impl FakeCluster {
    pub fn new(log: EventLog) -> Self {
        Self { log }
    }
}

#[async_trait]
impl ClusterLifecycle for FakeCluster {
    fn name(&self) -> &str {
        "bench-cluster"
    }

    async fn start(&self, wait_running: bool) -> Result<()> {
        self.log.push(format!("start wait_running={}", wait_running));
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.log.push("stop");
        Ok(())
    }
}

/// Collector returning pre-built series in order
pub struct ScriptedCollector {
    series: Mutex<VecDeque<ScalingSeries>>,
    requests: Mutex<Vec<CollectRequest>>,
    log: EventLog,
}

impl ScriptedCollector {
    pub fn new(log: EventLog, series: Vec<ScalingSeries>) -> Self {
        Self {
            series: Mutex::new(series.into()),
            requests: Mutex::new(Vec::new()),
            log,
        }
    }

    pub fn requests(&self) -> Vec<CollectRequest> {
        self.requests.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScalingCollector for ScriptedCollector {
    async fn collect(&self, request: &CollectRequest) -> Result<ScalingSeries> {
        self.requests.lock().unwrap().push(request.clone());
        self.log
            .push(format!("collect target={}", request.target_cluster_size));
        self.series
            .lock()
            .unwrap()
            .pop_front()
            .ok_or_else(|| anyhow::anyhow!("no scripted series left"))
    }
}

#[derive(Default)]
pub struct RecordingReporter {
    reports: Mutex<Vec<ScalingReport>>,
}

impl RecordingReporter {
    pub fn reports(&self) -> Vec<ScalingReport> {
        self.reports.lock().unwrap().clone()
    }
}

#[async_trait]
impl ScalingReporter for RecordingReporter {
    async fn report(&self, report: &ScalingReport) -> Result<()> {
        self.reports.lock().unwrap().push(report.clone());
        Ok(())
    }
}
