//! Shared run progress, read by the HTTP API while the bench runs

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::assertions::AssertionFailure;
use crate::models::{RunPhase, RunStatus, ScalingResult};

/// Results collected so far in a run
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunResults {
    pub results: Vec<ScalingResult>,
    pub assertion_failures: Vec<AssertionFailure>,
}

#[derive(Debug)]
struct TrackerState {
    status: RunStatus,
    results: RunResults,
}

/// Handle to the progress of the current run; clones share state
#[derive(Debug, Clone)]
pub struct RunTracker {
    inner: Arc<RwLock<TrackerState>>,
}

impl Default for RunTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl RunTracker {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(RwLock::new(TrackerState {
                status: RunStatus {
                    phase: RunPhase::Idle,
                    scaling_target: None,
                    completed_targets: Vec::new(),
                    assertion_failures: 0,
                    message: None,
                    updated_at: chrono::Utc::now().timestamp(),
                },
                results: RunResults::default(),
            })),
        }
    }

    /// Enter a new phase, optionally for a specific scaling target
    pub async fn set_phase(&self, phase: RunPhase, scaling_target: Option<u32>) {
        let mut state = self.inner.write().await;
        state.status.phase = phase;
        state.status.scaling_target = scaling_target;
        state.status.updated_at = chrono::Utc::now().timestamp();
    }

    /// Store the result of a finished scaling target
    pub async fn record_result(&self, result: ScalingResult) {
        let mut state = self.inner.write().await;
        state.status.completed_targets.push(result.scaling_target);
        state.status.updated_at = chrono::Utc::now().timestamp();
        state.results.results.push(result);
    }

    pub async fn set_assertion_failures(&self, failures: &[AssertionFailure]) {
        let mut state = self.inner.write().await;
        state.status.assertion_failures = failures.len();
        state.results.assertion_failures = failures.to_vec();
    }

    pub async fn complete(&self) {
        self.finish(RunPhase::Completed, None).await;
    }

    pub async fn fail(&self, message: impl Into<String>) {
        self.finish(RunPhase::Failed, Some(message.into())).await;
    }

    async fn finish(&self, phase: RunPhase, message: Option<String>) {
        let mut state = self.inner.write().await;
        state.status.phase = phase;
        state.status.scaling_target = None;
        state.status.message = message;
        state.status.updated_at = chrono::Utc::now().timestamp();
    }

    pub async fn status(&self) -> RunStatus {
        self.inner.read().await.status.clone()
    }

    pub async fn results(&self) -> RunResults {
        self.inner.read().await.results.clone()
    }
}
