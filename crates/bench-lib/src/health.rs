//! Health of the bench and the systems it drives
//!
//! Each [`Component`] is judged from the last operation that used it:
//! the SSH preflight for the head node, job submission for the scheduler,
//! the scaling cycles for the compute fleet and sampling for the
//! collector. `/healthz` and `/readyz` read the registry.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::assertions::AssertionErrors;

/// Something the bench depends on
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Component {
    HeadNode,
    Scheduler,
    ComputeFleet,
    Collector,
}

impl Component {
    pub const ALL: [Component; 4] = [
        Component::HeadNode,
        Component::Scheduler,
        Component::ComputeFleet,
        Component::Collector,
    ];
}

/// Ordered from best to worst
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    /// Working, but some recent operations failed
    Degraded,
    Unhealthy,
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub status: HealthStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    /// When the status last changed
    pub since: DateTime<Utc>,
}

impl ComponentHealth {
    fn new(status: HealthStatus, detail: Option<String>) -> Self {
        Self {
            status,
            detail,
            since: Utc::now(),
        }
    }
}

/// Body of `/healthz`
#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    /// Worst status among the components
    pub status: HealthStatus,
    pub components: BTreeMap<Component, ComponentHealth>,
}

/// Body of `/readyz`
#[derive(Debug, Clone, Serialize)]
pub struct Readiness {
    pub ready: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

#[derive(Debug)]
struct RegistryState {
    components: BTreeMap<Component, ComponentHealth>,
    /// Set once the head node answered the preflight command
    ready: bool,
}

/// Shared component health, cloned into the API and the collector
#[derive(Debug, Clone)]
pub struct HealthRegistry {
    state: Arc<RwLock<RegistryState>>,
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl HealthRegistry {
    /// Every component starts healthy and the bench starts not ready
    pub fn new() -> Self {
        let components = Component::ALL
            .iter()
            .map(|&c| (c, ComponentHealth::new(HealthStatus::Healthy, None)))
            .collect();
        Self {
            state: Arc::new(RwLock::new(RegistryState {
                components,
                ready: false,
            })),
        }
    }

    /// Set a component's status. `since` only moves when the status changes.
    pub async fn mark(&self, component: Component, status: HealthStatus, detail: Option<String>) {
        let mut state = self.state.write().await;
        let components = &mut state.components;
        match components.get_mut(&component) {
            Some(current) if current.status == status => current.detail = detail,
            Some(current) => *current = ComponentHealth::new(status, detail),
            None => {
                components.insert(component, ComponentHealth::new(status, detail));
            }
        }
    }

    /// Judge a component from the outcome of an operation that used it.
    ///
    /// Soft assertion failures are results about the cluster's timings,
    /// so they leave the component healthy.
    pub async fn observe<T>(&self, component: Component, outcome: &anyhow::Result<T>) {
        match outcome {
            Err(e) if !e.is::<AssertionErrors>() => {
                self.mark(component, HealthStatus::Unhealthy, Some(format!("{:#}", e)))
                    .await
            }
            _ => self.mark(component, HealthStatus::Healthy, None).await,
        }
    }

    pub async fn set_ready(&self, ready: bool) {
        self.state.write().await.ready = ready;
    }

    pub async fn report(&self) -> HealthReport {
        let state = self.state.read().await;
        let status = state
            .components
            .values()
            .map(|c| c.status)
            .max()
            .unwrap_or(HealthStatus::Healthy);
        HealthReport {
            status,
            components: state.components.clone(),
        }
    }

    pub async fn readiness(&self) -> Readiness {
        let ready = self.state.read().await.ready;
        let reason = if !ready {
            Some("Bench not yet initialized".to_string())
        } else {
            self.report()
                .await
                .components
                .iter()
                .find(|(_, h)| h.status == HealthStatus::Unhealthy)
                .map(|(c, _)| format!("{:?} unhealthy", c))
        };

        Readiness {
            ready: reason.is_none(),
            reason,
        }
    }
}
