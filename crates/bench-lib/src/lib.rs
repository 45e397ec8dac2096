//! Cluster scaling benchmark library
//!
//! This crate provides the core functionality for:
//! - Driving a Slurm cluster through scale-up/scale-down cycles
//! - Sampling EC2 capacity and joined compute nodes during a transition
//! - Timing extraction and baseline comparison
//! - Health checks and observability

pub mod assertions;
pub mod baseline;
pub mod cluster;
pub mod collector;
pub mod driver;
pub mod executor;
pub mod health;
pub mod models;
pub mod observability;
pub mod progress;
pub mod report;
pub mod scheduler;
pub mod smoke;
pub mod timing;

#[cfg(test)]
pub(crate) mod testing;

pub use assertions::{AssertionErrors, AssertionFailure, SoftAssertions};
pub use baseline::{BaselineComparison, BaselineError, BaselineStore};
pub use driver::{ScalingContext, ScalingDriver};
pub use health::{Component, ComponentHealth, HealthRegistry, HealthReport, HealthStatus, Readiness};
pub use models::*;
pub use observability::{BenchMetrics, StructuredLogger};
pub use progress::{RunResults, RunTracker};
pub use timing::{locate, truncate_to_minute, ScalingEvent, TimingError};
