//! Core data models for the scaling bench

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One sampled instant of the cluster during a scaling phase
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalingSample {
    /// EC2 instances launched for the compute fleet
    pub ec2_capacity: u32,
    /// Compute nodes that finished bootstrap and joined the scheduler
    pub compute_nodes: u32,
    /// Seconds since the Unix epoch
    #[serde(deserialize_with = "de_epoch_seconds")]
    pub timestamp: f64,
}

/// Parallel time series collected while monitoring one scaling phase.
///
/// The three sequences always have the same length: index `i` of each one
/// describes the same sampled instant.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(try_from = "RawScalingSeries")]
pub struct ScalingSeries {
    ec2_capacity: Vec<u32>,
    compute_nodes: Vec<u32>,
    timestamps: Vec<f64>,
    /// End of the monitoring window
    pub end_time: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RawScalingSeries {
    ec2_capacity: Vec<u32>,
    compute_nodes: Vec<u32>,
    #[serde(deserialize_with = "de_epoch_seconds_vec")]
    timestamps: Vec<f64>,
    end_time: DateTime<Utc>,
}

impl TryFrom<RawScalingSeries> for ScalingSeries {
    type Error = String;

    fn try_from(raw: RawScalingSeries) -> Result<Self, Self::Error> {
        let n = raw.timestamps.len();
        if raw.ec2_capacity.len() != n || raw.compute_nodes.len() != n {
            return Err(format!(
                "series lengths differ: {} ec2 capacity, {} compute nodes, {} timestamps",
                raw.ec2_capacity.len(),
                raw.compute_nodes.len(),
                n
            ));
        }
        Ok(Self {
            ec2_capacity: raw.ec2_capacity,
            compute_nodes: raw.compute_nodes,
            timestamps: raw.timestamps,
            end_time: raw.end_time,
        })
    }
}

impl ScalingSeries {
    pub fn new(end_time: DateTime<Utc>) -> Self {
        Self {
            ec2_capacity: Vec::new(),
            compute_nodes: Vec::new(),
            timestamps: Vec::new(),
            end_time,
        }
    }

    /// Build a series from samples, ending at the last sample (or `fallback_end`
    /// when there are none)
    pub fn from_samples(samples: &[ScalingSample], fallback_end: DateTime<Utc>) -> Self {
        let mut series = Self::new(fallback_end);
        for sample in samples {
            series.push(*sample);
        }
        if let Some(last) = samples.last() {
            if let Some(end) = epoch_to_utc(last.timestamp) {
                series.end_time = end;
            }
        }
        series
    }

    pub fn push(&mut self, sample: ScalingSample) {
        self.ec2_capacity.push(sample.ec2_capacity);
        self.compute_nodes.push(sample.compute_nodes);
        self.timestamps.push(sample.timestamp);
    }

    pub fn ec2_capacity(&self) -> &[u32] {
        &self.ec2_capacity
    }

    pub fn compute_nodes(&self) -> &[u32] {
        &self.compute_nodes
    }

    pub fn timestamps(&self) -> &[f64] {
        &self.timestamps
    }

    pub fn len(&self) -> usize {
        self.timestamps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.timestamps.is_empty()
    }

    /// Highest EC2 capacity observed
    pub fn peak_ec2_capacity(&self) -> Option<u32> {
        self.ec2_capacity.iter().copied().max()
    }

    /// Highest joined-node count observed
    pub fn peak_compute_nodes(&self) -> Option<u32> {
        self.compute_nodes.iter().copied().max()
    }

    /// Joined-node count at the last sample
    pub fn last_compute_nodes(&self) -> Option<u32> {
        self.compute_nodes.last().copied()
    }
}

/// Epoch seconds as written by sampling tools: a number or a numeric string
#[derive(Deserialize)]
#[serde(untagged)]
enum EpochSeconds {
    Number(f64),
    Text(String),
}

impl EpochSeconds {
    fn into_f64<E: serde::de::Error>(self) -> Result<f64, E> {
        match self {
            EpochSeconds::Number(n) => Ok(n),
            EpochSeconds::Text(s) => s
                .trim()
                .parse()
                .map_err(|_| E::custom(format!("invalid epoch timestamp: {:?}", s))),
        }
    }
}

fn de_epoch_seconds<'de, D: serde::Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    EpochSeconds::deserialize(deserializer)?.into_f64()
}

fn de_epoch_seconds_vec<'de, D: serde::Deserializer<'de>>(
    deserializer: D,
) -> Result<Vec<f64>, D::Error> {
    Vec::<EpochSeconds>::deserialize(deserializer)?
        .into_iter()
        .map(EpochSeconds::into_f64)
        .collect()
}

/// Convert fractional epoch seconds to a UTC instant
pub fn epoch_to_utc(timestamp: f64) -> Option<DateTime<Utc>> {
    if !timestamp.is_finite() {
        return None;
    }
    let secs = timestamp.floor();
    let nanos = ((timestamp - secs) * 1e9).round().min(999_999_999.0) as u32;
    DateTime::from_timestamp(secs as i64, nanos)
}

/// Convert a UTC instant to fractional epoch seconds
pub fn utc_to_epoch(t: DateTime<Utc>) -> f64 {
    t.timestamp() as f64 + f64::from(t.timestamp_subsec_nanos()) / 1e9
}

/// Provisioning policy of the orchestrator
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ScalingStrategy {
    /// Launch whatever capacity is available
    #[default]
    BestEffort,
    /// Launch the full request or nothing
    AllOrNothing,
}

impl ScalingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScalingStrategy::BestEffort => "best-effort",
            ScalingStrategy::AllOrNothing => "all-or-nothing",
        }
    }
}

impl std::fmt::Display for ScalingStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ScalingStrategy {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "best-effort" => Ok(ScalingStrategy::BestEffort),
            "all-or-nothing" => Ok(ScalingStrategy::AllOrNothing),
            other => Err(anyhow::anyhow!("Unknown scaling strategy: {}", other)),
        }
    }
}

/// Outcome of one scale-up/scale-down cycle
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ScalingResult {
    pub region: String,
    #[serde(rename = "OS")]
    pub os: String,
    pub compute_node: String,
    pub head_node: String,
    pub scaling_target: u32,
    pub scaling_strategy: ScalingStrategy,
    #[serde(rename = "ScaleUpTimeEC2")]
    pub scale_up_time_ec2: i64,
    pub scale_up_time_scheduler: i64,
    pub scale_down_time: i64,
}

impl ScalingResult {
    /// Key/value pairs in report order
    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            ("Region", self.region.clone()),
            ("OS", self.os.clone()),
            ("ComputeNode", self.compute_node.clone()),
            ("HeadNode", self.head_node.clone()),
            ("ScalingTarget", self.scaling_target.to_string()),
            ("ScalingStrategy", self.scaling_strategy.to_string()),
            ("ScaleUpTimeEC2", self.scale_up_time_ec2.to_string()),
            ("ScaleUpTimeScheduler", self.scale_up_time_scheduler.to_string()),
            ("ScaleDownTime", self.scale_down_time.to_string()),
        ]
    }

    /// Report title: every entry as `Key[value] `, joined with `", "`
    pub fn title(&self) -> String {
        self.entries()
            .iter()
            .map(|(key, value)| format!("{}[{}] ", key, value))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

/// Phase the runner is currently in
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunPhase {
    Idle,
    SmokeTest,
    ScalingUp,
    ScalingDown,
    WaitingForRefill,
    Completed,
    Failed,
}

impl std::fmt::Display for RunPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            RunPhase::Idle => "idle",
            RunPhase::SmokeTest => "smoke_test",
            RunPhase::ScalingUp => "scaling_up",
            RunPhase::ScalingDown => "scaling_down",
            RunPhase::WaitingForRefill => "waiting_for_refill",
            RunPhase::Completed => "completed",
            RunPhase::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Snapshot of the runner state served over HTTP
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunStatus {
    pub phase: RunPhase,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scaling_target: Option<u32>,
    pub completed_targets: Vec<u32>,
    pub assertion_failures: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub updated_at: i64,
}
