//! Stored timing baselines
//!
//! Baselines are a JSON document keyed instance type → scaling target →
//! scaling strategy → metric name → seconds. They are seeded incrementally
//! per environment, so a missing entry is normal and reported as `None`.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{ScalingResult, ScalingStrategy};

pub const SCALE_UP_TIME_EC2: &str = "scale_up_time_ec2";
pub const SCALE_UP_TIME_SCHEDULER: &str = "scale_up_time_scheduler";
pub const SCALE_DOWN_TIME: &str = "scale_down_time";

/// Errors reading a baseline file. A missing entry is not one of them.
#[derive(Debug, Error)]
pub enum BaselineError {
    #[error("failed to read baseline file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed baseline file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

/// Expected durations for one (instance, target, strategy) combination
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineTimes {
    pub scale_up_time_ec2: i64,
    pub scale_up_time_scheduler: i64,
    pub scale_down_time: i64,
}

/// Stored seconds. Written as an integer, a float (truncated) or an
/// integer string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSeconds")]
struct Seconds(i64);

#[derive(Deserialize)]
#[serde(untagged)]
enum RawSeconds {
    Int(i64),
    Float(f64),
    Text(String),
}

impl TryFrom<RawSeconds> for Seconds {
    type Error = String;

    fn try_from(raw: RawSeconds) -> Result<Self, Self::Error> {
        match raw {
            RawSeconds::Int(n) => Ok(Seconds(n)),
            RawSeconds::Float(f) if f.is_finite() => Ok(Seconds(f.trunc() as i64)),
            RawSeconds::Float(f) => Err(format!("invalid baseline seconds: {}", f)),
            RawSeconds::Text(s) => s
                .trim()
                .parse()
                .map(Seconds)
                .map_err(|_| format!("invalid baseline seconds: {:?}", s)),
        }
    }
}

type MetricMap = HashMap<String, Seconds>;
type StrategyMap = HashMap<String, MetricMap>;
type TargetMap = HashMap<String, StrategyMap>;

/// File-backed baseline document
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BaselineStore {
    entries: HashMap<String, TargetMap>,
}

impl BaselineStore {
    /// Load a baseline file
    pub fn load(path: &Path) -> Result<Self, BaselineError> {
        let content = std::fs::read_to_string(path).map_err(|source| BaselineError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        serde_json::from_str(&content).map_err(|source| BaselineError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Parse a baseline document held in memory
    pub fn from_json(content: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(content)
    }

    /// Look up all three durations. `None` when any segment of the path, or
    /// any of the three metrics, is absent.
    pub fn lookup(
        &self,
        instance: &str,
        scaling_target: u32,
        strategy: ScalingStrategy,
    ) -> Option<BaselineTimes> {
        let metrics = self
            .entries
            .get(instance)?
            .get(&scaling_target.to_string())?
            .get(strategy.as_str())?;

        Some(BaselineTimes {
            scale_up_time_ec2: metrics.get(SCALE_UP_TIME_EC2)?.0,
            scale_up_time_scheduler: metrics.get(SCALE_UP_TIME_SCHEDULER)?.0,
            scale_down_time: metrics.get(SCALE_DOWN_TIME)?.0,
        })
    }

    /// Flatten into (instance, target, strategy, times) rows, sorted
    pub fn rows(&self) -> Vec<(String, String, String, Option<BaselineTimes>)> {
        let mut rows = Vec::new();
        for (instance, targets) in &self.entries {
            for (target, strategies) in targets {
                for (strategy, metrics) in strategies {
                    let times = match (
                        metrics.get(SCALE_UP_TIME_EC2),
                        metrics.get(SCALE_UP_TIME_SCHEDULER),
                        metrics.get(SCALE_DOWN_TIME),
                    ) {
                        (Some(ec2), Some(scheduler), Some(down)) => Some(BaselineTimes {
                            scale_up_time_ec2: ec2.0,
                            scale_up_time_scheduler: scheduler.0,
                            scale_down_time: down.0,
                        }),
                        _ => None,
                    };
                    rows.push((instance.clone(), target.clone(), strategy.clone(), times));
                }
            }
        }
        rows.sort_by(|a, b| {
            a.0.cmp(&b.0)
                .then_with(|| sort_key(&a.1).cmp(&sort_key(&b.1)))
                .then_with(|| a.2.cmp(&b.2))
        });
        rows
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

fn sort_key(target: &str) -> (u64, &str) {
    (target.parse().unwrap_or(u64::MAX), target)
}

/// One observed-vs-baseline check
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BaselineCheck {
    pub metric: &'static str,
    pub observed: i64,
    pub baseline: i64,
}

impl BaselineCheck {
    /// Observed duration no worse than the baseline
    pub fn passed(&self) -> bool {
        self.observed <= self.baseline
    }
}

/// Result of comparing one run against the baseline
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BaselineComparison {
    /// No baseline for this combination, nothing was compared
    Missing,
    Compared(Vec<BaselineCheck>),
}

impl BaselineComparison {
    pub fn failures(&self) -> Vec<&BaselineCheck> {
        match self {
            BaselineComparison::Missing => Vec::new(),
            BaselineComparison::Compared(checks) => {
                checks.iter().filter(|c| !c.passed()).collect()
            }
        }
    }
}

/// Compare a result's durations with the stored baseline
pub fn compare(store: &BaselineStore, result: &ScalingResult) -> BaselineComparison {
    match store.lookup(
        &result.compute_node,
        result.scaling_target,
        result.scaling_strategy,
    ) {
        None => BaselineComparison::Missing,
        Some(times) => BaselineComparison::Compared(vec![
            BaselineCheck {
                metric: SCALE_UP_TIME_EC2,
                observed: result.scale_up_time_ec2,
                baseline: times.scale_up_time_ec2,
            },
            BaselineCheck {
                metric: SCALE_UP_TIME_SCHEDULER,
                observed: result.scale_up_time_scheduler,
                baseline: times.scale_up_time_scheduler,
            },
            BaselineCheck {
                metric: SCALE_DOWN_TIME,
                observed: result.scale_down_time,
                baseline: times.scale_down_time,
            },
        ]),
    }
}
