//! Scaling milestone extraction
//!
//! Turns a collected time series into "how long did it take to reach N":
//! find the first sample equal to the target and measure from a reference
//! instant to that sample's timestamp.

use chrono::{DateTime, Timelike, Utc};
use thiserror::Error;
use tracing::warn;

use crate::models::epoch_to_utc;

/// Errors raised while extracting a scaling milestone
#[derive(Debug, Clone, PartialEq, Error)]
pub enum TimingError {
    #[error("scaling target {target} never observed in {samples} samples")]
    TargetNotReached { target: u32, samples: usize },

    #[error("series has {series} samples but {timestamps} timestamps")]
    LengthMismatch { series: usize, timestamps: usize },

    #[error("timestamp {0} at the target sample is not a valid epoch time")]
    InvalidTimestamp(f64),
}

/// Moment a series first reached its target
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ScalingEvent {
    /// Index of the first matching sample
    pub index: usize,
    /// Absolute time of that sample
    pub reached_at: DateTime<Utc>,
    /// Whole seconds from the reference instant to `reached_at`
    pub elapsed_secs: i64,
}

/// Zero the seconds and sub-second part of an instant
pub fn truncate_to_minute(t: DateTime<Utc>) -> DateTime<Utc> {
    t.with_second(0)
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(t)
}

/// Find the first sample equal to `target` and time it against `reference`.
///
/// Exact match, not a threshold crossing: a series that jumps past the
/// target without landing on it is reported as not reached. A match earlier
/// than `reference` yields zero elapsed seconds.
pub fn locate(
    series: &[u32],
    timestamps: &[f64],
    target: u32,
    reference: DateTime<Utc>,
) -> Result<ScalingEvent, TimingError> {
    if series.len() != timestamps.len() {
        return Err(TimingError::LengthMismatch {
            series: series.len(),
            timestamps: timestamps.len(),
        });
    }

    let index = series
        .iter()
        .position(|&value| value == target)
        .ok_or(TimingError::TargetNotReached {
            target,
            samples: series.len(),
        })?;

    let raw = timestamps[index];
    let reached_at = epoch_to_utc(raw).ok_or(TimingError::InvalidTimestamp(raw))?;

    let elapsed = reached_at.signed_duration_since(reference).num_seconds();
    let elapsed_secs = if elapsed < 0 {
        warn!(
            scaling_target = target,
            reached_at = %reached_at,
            reference = %reference,
            elapsed_secs = elapsed,
            "Scaling target reached before the reference instant, clamping to zero"
        );
        0
    } else {
        elapsed
    };

    Ok(ScalingEvent {
        index,
        reached_at,
        elapsed_secs,
    })
}
