//! Per-target scaling reports

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

use crate::models::ScalingResult;

/// Everything known about one scaling target once its cycle finished
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingReport {
    /// `Key[value] , Key[value] ...` rendering of the result
    pub title: String,
    pub region: String,
    pub cluster_name: String,
    /// Minute-truncated start of the scale-up
    pub start_time: DateTime<Utc>,
    /// End of the scale-down monitoring window
    pub end_time: DateTime<Utc>,
    pub scaling_target: u32,
    /// Minute-truncated instant the joined-node count reached the target
    pub scaling_target_time: DateTime<Utc>,
    pub result: ScalingResult,
}

impl ScalingReport {
    /// File name the report is stored under
    pub fn file_name(&self) -> String {
        format!(
            "scaling-{}-{}.json",
            self.result.scaling_strategy, self.scaling_target
        )
    }
}

/// Sink for finished scaling reports
#[async_trait]
pub trait ScalingReporter: Send + Sync {
    async fn report(&self, report: &ScalingReport) -> Result<()>;
}

/// Writes each report as pretty JSON into a directory
pub struct JsonFileReporter {
    dir: PathBuf,
}

impl JsonFileReporter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }
}

#[async_trait]
impl ScalingReporter for JsonFileReporter {
    async fn report(&self, report: &ScalingReport) -> Result<()> {
        info!(
            event = "scaling_report",
            title = %report.title,
            region = %report.region,
            cluster = %report.cluster_name,
            scaling_target = report.scaling_target,
            start_time = %report.start_time,
            end_time = %report.end_time,
            scaling_target_time = %report.scaling_target_time,
            "Scaling report"
        );

        tokio::fs::create_dir_all(&self.dir)
            .await
            .with_context(|| format!("Failed to create report directory {}", self.dir.display()))?;

        let path = self.dir.join(report.file_name());
        let content = serde_json::to_string_pretty(report)?;
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Failed to write report {}", path.display()))?;

        info!(path = %path.display(), "Report written");
        Ok(())
    }
}

/// Read back every report stored in a directory, ordered by strategy then target
pub async fn load_reports(dir: &Path) -> Result<Vec<ScalingReport>> {
    let mut reports = Vec::new();
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(reports),
        Err(e) => {
            return Err(e).with_context(|| format!("Failed to list {}", dir.display()));
        }
    };

    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        let is_report = path
            .file_name()
            .and_then(|n| n.to_str())
            .map(|n| n.starts_with("scaling-") && n.ends_with(".json"))
            .unwrap_or(false);
        if !is_report {
            continue;
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read {}", path.display()))?;
        let report: ScalingReport = serde_json::from_str(&content)
            .with_context(|| format!("Malformed report {}", path.display()))?;
        reports.push(report);
    }

    reports.sort_by(|a, b| {
        (a.result.scaling_strategy.as_str(), a.scaling_target)
            .cmp(&(b.result.scaling_strategy.as_str(), b.scaling_target))
    });
    Ok(reports)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ScalingStrategy;
    use chrono::TimeZone;
    use tempfile::TempDir;

    fn report(target: u32, strategy: ScalingStrategy) -> ScalingReport {
        let result = ScalingResult {
            region: "us-east-1".to_string(),
            os: "alinux2".to_string(),
            compute_node: "c5.large".to_string(),
            head_node: "c5.24xlarge".to_string(),
            scaling_target: target,
            scaling_strategy: strategy,
            scale_up_time_ec2: 120,
            scale_up_time_scheduler: 300,
            scale_down_time: 200,
        };
        ScalingReport {
            title: result.title(),
            region: result.region.clone(),
            cluster_name: "bench".to_string(),
            start_time: Utc.with_ymd_and_hms(2024, 3, 5, 10, 20, 0).unwrap(),
            end_time: Utc.with_ymd_and_hms(2024, 3, 5, 10, 27, 13).unwrap(),
            scaling_target: target,
            scaling_target_time: Utc.with_ymd_and_hms(2024, 3, 5, 10, 25, 0).unwrap(),
            result,
        }
    }

    #[test]
    fn test_file_name() {
        assert_eq!(
            report(1000, ScalingStrategy::AllOrNothing).file_name(),
            "scaling-all-or-nothing-1000.json"
        );
    }

    #[tokio::test]
    async fn test_json_reporter_writes_one_file_per_target() {
        let dir = TempDir::new().unwrap();
        let reporter = JsonFileReporter::new(dir.path().join("reports"));

        reporter
            .report(&report(2000, ScalingStrategy::BestEffort))
            .await
            .unwrap();
        reporter
            .report(&report(1000, ScalingStrategy::BestEffort))
            .await
            .unwrap();

        let content =
            std::fs::read_to_string(reporter.dir().join("scaling-best-effort-1000.json")).unwrap();
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value["result"]["ScaleUpTimeEC2"], 120);
        assert_eq!(value["cluster_name"], "bench");

        let reports = load_reports(reporter.dir()).await.unwrap();
        let targets: Vec<u32> = reports.iter().map(|r| r.scaling_target).collect();
        assert_eq!(targets, vec![1000, 2000]);
        assert_eq!(reports[0], report(1000, ScalingStrategy::BestEffort));
    }

    #[tokio::test]
    async fn test_load_reports_missing_dir_is_empty() {
        let dir = TempDir::new().unwrap();
        let reports = load_reports(&dir.path().join("absent")).await.unwrap();
        assert!(reports.is_empty());
    }
}
