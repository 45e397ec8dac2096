//! Baseline inspection and regression check commands

use anyhow::{Context, Result};
use colored::Colorize;
use std::path::Path;
use tabled::Tabled;
use thiserror::Error;

use bench_lib::baseline::{compare, BaselineComparison, BaselineStore};
use bench_lib::models::ScalingResult;
use bench_lib::report::load_reports;

use crate::client::ApiClient;
use crate::output::{
    color_status, print_info, print_json, print_success, print_table, print_warning, OutputFormat,
};

/// Outcome of `baseline check` that should fail the command
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("{0} metric(s) regressed beyond the baseline")]
    Regressions(usize),

    #[error("no scaling results to check")]
    NoResults,
}

/// Row for the baseline table
#[derive(Tabled)]
struct BaselineRow {
    #[tabled(rename = "Compute Node")]
    instance: String,
    #[tabled(rename = "Target")]
    target: String,
    #[tabled(rename = "Strategy")]
    strategy: String,
    #[tabled(rename = "Scale Up (EC2)")]
    scale_up_ec2: String,
    #[tabled(rename = "Scale Up (Scheduler)")]
    scale_up_scheduler: String,
    #[tabled(rename = "Scale Down")]
    scale_down: String,
}

/// Row for the comparison table
#[derive(Debug, Clone, Tabled, serde::Serialize)]
pub struct CheckRow {
    #[tabled(rename = "Target")]
    pub target: u32,
    #[tabled(rename = "Strategy")]
    pub strategy: String,
    #[tabled(rename = "Metric")]
    pub metric: String,
    #[tabled(rename = "Observed")]
    pub observed: String,
    #[tabled(rename = "Baseline")]
    pub baseline: String,
    #[tabled(rename = "Result")]
    pub result: String,
}

/// Show the entries of a baseline file
pub fn show_baseline(path: &Path, instance: Option<&str>, format: OutputFormat) -> Result<()> {
    let store = BaselineStore::load(path)?;

    match format {
        OutputFormat::Json => print_json(&store)?,
        OutputFormat::Table => {
            println!("{} {}", "Baseline".bold(), path.display().to_string().dimmed());
            let rows: Vec<BaselineRow> = store
                .rows()
                .into_iter()
                .filter(|(i, _, _, _)| instance.map_or(true, |wanted| wanted == i.as_str()))
                .map(|(instance, target, strategy, times)| {
                    let seconds = |v: Option<i64>| v.map_or("-".to_string(), |s| format!("{}s", s));
                    BaselineRow {
                        instance,
                        target,
                        strategy,
                        scale_up_ec2: seconds(times.map(|t| t.scale_up_time_ec2)),
                        scale_up_scheduler: seconds(times.map(|t| t.scale_up_time_scheduler)),
                        scale_down: seconds(times.map(|t| t.scale_down_time)),
                    }
                })
                .collect();
            print_table(&rows);
        }
    }

    Ok(())
}

/// Where `baseline check` takes its results from
pub enum ResultSource<'a> {
    Api(&'a ApiClient),
    Reports(&'a Path),
}

/// Compare results against a baseline file; fails if anything regressed
pub async fn check_baseline(
    path: &Path,
    source: ResultSource<'_>,
    format: OutputFormat,
) -> Result<()> {
    let store = BaselineStore::load(path)?;
    let results: Vec<ScalingResult> = match source {
        ResultSource::Api(client) => client.results().await?.results,
        ResultSource::Reports(dir) => load_reports(dir)
            .await
            .with_context(|| format!("Failed to load reports from {}", dir.display()))?
            .into_iter()
            .map(|report| report.result)
            .collect(),
    };
    if results.is_empty() {
        return Err(CheckError::NoResults.into());
    }

    let (rows, missing) = comparison_rows(&store, &results);
    let failures = rows.iter().filter(|r| r.result == "fail").count();

    match format {
        OutputFormat::Json => print_json(&rows)?,
        OutputFormat::Table => {
            for result in &missing {
                print_warning(&format!(
                    "Baseline for ComputeNode ({}), ScalingTarget ({}), ScalingStrategy ({}) not found. \
                     You need to build it in {}",
                    result.compute_node,
                    result.scaling_target,
                    result.scaling_strategy,
                    path.display()
                ));
            }
            let colored: Vec<CheckRow> = rows
                .iter()
                .map(|r| CheckRow {
                    result: color_status(&r.result),
                    ..r.clone()
                })
                .collect();
            print_table(&colored);
            println!();
            if failures == 0 {
                print_success("No regressions against the baseline");
            } else {
                print_info(&format!("{} of {} checks failed", failures, rows.len()));
            }
        }
    }

    if failures > 0 {
        return Err(CheckError::Regressions(failures).into());
    }
    Ok(())
}

/// One row per compared metric, plus the results that had no baseline
pub fn comparison_rows<'a>(
    store: &BaselineStore,
    results: &'a [ScalingResult],
) -> (Vec<CheckRow>, Vec<&'a ScalingResult>) {
    let mut rows = Vec::new();
    let mut missing = Vec::new();

    for result in results {
        match compare(store, result) {
            BaselineComparison::Missing => missing.push(result),
            BaselineComparison::Compared(checks) => {
                for check in checks {
                    rows.push(CheckRow {
                        target: result.scaling_target,
                        strategy: result.scaling_strategy.to_string(),
                        metric: check.metric.to_string(),
                        observed: format!("{}s", check.observed),
                        baseline: format!("{}s", check.baseline),
                        result: if check.passed() { "pass" } else { "fail" }.to_string(),
                    });
                }
            }
        }
    }

    (rows, missing)
}

#[cfg(test)]
mod tests {
    use super::*;
    use bench_lib::models::ScalingStrategy;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const BASELINE: &str = r#"{
        "c5.24xlarge": {
            "1000": {
                "best-effort": {
                    "scale_up_time_ec2": 300,
                    "scale_up_time_scheduler": 500,
                    "scale_down_time": 200
                }
            }
        }
    }"#;

    fn result(target: u32, ec2: i64) -> ScalingResult {
        ScalingResult {
            region: "us-east-1".to_string(),
            os: "alinux2".to_string(),
            compute_node: "c5.24xlarge".to_string(),
            head_node: "c5.24xlarge".to_string(),
            scaling_target: target,
            scaling_strategy: ScalingStrategy::BestEffort,
            scale_up_time_ec2: ec2,
            scale_up_time_scheduler: 450,
            scale_down_time: 200,
        }
    }

    #[test]
    fn test_comparison_rows() {
        let store = BaselineStore::from_json(BASELINE).unwrap();
        let results = vec![result(1000, 290), result(1000, 310), result(2000, 100)];

        let (rows, missing) = comparison_rows(&store, &results);

        assert_eq!(rows.len(), 6);
        assert_eq!(rows[0].metric, "scale_up_time_ec2");
        assert_eq!(rows[0].result, "pass");
        assert_eq!(rows[3].observed, "310s");
        assert_eq!(rows[3].result, "fail");
        assert!(rows[1..3].iter().all(|r| r.result == "pass"));
        assert_eq!(missing.len(), 1);
        assert_eq!(missing[0].scaling_target, 2000);
    }

    #[test]
    fn test_show_baseline_malformed_file() {
        let mut file = NamedTempFile::new().unwrap();
        file.write_all(b"[1, 2").unwrap();
        assert!(show_baseline(file.path(), None, OutputFormat::Json).is_err());
    }

    #[tokio::test]
    async fn test_check_against_reports_dir() {
        let mut baseline = NamedTempFile::new().unwrap();
        baseline.write_all(BASELINE.as_bytes()).unwrap();
        let reports = tempfile::TempDir::new().unwrap();

        let err = check_baseline(
            baseline.path(),
            ResultSource::Reports(reports.path()),
            OutputFormat::Json,
        )
        .await
        .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<CheckError>(),
            Some(CheckError::NoResults)
        ));
    }
}
