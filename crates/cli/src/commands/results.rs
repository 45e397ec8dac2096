//! Scaling results command

use anyhow::Result;
use colored::Colorize;
use tabled::Tabled;

use bench_lib::models::ScalingResult;

use crate::client::ApiClient;
use crate::output::{format_duration, print_json, print_success, print_table, OutputFormat};

/// Row for the scaling results table
#[derive(Tabled)]
struct ResultRow {
    #[tabled(rename = "Target")]
    target: u32,
    #[tabled(rename = "Strategy")]
    strategy: String,
    #[tabled(rename = "Compute Node")]
    compute_node: String,
    #[tabled(rename = "Scale Up (EC2)")]
    scale_up_ec2: String,
    #[tabled(rename = "Scale Up (Scheduler)")]
    scale_up_scheduler: String,
    #[tabled(rename = "Scale Down")]
    scale_down: String,
}

impl From<&ScalingResult> for ResultRow {
    fn from(result: &ScalingResult) -> Self {
        Self {
            target: result.scaling_target,
            strategy: result.scaling_strategy.to_string(),
            compute_node: result.compute_node.clone(),
            scale_up_ec2: format_duration(result.scale_up_time_ec2),
            scale_up_scheduler: format_duration(result.scale_up_time_scheduler),
            scale_down: format_duration(result.scale_down_time),
        }
    }
}

/// Row for the assertion failures table
#[derive(Tabled)]
struct FailureRow {
    #[tabled(rename = "Target")]
    target: u32,
    #[tabled(rename = "Check")]
    check: String,
    #[tabled(rename = "Expected")]
    expected: String,
    #[tabled(rename = "Actual")]
    actual: String,
}

/// Show results collected by the bench so far
pub async fn show_results(
    client: &ApiClient,
    target: Option<u32>,
    format: OutputFormat,
) -> Result<()> {
    let mut results = client.results().await?;
    if let Some(target) = target {
        results.results.retain(|r| r.scaling_target == target);
        results.assertion_failures.retain(|f| f.scaling_target == target);
    }

    match format {
        OutputFormat::Json => print_json(&results)?,
        OutputFormat::Table => {
            println!("{}", "Scaling Results".bold());
            let rows: Vec<ResultRow> = results.results.iter().map(ResultRow::from).collect();
            print_table(&rows);
            println!();

            if results.assertion_failures.is_empty() {
                print_success("No assertion failures");
            } else {
                println!("{}", "Assertion Failures".red().bold());
                let rows: Vec<FailureRow> = results
                    .assertion_failures
                    .iter()
                    .map(|f| FailureRow {
                        target: f.scaling_target,
                        check: f.check.clone(),
                        expected: f.expected.clone(),
                        actual: f.actual.clone(),
                    })
                    .collect();
                print_table(&rows);
            }
        }
    }

    Ok(())
}
