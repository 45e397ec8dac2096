//! Run status command

use anyhow::Result;
use colored::Colorize;

use crate::client::ApiClient;
use crate::output::{color_status, format_timestamp, print_json, OutputFormat};

/// Show what the bench is doing right now
pub async fn show_status(client: &ApiClient, format: OutputFormat) -> Result<()> {
    let status = client.status().await?;

    match format {
        OutputFormat::Json => print_json(&status)?,
        OutputFormat::Table => {
            println!("{}", "Scaling Bench Status".bold());
            println!("{}", "=".repeat(50));
            println!("Phase:                  {}", color_status(&status.phase.to_string()));
            if let Some(target) = status.scaling_target {
                println!("Scaling target:         {}", target.to_string().cyan());
            }
            let completed = if status.completed_targets.is_empty() {
                "-".to_string()
            } else {
                status
                    .completed_targets
                    .iter()
                    .map(u32::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            println!("Completed targets:      {}", completed);

            let failures = status.assertion_failures.to_string();
            if status.assertion_failures > 0 {
                println!("Assertion failures:     {}", failures.red());
            } else {
                println!("Assertion failures:     {}", failures.green());
            }
            if let Some(message) = &status.message {
                println!("Message:                {}", message);
            }
            println!();
            println!(
                "Last updated: {}",
                format_timestamp(status.updated_at).dimmed()
            );
        }
    }

    Ok(())
}
