//! Soft assertions and head node log checks
//!
//! A stress test keeps going after a failed check: failures are recorded
//! and only turned into an error once every scaling target has run.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

use crate::executor::RemoteExecutor;

/// One failed soft assertion
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssertionFailure {
    pub scaling_target: u32,
    pub check: String,
    pub expected: String,
    pub actual: String,
}

impl fmt::Display for AssertionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[target {}] {}: expected {}, got {}",
            self.scaling_target, self.check, self.expected, self.actual
        )
    }
}

/// All soft assertion failures of a run
#[derive(Debug, Clone, Error)]
#[error("{} soft assertion(s) failed:\n{}", .0.len(), render(.0))]
pub struct AssertionErrors(pub Vec<AssertionFailure>);

fn render(failures: &[AssertionFailure]) -> String {
    failures
        .iter()
        .map(|f| format!("  {}", f))
        .collect::<Vec<_>>()
        .join("\n")
}

/// Accumulator for checks that must not abort the run
#[derive(Debug, Default)]
pub struct SoftAssertions {
    failures: Vec<AssertionFailure>,
}

impl SoftAssertions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a failure unless `actual == expected`; returns whether it held
    pub fn assert_eq<T>(&mut self, scaling_target: u32, check: &str, actual: T, expected: T) -> bool
    where
        T: PartialEq + fmt::Display,
    {
        if actual == expected {
            return true;
        }
        self.record(scaling_target, check, expected.to_string(), actual.to_string());
        false
    }

    /// Record a failure unless `actual <= limit`
    pub fn assert_le<T>(&mut self, scaling_target: u32, check: &str, actual: T, limit: T) -> bool
    where
        T: PartialOrd + fmt::Display,
    {
        if actual <= limit {
            return true;
        }
        self.record(scaling_target, check, format!("<= {}", limit), actual.to_string());
        false
    }

    pub fn record(
        &mut self,
        scaling_target: u32,
        check: &str,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) {
        self.failures.push(AssertionFailure {
            scaling_target,
            check: check.to_string(),
            expected: expected.into(),
            actual: actual.into(),
        });
    }

    pub fn failures(&self) -> &[AssertionFailure] {
        &self.failures
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    /// Flush into one error if anything failed
    pub fn finish(self) -> Result<(), AssertionErrors> {
        if self.failures.is_empty() {
            Ok(())
        } else {
            Err(AssertionErrors(self.failures))
        }
    }
}

/// Fail if any of `messages` appears in any of `log_files` on the head node
pub async fn assert_no_msg_in_logs(
    executor: &dyn RemoteExecutor,
    log_files: &[&str],
    messages: &[&str],
) -> Result<()> {
    for log_file in log_files {
        let output = executor
            .run_checked(&format!("sudo cat {}", log_file))
            .await
            .with_context(|| format!("Failed to read {}", log_file))?;

        for message in messages {
            if output.stdout.contains(message) {
                anyhow::bail!("Found \"{}\" in {}", message, log_file);
            }
        }
    }
    Ok(())
}
