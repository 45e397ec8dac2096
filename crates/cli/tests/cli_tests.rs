//! CLI integration tests

use std::process::Command;

fn scalectl(args: &[&str]) -> std::process::Output {
    Command::new(env!("CARGO_BIN_EXE_scalectl"))
        .args(args)
        .env_remove("SCALECTL_API_URL")
        .output()
        .expect("Failed to execute command")
}

/// Test that the CLI shows help
#[test]
fn test_cli_help() {
    let output = scalectl(&["--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI help should succeed");
    assert!(stdout.contains("Cluster Scaling Bench"), "Should show app name");
    assert!(stdout.contains("status"), "Should show status command");
    assert!(stdout.contains("results"), "Should show results command");
    assert!(stdout.contains("baseline"), "Should show baseline command");
}

/// Test that the CLI shows version
#[test]
fn test_cli_version() {
    let output = scalectl(&["--version"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success(), "CLI version should succeed");
    assert!(stdout.contains("scalectl"), "Should show binary name");
}

#[test]
fn test_baseline_check_help() {
    let output = scalectl(&["baseline", "check", "--help"]);
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    assert!(stdout.contains("--file"), "Should show file option");
    assert!(stdout.contains("--reports"), "Should show reports option");
}

#[test]
fn test_baseline_show_reads_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let path = dir.path().join("baseline.json");
    std::fs::write(
        &path,
        r#"{"c5.large": {"1000": {"best-effort": {
            "scale_up_time_ec2": 300, "scale_up_time_scheduler": 500, "scale_down_time": 200
        }}}}"#,
    )
    .unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_scalectl"))
        .args(["--format", "json", "baseline", "show", "--file"])
        .arg(&path)
        .env("HOME", dir.path())
        .output()
        .expect("Failed to execute command");
    let stdout = String::from_utf8_lossy(&output.stdout);

    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(value["c5.large"]["1000"]["best-effort"]["scale_up_time_ec2"], 300);
}

#[test]
fn test_invalid_format() {
    let output = scalectl(&["--format", "yaml", "status"]);
    assert!(!output.status.success());
}
