//! Command execution on the cluster head node and on the local host
//!
//! Remote commands go through the OpenSSH client with connection
//! multiplexing, so `reset_connection` maps to closing the master socket.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, trace, warn};

/// Exit code the ssh client uses for its own (connection) failures
const SSH_CONNECTION_ERROR: i32 = 255;

/// Captured result of a finished command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Channel for running shell commands on the head node
#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Run a command and capture its output, whatever its exit code
    async fn run(&self, command: &str) -> Result<CommandOutput>;

    /// Drop any cached connection so the next command opens a fresh one
    async fn reset_connection(&self) -> Result<()>;

    /// Run a command and fail unless it exits with status 0
    async fn run_checked(&self, command: &str) -> Result<CommandOutput> {
        let output = self.run(command).await?;
        if !output.success() {
            anyhow::bail!(
                "Remote command `{}` failed with exit code {}: {}",
                command,
                output.exit_code,
                output.stderr.trim()
            );
        }
        Ok(output)
    }
}

/// Connection settings for the head node
#[derive(Debug, Clone)]
pub struct SshConfig {
    pub host: String,
    pub user: String,
    /// Private key; the ssh agent / default identities are used when unset
    pub key_path: Option<PathBuf>,
    /// Multiplexing control socket
    pub control_path: PathBuf,
    pub connect_timeout: Duration,
    /// Attempts for commands that fail at the connection level
    pub retries: usize,
    pub retry_delay: Duration,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            user: "ec2-user".to_string(),
            key_path: None,
            control_path: std::env::temp_dir().join("scaling-bench-ssh-%r@%h:%p"),
            connect_timeout: Duration::from_secs(10),
            retries: 3,
            retry_delay: Duration::from_secs(5),
        }
    }
}

/// Remote executor backed by the system `ssh` client
pub struct SshExecutor {
    config: SshConfig,
}

impl SshExecutor {
    pub fn new(config: SshConfig) -> Self {
        Self { config }
    }

    fn destination(&self) -> String {
        format!("{}@{}", self.config.user, self.config.host)
    }

    fn ssh_opts(&self) -> Vec<String> {
        let mut opts: Vec<String> = vec![
            "-o".into(),
            "StrictHostKeyChecking=no".into(),
            "-o".into(),
            "UserKnownHostsFile=/dev/null".into(),
            "-o".into(),
            format!("ConnectTimeout={}", self.config.connect_timeout.as_secs()),
            "-o".into(),
            "ServerAliveInterval=30".into(),
            "-o".into(),
            "ServerAliveCountMax=10".into(),
            "-o".into(),
            "LogLevel=ERROR".into(),
            "-o".into(),
            "ControlMaster=auto".into(),
            "-o".into(),
            "ControlPersist=10m".into(),
            "-o".into(),
            format!("ControlPath={}", self.config.control_path.display()),
        ];
        if let Some(key) = &self.config.key_path {
            opts.push("-i".into());
            opts.push(key.to_string_lossy().into());
        }
        opts
    }

    async fn run_once(&self, command: &str) -> Result<CommandOutput> {
        let output = Command::new("ssh")
            .args(self.ssh_opts())
            .arg(self.destination())
            .arg(command)
            .stdin(Stdio::null())
            .output()
            .await
            .with_context(|| format!("Failed to spawn ssh to {}", self.config.host))?;

        Ok(CommandOutput {
            exit_code: output.status.code().unwrap_or(-1),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    async fn run(&self, command: &str) -> Result<CommandOutput> {
        let attempts = self.config.retries.max(1);
        let mut attempt = 0;
        loop {
            attempt += 1;
            trace!(host = %self.config.host, command, attempt, "Running remote command");

            let output = self.run_once(command).await?;
            if output.exit_code != SSH_CONNECTION_ERROR || attempt >= attempts {
                return Ok(output);
            }

            warn!(
                host = %self.config.host,
                attempt,
                attempts,
                stderr = %output.stderr.trim(),
                "SSH connection failed, retrying"
            );
            tokio::time::sleep(self.config.retry_delay).await;
        }
    }

    async fn reset_connection(&self) -> Result<()> {
        let status = Command::new("ssh")
            .args(["-O", "exit"])
            .arg("-o")
            .arg(format!("ControlPath={}", self.config.control_path.display()))
            .arg(self.destination())
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .context("Failed to spawn ssh to close the control connection")?;

        // Non-zero just means no master was running
        debug!(
            host = %self.config.host,
            closed = status.success(),
            "Reset SSH connection"
        );
        Ok(())
    }
}

/// Run a program on the local host and capture its output
pub async fn run_local(program: &str, args: &[&str]) -> Result<CommandOutput> {
    trace!(program, ?args, "Running local command");
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .await
        .with_context(|| format!("Failed to spawn {}", program))?;

    Ok(CommandOutput {
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
    })
}

/// Like [`run_local`] but fail on a non-zero exit code
pub async fn run_local_checked(program: &str, args: &[&str]) -> Result<CommandOutput> {
    let output = run_local(program, args).await?;
    if !output.success() {
        anyhow::bail!(
            "`{} {}` failed with exit code {}: {}",
            program,
            args.join(" "),
            output.exit_code,
            output.stderr.trim()
        );
    }
    Ok(output)
}
