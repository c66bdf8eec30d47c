//! Subprocess execution for process and port inspection tools.
//!
//! Discovery shells out to `ps`, `lsof`, `ss`, `wmic`, `powershell` and
//! `netstat`. Every invocation is bounded by a timeout; a command that does not
//! finish in time is killed and reported as [`ProcessError::Timeout`].

use std::path::PathBuf;
use std::process::Stdio;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, instrument, warn};

use crate::error::ProcessError;

/// Default command timeout.
const DEFAULT_TIMEOUT_SECS: u64 = 15;

// ============================================================================
// Process Output
// ============================================================================

/// Output from a process execution.
#[derive(Debug, Clone)]
pub struct ProcessOutput {
    /// Standard output content.
    pub stdout: String,
    /// Standard error content.
    pub stderr: String,
    /// Exit code (0 = success).
    pub exit_code: i32,
    /// How long the command took to execute.
    pub duration: Duration,
}

impl ProcessOutput {
    /// Creates a successful output with the given stdout.
    pub fn from_stdout(stdout: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: String::new(),
            exit_code: 0,
            duration: Duration::ZERO,
        }
    }

    /// Returns true if the command succeeded (exit code 0).
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

// ============================================================================
// Command Runner
// ============================================================================

/// Runs an external command and captures its output.
///
/// Implemented by [`ProcessRunner`]; tests substitute scripted runners.
#[async_trait]
pub trait CommandRunner: Send + Sync {
    /// Runs `program` with `args`, failing with [`ProcessError::Timeout`]
    /// after `timeout`.
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<ProcessOutput, ProcessError>;
}

// ============================================================================
// Process Runner
// ============================================================================

/// Runs real subprocesses via `tokio::process`.
#[derive(Debug, Clone, Default)]
pub struct ProcessRunner;

impl ProcessRunner {
    /// Creates a new process runner.
    pub fn new() -> Self {
        Self
    }

    /// Run a command with the default timeout.
    ///
    /// # Errors
    ///
    /// See [`ProcessRunner::run_with_timeout`].
    #[instrument(skip(self), fields(cmd = %cmd))]
    pub async fn run(&self, cmd: &str, args: &[&str]) -> Result<ProcessOutput, ProcessError> {
        self.run_with_timeout(cmd, args, Duration::from_secs(DEFAULT_TIMEOUT_SECS))
            .await
    }

    /// Run a command with timeout.
    ///
    /// A non-zero exit is not an error here; callers inspect
    /// [`ProcessOutput::exit_code`].
    ///
    /// # Errors
    ///
    /// Returns `NotFound` if the program is not on `PATH`, `Timeout` if it
    /// outlives `timeout` and `Io` if it cannot be spawned.
    #[instrument(skip(self), fields(cmd = %cmd, timeout = ?timeout))]
    pub async fn run_with_timeout(
        &self,
        cmd: &str,
        args: &[&str],
        timeout: Duration,
    ) -> Result<ProcessOutput, ProcessError> {
        debug!(args = ?args, "Running command");

        let cmd_path = self.which(cmd).ok_or_else(|| {
            warn!(cmd = %cmd, "Command not found");
            ProcessError::NotFound(cmd.to_string())
        })?;

        let start = Instant::now();

        let mut command = Command::new(&cmd_path);
        command
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = match tokio::time::timeout(timeout, command.output()).await {
            Ok(result) => result?,
            Err(_) => {
                warn!(cmd = %cmd, timeout = ?timeout, "Command timed out");
                return Err(ProcessError::Timeout(timeout));
            }
        };

        let duration = start.elapsed();
        let exit_code = output.status.code().unwrap_or(-1);

        let result = ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code,
            duration,
        };

        debug!(
            exit_code = exit_code,
            duration = ?duration,
            stdout_len = result.stdout.len(),
            stderr_len = result.stderr.len(),
            "Command completed"
        );

        Ok(result)
    }

    /// Find the path to a command. Absolute paths resolve if the file exists.
    fn which(&self, cmd: &str) -> Option<PathBuf> {
        which::which(cmd).ok()
    }
}

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(
        &self,
        program: &str,
        args: &[String],
        timeout: Duration,
    ) -> Result<ProcessOutput, ProcessError> {
        let args: Vec<&str> = args.iter().map(String::as_str).collect();
        self.run_with_timeout(program, &args, timeout).await
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_echo() {
        let runner = ProcessRunner::new();

        let output = runner.run("echo", &["hello", "world"]).await.unwrap();

        assert!(output.success());
        assert_eq!(output.stdout.trim(), "hello world");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_trait_run_passes_owned_args() {
        let runner = ProcessRunner::new();
        let args = vec!["a b".to_string(), "c".to_string()];

        let output = CommandRunner::run(&runner, "echo", &args, Duration::from_secs(5))
            .await
            .unwrap();

        assert_eq!(output.stdout.trim(), "a b c");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_run_timeout() {
        let runner = ProcessRunner::new();

        let result = runner
            .run_with_timeout("sleep", &["5"], Duration::from_millis(100))
            .await;

        assert!(matches!(result, Err(ProcessError::Timeout(_))));
    }

    #[tokio::test]
    async fn test_run_not_found() {
        let runner = ProcessRunner::new();

        let result = runner.run("not_a_real_command_xyz", &[]).await;

        assert!(matches!(result, Err(ProcessError::NotFound(_))));
    }
}
