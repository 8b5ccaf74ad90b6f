//! Shell command runner.

use crate::deadline::{self, Deadline, Outcome};
use crate::error::FailureRecord;
use crate::workspace::Workspace;
use serde::{Deserialize, Serialize};
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Stdio;
use tracing::{debug, info, warn};

const DEFAULT_SHELL: &str = "/bin/sh";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ShellRequest {
    #[serde(default)]
    pub command: String,
    /// Seconds; capped at [`deadline::SHELL_TIMEOUT_CEILING`].
    #[serde(
        default,
        deserialize_with = "deadline::deserialize_timeout",
        skip_serializing_if = "Option::is_none"
    )]
    pub timeout: Option<i64>,
}

/// Outcome of one shell command. `success` holds exactly when the exit code
/// is zero and no error was recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShellResult {
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    pub error: Option<String>,
}

impl ShellResult {
    fn timed_out(deadline: Deadline) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: -1,
            error: Some(format!("Command timed out after {} seconds", deadline.as_secs())),
        }
    }

    fn spawn_failed(message: String) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: message.clone(),
            exit_code: -1,
            error: Some(message),
        }
    }
}

impl FailureRecord for ShellResult {
    fn failure(message: String) -> Self {
        Self {
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: -1,
            error: Some(message),
        }
    }
}

/// Runs commands through `sh -c` inside the workspace.
#[derive(Debug, Clone)]
pub struct ShellRunner {
    workspace: Workspace,
    shell: PathBuf,
}

impl ShellRunner {
    pub fn new(workspace: Workspace) -> Self {
        Self {
            workspace,
            shell: PathBuf::from(DEFAULT_SHELL),
        }
    }

    /// Use a different shell binary. It must accept `-c <command>`.
    pub fn with_shell(mut self, shell: impl Into<PathBuf>) -> Self {
        self.shell = shell.into();
        self
    }

    pub async fn run(&self, command: &str, deadline: Deadline) -> ShellResult {
        debug!(len = command.len(), secs = deadline.as_secs(), "Running shell command");

        let child = deadline::confined_command(&self.shell, &self.workspace)
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .spawn();
        let child = match child {
            Ok(child) => child,
            Err(e) => {
                warn!(shell = %self.shell.display(), error = %e, "Failed to spawn shell");
                return ShellResult::spawn_failed(e.to_string());
            }
        };

        let result = match deadline::run_to_deadline(child, None, deadline).await {
            Ok(Outcome::Completed(captured)) => {
                let exit_code = captured
                    .status
                    .code()
                    .or_else(|| captured.status.signal().map(|sig| -sig))
                    .unwrap_or(-1);
                ShellResult {
                    success: exit_code == 0,
                    stdout: String::from_utf8_lossy(&captured.stdout).into_owned(),
                    stderr: String::from_utf8_lossy(&captured.stderr).into_owned(),
                    exit_code,
                    error: None,
                }
            }
            Ok(Outcome::TimedOut) => ShellResult::timed_out(deadline),
            Err(e) => ShellResult::spawn_failed(e.to_string()),
        };

        info!(
            exit_code = result.exit_code,
            success = result.success,
            "Shell command finished"
        );
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::{Duration, Instant};
    use tempfile::TempDir;

    fn runner() -> (TempDir, ShellRunner) {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        (dir, ShellRunner::new(ws))
    }

    #[tokio::test]
    async fn successful_command_captures_both_streams() {
        let (_dir, runner) = runner();
        let result = runner
            .run("echo hello; echo oops >&2", Deadline::from_secs(5))
            .await;
        assert!(result.success);
        assert_eq!(result.exit_code, 0);
        assert_eq!(result.stdout, "hello\n");
        assert_eq!(result.stderr, "oops\n");
        assert_eq!(result.error, None);
    }

    #[tokio::test]
    async fn nonzero_exit_is_not_success() {
        let (_dir, runner) = runner();
        let result = runner.run("exit 7", Deadline::from_secs(5)).await;
        assert!(!result.success);
        assert_eq!(result.exit_code, 7);
        assert_eq!(result.error, None);
    }

    #[tokio::test]
    async fn runs_in_workspace_with_confined_environment() {
        let (_dir, runner) = runner();
        let result = runner
            .run("pwd -P; echo \"$HOME\"; echo \"$PATH\"", Deadline::from_secs(5))
            .await;
        let root = runner.workspace.root().display().to_string();
        let lines: Vec<&str> = result.stdout.lines().collect();
        assert_eq!(lines, vec![root.as_str(), root.as_str(), deadline::CONFINED_PATH]);
    }

    #[tokio::test]
    async fn relative_writes_land_in_workspace() {
        let (_dir, runner) = runner();
        let result = runner
            .run("mkdir -p out && echo data > out/f.txt", Deadline::from_secs(5))
            .await;
        assert!(result.success);
        let written = std::fs::read_to_string(runner.workspace.root().join("out/f.txt")).unwrap();
        assert_eq!(written, "data\n");
    }

    #[tokio::test]
    async fn timeout_reports_minus_one_and_names_duration() {
        let (_dir, runner) = runner();
        let started = Instant::now();
        let result = runner.run("sleep 10", Deadline::from_secs(1)).await;
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(!result.success);
        assert_eq!(result.exit_code, -1);
        assert_eq!(result.stdout, "");
        assert_eq!(result.stderr, "");
        assert_eq!(
            result.error.as_deref(),
            Some("Command timed out after 1 seconds")
        );
    }

    #[tokio::test]
    async fn signal_exit_is_negative() {
        let (_dir, runner) = runner();
        let result = runner.run("kill -9 $$", Deadline::from_secs(5)).await;
        assert!(!result.success);
        assert_eq!(result.exit_code, -9);
    }

    #[tokio::test]
    async fn missing_shell_is_reported_not_raised() {
        let (_dir, runner) = runner();
        let runner = runner.with_shell("/nonexistent/shell");
        let result = runner.run("true", Deadline::from_secs(5)).await;
        assert!(!result.success);
        assert_eq!(result.exit_code, -1);
        let error = result.error.unwrap();
        assert!(!error.is_empty());
        assert_eq!(result.stderr, error);
    }

    #[tokio::test]
    async fn non_utf8_output_is_decoded_lossily() {
        let (_dir, runner) = runner();
        let result = runner.run("printf 'a\\377b'", Deadline::from_secs(5)).await;
        assert!(result.success);
        assert_eq!(result.stdout, "a\u{FFFD}b");
    }
}
