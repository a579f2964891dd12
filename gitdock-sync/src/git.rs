//! Git invocation with a hard per-call timeout.

use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Duration;

use tokio::process::Command;

use gitdock_core::settings::{self, Settings};

use crate::credentials::ProvisionedKey;
use crate::error::SyncError;

pub const DEFAULT_GIT_TIMEOUT: Duration = Duration::from_secs(120);

/// Runs the `git` executable. The child is killed if the timeout elapses.
#[derive(Debug, Clone)]
pub struct GitRunner {
    program: PathBuf,
    timeout: Duration,
}

impl GitRunner {
    pub fn new(program: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            program: program.into(),
            timeout,
        }
    }

    /// `git_path` and `git_timeout_secs`, with defaults.
    pub fn from_settings(settings: &Settings) -> Self {
        Self::new(
            settings.str_or(settings::GIT_PATH, "git"),
            Duration::from_secs(
                settings.u64_or(settings::GIT_TIMEOUT_SECS, DEFAULT_GIT_TIMEOUT.as_secs()),
            ),
        )
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Run `git <args>` and return trimmed stdout.
    pub async fn run(
        &self,
        args: &[&str],
        cwd: Option<&Path>,
        key: Option<&ProvisionedKey>,
    ) -> Result<String, SyncError> {
        let program = self.program.display().to_string();
        let mut cmd = Command::new(&self.program);
        cmd.args(args)
            .env("GIT_TERMINAL_PROMPT", "0")
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(dir) = cwd {
            cmd.current_dir(dir);
        }
        if let Some(key) = key {
            cmd.env("GIT_SSH_COMMAND", key.ssh_command());
        }

        tracing::debug!(program = %program, args = ?args, "running git");
        let child = cmd.spawn().map_err(|source| SyncError::Spawn {
            program: program.clone(),
            source,
        })?;

        let output = match tokio::time::timeout(self.timeout, child.wait_with_output()).await {
            Ok(result) => result.map_err(|source| SyncError::Spawn {
                program: program.clone(),
                source,
            })?,
            Err(_) => {
                tracing::warn!(program = %program, args = ?args, timeout_secs = self.timeout.as_secs(), "git timed out");
                return Err(SyncError::Timeout {
                    program,
                    timeout: self.timeout,
                });
            }
        };

        if output.status.success() {
            Ok(String::from_utf8_lossy(&output.stdout).trim().to_string())
        } else {
            let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.is_empty() {
                stderr = String::from_utf8_lossy(&output.stdout).trim().to_string();
            }
            Err(SyncError::Failed {
                program,
                code: output.status.code(),
                stderr,
            })
        }
    }
}

impl Default for GitRunner {
    fn default() -> Self {
        Self::new("git", DEFAULT_GIT_TIMEOUT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn successful_command_returns_stdout() {
        let runner = GitRunner::new("echo", Duration::from_secs(5));
        let out = runner.run(&["hello"], None, None).await.expect("echo");
        assert_eq!(out, "hello");
    }

    #[tokio::test]
    async fn missing_program_is_spawn_error() {
        let runner = GitRunner::new("/nonexistent/gitdock-git", Duration::from_secs(5));
        let err = runner.run(&["status"], None, None).await.unwrap_err();
        assert!(matches!(err, SyncError::Spawn { .. }), "got: {err}");
    }

    #[tokio::test]
    async fn non_zero_exit_is_failed_with_code() {
        let runner = GitRunner::new("false", Duration::from_secs(5));
        let err = runner.run(&[], None, None).await.unwrap_err();
        assert_eq!(err.exit_code(), Some(1));
    }

    #[tokio::test]
    async fn slow_command_times_out() {
        let runner = GitRunner::new("sleep", Duration::from_millis(100));
        let err = runner.run(&["5"], None, None).await.unwrap_err();
        assert!(matches!(err, SyncError::Timeout { .. }), "got: {err}");
    }
}
