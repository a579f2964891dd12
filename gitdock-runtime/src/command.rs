//! Runtime access through the `docker` command-line client.
//!
//! Each operation tries the candidate executables in order. A spawn error,
//! non-zero exit or timeout moves on to the next candidate.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use gitdock_core::types::{BackendKind, ContainerId};

use crate::backend::{LabelFilter, RuntimeBackend, RuntimeContainer};
use crate::error::RuntimeError;
use crate::labels::DEPENDENCY_LABEL;

/// Install locations tried when no explicit path is configured first.
pub const DEFAULT_CANDIDATES: &[&str] = &["docker", "/usr/bin/docker", "/usr/local/bin/docker"];

pub struct CommandBackend {
    candidates: Vec<PathBuf>,
    timeout: Duration,
    grace: Duration,
}

impl CommandBackend {
    pub fn new(candidates: Vec<PathBuf>, timeout: Duration, grace: Duration) -> Self {
        Self {
            candidates,
            timeout,
            grace,
        }
    }

    pub fn candidates(&self) -> &[PathBuf] {
        &self.candidates
    }

    /// Run `args` against each candidate until one succeeds; return its stdout.
    async fn run(&self, operation: &'static str, args: &[String], limit: Duration) -> Result<String, RuntimeError> {
        let mut last = RuntimeError::Unavailable {
            backend: BackendKind::Command,
            reason: "no command candidates configured".into(),
        };
        for program in &self.candidates {
            match run_once(program, operation, args, limit).await {
                Ok(stdout) => return Ok(stdout),
                Err(err) => {
                    tracing::debug!(program = %program.display(), operation, error = %err, "runtime command failed; trying next location");
                    last = err;
                }
            }
        }
        Err(last)
    }
}

async fn run_once(
    program: &PathBuf,
    operation: &'static str,
    args: &[String],
    limit: Duration,
) -> Result<String, RuntimeError> {
    let program_name = program.display().to_string();
    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|e| RuntimeError::Command {
            program: program_name.clone(),
            operation,
            message: e.to_string(),
        })?;

    let output = match tokio::time::timeout(limit, child.wait_with_output()).await {
        Ok(result) => result.map_err(|e| RuntimeError::Command {
            program: program_name.clone(),
            operation,
            message: e.to_string(),
        })?,
        Err(_) => {
            return Err(RuntimeError::Timeout {
                backend: BackendKind::Command,
                operation,
                timeout: limit,
            })
        }
    };
    if !output.status.success() {
        return Err(RuntimeError::Command {
            program: program_name,
            operation,
            message: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }
    Ok(String::from_utf8_lossy(&output.stdout).into_owned())
}

/// Parse `docker ps` lines of `ID\tNAMES\tIMAGE\tSTATE\tLABEL`.
pub(crate) fn parse_ps_output(stdout: &str) -> Vec<RuntimeContainer> {
    stdout
        .lines()
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| {
            let mut fields = line.split('\t');
            let id = fields.next()?.trim();
            if id.is_empty() {
                return None;
            }
            let name = fields.next().unwrap_or_default().trim();
            let image = fields.next().unwrap_or_default().trim();
            let status = fields.next().unwrap_or_default().trim();
            let label = fields.next().unwrap_or_default().trim();
            let mut labels = BTreeMap::new();
            if !label.is_empty() {
                labels.insert(DEPENDENCY_LABEL.to_string(), label.to_string());
            }
            Some(RuntimeContainer {
                id: ContainerId::from(id),
                name: name.split(',').next().unwrap_or_default().to_string(),
                image: image.to_string(),
                status: status.to_string(),
                labels,
            })
        })
        .collect()
}

#[async_trait]
impl RuntimeBackend for CommandBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Command
    }

    async fn available(&self) -> bool {
        let args = vec![
            "version".to_string(),
            "--format".to_string(),
            "{{.Server.Version}}".to_string(),
        ];
        self.run("version", &args, self.timeout).await.is_ok()
    }

    async fn list(&self, filter: &LabelFilter) -> Result<Vec<RuntimeContainer>, RuntimeError> {
        let mut args = vec!["ps".to_string(), "-a".to_string(), "--no-trunc".to_string()];
        if matches!(filter, LabelFilter::Dependency(_)) {
            args.push("--filter".into());
            args.push(format!("label={DEPENDENCY_LABEL}"));
        }
        args.push("--format".into());
        args.push(format!(
            "{{{{.ID}}}}\t{{{{.Names}}}}\t{{{{.Image}}}}\t{{{{.State}}}}\t{{{{.Label \"{DEPENDENCY_LABEL}\"}}}}"
        ));
        let stdout = self.run("list", &args, self.timeout).await?;
        Ok(parse_ps_output(&stdout)
            .into_iter()
            .filter(|c| filter.matches(c))
            .collect())
    }

    async fn restart(&self, id: &ContainerId) -> Result<(), RuntimeError> {
        let args = vec![
            "restart".to_string(),
            "-t".to_string(),
            self.grace.as_secs().to_string(),
            id.0.clone(),
        ];
        self.run("restart", &args, self.timeout + self.grace)
            .await
            .map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ps_lines_are_parsed_with_dependency_label() {
        let out = "abc\tweb\tnginx:alpine\trunning\tdemo-api, worker\n\
                   def\tdb\tpostgres:16\texited\t\n\n";
        let parsed = parse_ps_output(out);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].dependency_label(), Some("demo-api, worker"));
        assert_eq!(parsed[1].dependency_label(), None);
        assert_eq!(parsed[1].status, "exited");
    }

    #[tokio::test]
    async fn all_candidates_missing_is_unavailable() {
        let backend = CommandBackend::new(
            vec![PathBuf::from("/nonexistent/docker"), PathBuf::from("/also/missing/docker")],
            Duration::from_secs(1),
            Duration::from_secs(1),
        );
        assert!(!backend.available().await);
        assert!(backend.list(&LabelFilter::Any).await.is_err());
    }

    #[tokio::test]
    #[cfg(unix)]
    async fn failing_candidate_falls_through_to_next() {
        use std::os::unix::fs::PermissionsExt;
        let dir = tempfile::TempDir::new().unwrap();
        let broken = dir.path().join("broken-docker");
        std::fs::write(&broken, "#!/bin/sh\necho boom >&2\nexit 1\n").unwrap();
        let working = dir.path().join("working-docker");
        std::fs::write(
            &working,
            "#!/bin/sh\nprintf 'abc\\tweb\\tnginx\\trunning\\tdemo-api\\n'\n",
        )
        .unwrap();
        for p in [&broken, &working] {
            std::fs::set_permissions(p, std::fs::Permissions::from_mode(0o755)).unwrap();
        }

        let backend = CommandBackend::new(
            vec![broken, working],
            Duration::from_secs(5),
            Duration::from_secs(1),
        );
        let listed = backend.list(&LabelFilter::dependency("demo-api")).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "web");
    }
}
