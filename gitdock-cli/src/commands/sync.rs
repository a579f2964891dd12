//! `gitdock sync`: pull one repository (or all) and restart dependents.

use anyhow::{bail, Context, Result};
use clap::Args;

use gitdock_core::types::RepoName;
use gitdock_daemon::{request_sync, request_sync_all, DaemonResponse, SyncOrchestrator, SyncResult};

use super::{block_on, home, print_sync_result};

/// Arguments for `gitdock sync`.
#[derive(Args, Debug)]
pub struct SyncArgs {
    /// Repository to sync (omit when using `--all`).
    pub repository: Option<String>,

    /// Sync every active repository, one at a time.
    #[arg(long, conflicts_with = "repository")]
    pub all: bool,

    /// Hand the work to the running daemon instead of doing it in-process.
    #[arg(long)]
    pub daemon: bool,

    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl SyncArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;

        if self.daemon {
            let sent = if self.all {
                request_sync_all(&home)
            } else {
                let name = self
                    .repository
                    .as_deref()
                    .context("provide a repository name or use --all")?;
                request_sync(&home, name)
            };
            return print_daemon_response(sent.context("daemon request failed")?);
        }

        let orchestrator =
            SyncOrchestrator::from_home(&home).context("failed to load settings")?;
        let results = if self.all {
            let results = block_on(orchestrator.sync_all())?.context("sync --all failed")?;
            if results.is_empty() {
                println!("No active repositories. Run `gitdock repo add <url>` first.");
            }
            results
        } else {
            let name = self
                .repository
                .clone()
                .context("provide a repository name or use --all")?;
            vec![block_on(orchestrator.process_update(&RepoName::from(name)))?]
        };

        report(&results, self.json)
    }
}

fn report(results: &[SyncResult], json: bool) -> Result<()> {
    if json {
        println!(
            "{}",
            serde_json::to_string_pretty(results).context("failed to serialize results")?
        );
    } else {
        results.iter().for_each(print_sync_result);
    }

    let failed = results.iter().filter(|r| !r.success()).count();
    if failed > 0 {
        bail!("{failed} of {} update(s) failed", results.len());
    }
    Ok(())
}

pub(crate) fn print_daemon_response(response: DaemonResponse) -> Result<()> {
    if let Some(data) = &response.data {
        println!(
            "{}",
            serde_json::to_string_pretty(data).context("failed to render daemon response")?
        );
    }
    match (response.ok, response.error) {
        (true, _) => Ok(()),
        (false, Some(err)) => bail!(err),
        (false, None) => bail!("daemon reported failure"),
    }
}
