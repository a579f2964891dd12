//! `gitdock notify`: feed a repository-update payload through the pipeline.

use std::io::Read;
use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::Args;
use serde_json::Value;

use gitdock_daemon::{intake, request_notify, SyncOrchestrator};

use super::{block_on, home, print_sync_result};

#[derive(Args, Debug)]
pub struct NotifyArgs {
    /// JSON payload file; stdin when omitted.
    #[arg(long, short = 'f')]
    pub file: Option<PathBuf>,

    /// Deliver to the running daemon.
    #[arg(long)]
    pub daemon: bool,
}

impl NotifyArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let raw = match &self.file {
            Some(path) => std::fs::read_to_string(path)
                .with_context(|| format!("read {}", path.display()))?,
            None => {
                let mut buf = String::new();
                std::io::stdin()
                    .read_to_string(&mut buf)
                    .context("read payload from stdin")?;
                buf
            }
        };
        let payload: Value = serde_json::from_str(&raw).context("payload is not valid JSON")?;

        if self.daemon {
            let response = request_notify(&home, payload).context("daemon request failed")?;
            return super::sync::print_daemon_response(response);
        }

        let notification = intake::accept(&home, &payload)?;
        let orchestrator =
            SyncOrchestrator::from_home(&home).context("failed to load settings")?;
        let result = block_on(orchestrator.process_update(&notification.repository))?;
        print_sync_result(&result);
        if !result.success() {
            bail!("update of '{}' failed", result.repository);
        }
        Ok(())
    }
}
