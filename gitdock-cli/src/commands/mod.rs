pub mod audit;
pub mod daemon;
pub mod discover;
pub mod key;
pub mod notify;
pub mod repo;
pub mod settings;
pub mod status;
pub mod sync;

use std::future::Future;
use std::path::PathBuf;

use anyhow::{Context, Result};
use colored::Colorize;

use gitdock_core::store;
use gitdock_daemon::SyncResult;

pub(crate) fn home() -> Result<PathBuf> {
    store::default_home().context("could not determine home directory")
}

/// Run one async operation to completion on a fresh runtime.
pub(crate) fn block_on<F: Future>(future: F) -> Result<F::Output> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to start async runtime")?;
    Ok(runtime.block_on(future))
}

/// Human-readable rendering of one update, shared by `sync` and `notify`.
pub(crate) fn print_sync_result(result: &SyncResult) {
    let mark = if result.success() {
        "✓".green().to_string()
    } else {
        "✗".red().to_string()
    };
    let synthetic = if result.synthetic { " (synthetic)" } else { "" };
    println!("{mark} {}{synthetic}", result.repository.bold());
    if !result.pull_message.is_empty() {
        println!("  pull: {}", result.pull_message);
    }
    if let Some(backend) = result.backend {
        println!("  runtime: {backend}");
    }
    for line in &result.restart_messages {
        println!("  {line}");
    }
    for err in &result.errors {
        println!("  {} {err}", "error:".red());
    }
}
