//! gitdock: keep repository working copies current and restart the
//! containers that depend on them.
//!
//! # Usage
//!
//! ```text
//! gitdock repo add <url> [--name <name>] [--branch main] [--verify]
//! gitdock repo list|remove|enable|disable
//! gitdock key set|generate|show|clear
//! gitdock settings get|set|unset|list
//! gitdock sync <repository> | --all [--daemon] [--json]
//! gitdock notify [--file payload.json] [--daemon]
//! gitdock discover [--json]
//! gitdock status [--json]
//! gitdock audit [--limit 20] [--json]
//! gitdock daemon start|stop|status|logs
//! ```

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

use commands::{
    audit::AuditArgs, daemon::DaemonCommand, discover::DiscoverArgs, key::KeyCommand,
    notify::NotifyArgs, repo::RepoCommand, settings::SettingsCommand, status::StatusArgs,
    sync::SyncArgs,
};

// ---------------------------------------------------------------------------
// CLI entry point
// ---------------------------------------------------------------------------

#[derive(Parser, Debug)]
#[command(
    name = "gitdock",
    version,
    about = "Sync git repositories and restart the containers that depend on them",
    long_about = None,
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Register, list and remove tracked repositories.
    Repo {
        #[command(subcommand)]
        command: RepoCommand,
    },

    /// Manage the signing key used for SSH fetches.
    Key {
        #[command(subcommand)]
        command: KeyCommand,
    },

    /// Read and change settings.
    Settings {
        #[command(subcommand)]
        command: SettingsCommand,
    },

    /// Pull a repository and restart its dependent containers.
    Sync(SyncArgs),

    /// Process a repository-update notification payload.
    Notify(NotifyArgs),

    /// Refresh the local container mirror from the runtime.
    Discover(DiscoverArgs),

    /// Show repositories, their last sync and dependent containers.
    Status(StatusArgs),

    /// Show recent audit entries.
    Audit(AuditArgs),

    /// Run and control the background daemon.
    Daemon {
        #[command(subcommand)]
        command: DaemonCommand,
    },
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

fn main() -> Result<()> {
    let cli = Cli::parse();
    if !matches!(
        cli.command,
        Commands::Daemon {
            command: DaemonCommand::Start
        }
    ) {
        init_tracing();
    }

    match cli.command {
        Commands::Repo { command } => commands::repo::run(command),
        Commands::Key { command } => commands::key::run(command),
        Commands::Settings { command } => commands::settings::run(command),
        Commands::Sync(args) => args.run(),
        Commands::Notify(args) => args.run(),
        Commands::Discover(args) => args.run(),
        Commands::Status(args) => args.run(),
        Commands::Audit(args) => args.run(),
        Commands::Daemon { command } => commands::daemon::run(command),
    }
}

/// One-shot commands log warnings and errors to stderr unless `RUST_LOG` says
/// otherwise. The daemon installs its own subscriber.
fn init_tracing() {
    use tracing_subscriber::{fmt, EnvFilter};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    let _ = fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init();
}
