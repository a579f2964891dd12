//! `gitdock repo add|list|remove|enable|disable`

use anyhow::{bail, Context, Result};
use clap::{Args, Subcommand};
use tabled::{settings::Style, Table, Tabled};

use gitdock_core::settings::load_settings_at;
use gitdock_core::store;
use gitdock_core::types::{RepoName, RepositoryRecord};
use gitdock_sync::url::{extract_repo_name, validate_git_url};
use gitdock_sync::RepositorySyncEngine;

use super::{block_on, home};

/// Manage tracked repositories.
#[derive(Subcommand, Debug)]
pub enum RepoCommand {
    /// Register a repository by URL.
    Add(AddArgs),

    /// List registered repositories.
    List,

    /// Forget a repository. The working copy is left on disk.
    Remove { name: String },

    /// Include a repository in notifications and sync-all.
    Enable { name: String },

    /// Reject notifications for a repository and skip it in sync-all.
    Disable { name: String },
}

#[derive(Args, Debug)]
pub struct AddArgs {
    /// Remote URL (`https://host/owner/name.git` or `git@host:owner/name.git`).
    pub url: String,

    /// Repository name; derived from the URL when omitted.
    #[arg(long, short = 'n')]
    pub name: Option<String>,

    /// Branch to track.
    #[arg(long, short = 'b', default_value = "main")]
    pub branch: String,

    /// Probe the remote with `git ls-remote` before registering.
    #[arg(long)]
    pub verify: bool,
}

#[derive(Tabled)]
struct RepoRow {
    name: String,
    branch: String,
    active: String,
    #[tabled(rename = "last sync")]
    last_sync: String,
    url: String,
}

pub fn run(cmd: RepoCommand) -> Result<()> {
    match cmd {
        RepoCommand::Add(args) => add(args),
        RepoCommand::List => list(),
        RepoCommand::Remove { name } => remove(&name),
        RepoCommand::Enable { name } => set_active(&name, true),
        RepoCommand::Disable { name } => set_active(&name, false),
    }
}

fn add(args: AddArgs) -> Result<()> {
    let home = home()?;
    validate_git_url(&args.url).with_context(|| format!("rejected URL '{}'", args.url))?;
    let name = args.name.unwrap_or_else(|| extract_repo_name(&args.url));

    if args.verify {
        let settings = load_settings_at(&home).context("failed to load settings")?;
        let engine = RepositorySyncEngine::from_settings(&home, &settings);
        if let Err(failure) = block_on(engine.verify_remote(&args.url))? {
            bail!("remote check failed [{}]: {}", failure.category(), failure.message());
        }
    }

    let record = store::add_repository_at(&home, RepositoryRecord::new(name, args.url, args.branch))
        .context("failed to register repository")?;
    println!("✓ Registered '{}' ({} @ {})", record.name, record.url, record.branch);
    Ok(())
}

fn list() -> Result<()> {
    let home = home()?;
    let repositories = store::list_repositories_at(&home).context("failed to load repositories")?;
    if repositories.is_empty() {
        println!("No repositories registered.");
        println!("Run: gitdock repo add <url>");
        return Ok(());
    }

    let rows: Vec<RepoRow> = repositories
        .into_iter()
        .map(|repo| RepoRow {
            last_sync: super::status::last_sync_label(repo.last_sync.as_ref()),
            name: repo.name.0,
            branch: repo.branch,
            active: if repo.active { "yes" } else { "no" }.to_string(),
            url: repo.url,
        })
        .collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");
    Ok(())
}

fn remove(name: &str) -> Result<()> {
    let home = home()?;
    store::remove_repository_at(&home, &RepoName::from(name))
        .with_context(|| format!("failed to remove '{name}'"))?;
    println!("✓ Removed '{name}'");
    Ok(())
}

fn set_active(name: &str, active: bool) -> Result<()> {
    let home = home()?;
    let mut record = store::load_repository_at(&home, &RepoName::from(name))
        .with_context(|| format!("failed to load '{name}'"))?;
    record.active = active;
    store::save_repository_at(&home, &mut record)
        .with_context(|| format!("failed to save '{name}'"))?;
    let state = if active { "enabled" } else { "disabled" };
    println!("✓ '{name}' {state}");
    Ok(())
}
