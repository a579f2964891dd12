//! `gitdock status`: repositories, last sync outcome and dependents.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use clap::Args;
use colored::Colorize;
use tabled::{settings::Style, Table, Tabled};

use gitdock_core::types::SyncOutcome;
use gitdock_daemon::status::{status_at, RepositoryStatus, StatusView};

use super::home;

/// Arguments for `gitdock status`.
#[derive(Args, Debug)]
pub struct StatusArgs {
    /// Emit machine-readable JSON.
    #[arg(long)]
    pub json: bool,
}

impl StatusArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let view = status_at(&home).context("failed to load status")?;
        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&view).context("failed to serialize status JSON")?
            );
            return Ok(());
        }
        print_table(view);
        Ok(())
    }
}

#[derive(Tabled)]
struct StatusTableRow {
    #[tabled(rename = "repository")]
    repository: String,
    #[tabled(rename = "branch")]
    branch: String,
    #[tabled(rename = "status")]
    status: String,
    #[tabled(rename = "last sync")]
    last_sync: String,
    #[tabled(rename = "dependents")]
    dependents: String,
}

fn print_table(view: StatusView) {
    println!(
        "gitdock v{} | {} repositories | {} containers mirrored ({} labelled)",
        env!("CARGO_PKG_VERSION"),
        view.repositories.len(),
        view.containers,
        view.labelled_containers,
    );

    if view.repositories.is_empty() {
        println!("No repositories registered.");
        return;
    }

    let needs_attention = view
        .repositories
        .iter()
        .filter(|r| r.active && !r.last_sync.as_ref().is_some_and(|s| s.success))
        .count();

    let rows: Vec<StatusTableRow> = view.repositories.into_iter().map(row).collect();
    let mut table = Table::new(rows);
    table.with(Style::rounded());
    println!("{table}");

    if needs_attention > 0 {
        println!("Run 'gitdock sync --all' to retry repositories that are not current.");
    }
}

fn row(repo: RepositoryStatus) -> StatusTableRow {
    let dependents = if repo.dependents.is_empty() {
        "-".to_string()
    } else {
        repo.dependents
            .iter()
            .map(|d| d.name.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    };
    StatusTableRow {
        status: status_indicator(repo.active, repo.last_sync.as_ref()),
        last_sync: last_sync_label(repo.last_sync.as_ref()),
        repository: repo.name,
        branch: repo.branch,
        dependents,
    }
}

fn status_indicator(active: bool, last: Option<&SyncOutcome>) -> String {
    if !active {
        return "■ DISABLED".bright_black().to_string();
    }
    match last {
        None => "■ NEVER SYNCED".bright_black().bold().to_string(),
        Some(s) if s.success && s.synthetic => "■ SYNTHETIC".yellow().bold().to_string(),
        Some(s) if s.success => "■ CURRENT".green().bold().to_string(),
        Some(s) => match s.category {
            Some(category) => format!("■ FAILED ({category})").red().bold().to_string(),
            None => "■ FAILED".red().bold().to_string(),
        },
    }
}

/// `"never"` or a coarse age such as `"5m ago"`.
pub(crate) fn last_sync_label(last: Option<&SyncOutcome>) -> String {
    match last {
        None => "never".to_string(),
        Some(outcome) => format_age(outcome.at, Utc::now()),
    }
}

fn format_age(at: DateTime<Utc>, now: DateTime<Utc>) -> String {
    let secs = (now - at).num_seconds().max(0);
    match secs {
        0..=59 => format!("{secs}s ago"),
        60..=3599 => format!("{}m ago", secs / 60),
        3600..=86_399 => format!("{}h ago", secs / 3600),
        _ => format!("{}d ago", secs / 86_400),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn ages_round_down_to_the_largest_unit() {
        let now = Utc::now();
        assert_eq!(format_age(now - Duration::seconds(42), now), "42s ago");
        assert_eq!(format_age(now - Duration::minutes(90), now), "1h ago");
        assert_eq!(format_age(now - Duration::days(3), now), "3d ago");
        assert_eq!(format_age(now + Duration::seconds(5), now), "0s ago");
    }
}
