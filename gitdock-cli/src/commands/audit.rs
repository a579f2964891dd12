//! `gitdock audit`

use anyhow::{Context, Result};
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

use gitdock_core::store;
use gitdock_core::types::{AuditDetail, SyncAuditEntry};

use super::home;

#[derive(Args, Debug)]
pub struct AuditArgs {
    /// Number of most recent entries to show.
    #[arg(long, short = 'n', default_value_t = 20)]
    pub limit: usize,

    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct AuditRow {
    at: String,
    operation: String,
    subject: String,
    outcome: String,
    detail: String,
}

impl AuditArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let entries = store::read_audit_at(&home, self.limit).context("failed to read audit log")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&entries).context("failed to serialize audit")?
            );
            return Ok(());
        }
        if entries.is_empty() {
            println!("No audit entries.");
            return Ok(());
        }

        let rows: Vec<AuditRow> = entries.iter().map(row).collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}

fn row(entry: &SyncAuditEntry) -> AuditRow {
    AuditRow {
        at: entry.at.format("%Y-%m-%d %H:%M:%S").to_string(),
        operation: entry.operation.to_string(),
        subject: entry.subject.clone(),
        outcome: entry.outcome.to_string(),
        detail: summarize(&entry.detail),
    }
}

fn summarize(detail: &AuditDetail) -> String {
    match detail {
        AuditDetail::Sync {
            action, failure, ..
        } => match failure {
            Some(failure) => format!("{action}: {}", failure.category()),
            None => action.to_string(),
        },
        AuditDetail::Restart {
            container_name,
            backend,
            error,
            ..
        } => match error {
            Some(err) => format!("{container_name} via {backend}: {err}"),
            None => format!("{container_name} via {backend}"),
        },
        AuditDetail::Update {
            restarted,
            failed,
            errors,
            ..
        } => {
            let mut s = format!("{restarted} restarted, {failed} failed");
            if let Some(first) = errors.first() {
                s.push_str(&format!("; {first}"));
            }
            s
        }
        AuditDetail::Discovery {
            backend,
            inserted,
            updated,
            removed,
        } => format!("{backend}: +{inserted} ~{updated} -{removed}"),
        AuditDetail::Rejected { reason } => reason.clone(),
    }
}
