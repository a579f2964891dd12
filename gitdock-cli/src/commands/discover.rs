//! `gitdock discover`

use anyhow::{Context, Result};
use clap::Args;
use tabled::{settings::Style, Table, Tabled};

use gitdock_daemon::SyncOrchestrator;

use super::{block_on, home};

#[derive(Args, Debug)]
pub struct DiscoverArgs {
    #[arg(long)]
    pub json: bool,
}

#[derive(Tabled)]
struct ContainerRow {
    name: String,
    id: String,
    status: String,
    #[tabled(rename = "restart-after")]
    label: String,
}

impl DiscoverArgs {
    pub fn run(self) -> Result<()> {
        let home = home()?;
        let orchestrator =
            SyncOrchestrator::from_home(&home).context("failed to load settings")?;
        let report = block_on(orchestrator.discover_containers())?.context("discovery failed")?;

        if self.json {
            println!(
                "{}",
                serde_json::to_string_pretty(&report).context("failed to serialize report")?
            );
            return Ok(());
        }

        println!(
            "via {}: {} inserted, {} updated, {} removed",
            report.backend, report.inserted, report.updated, report.removed
        );
        if report.containers.is_empty() {
            println!("No containers found.");
            return Ok(());
        }
        let rows: Vec<ContainerRow> = report
            .containers
            .into_iter()
            .map(|c| ContainerRow {
                id: c.id.0.chars().take(12).collect(),
                name: c.name,
                status: c.status,
                label: c.dependency_label.unwrap_or_default(),
            })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::rounded());
        println!("{table}");
        Ok(())
    }
}
