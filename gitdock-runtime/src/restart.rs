//! Restart the containers that depend on a repository, and keep the local
//! container mirror in step with the runtime.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::Utc;
use serde::Serialize;

use gitdock_core::store;
use gitdock_core::types::{
    AuditDetail, AuditOperation, AuditOutcome, BackendKind, ContainerId, ContainerRecord,
    RestartOutcome, SyncAuditEntry,
};

use crate::backend::{LabelFilter, RuntimeContainer};
use crate::error::RuntimeError;
use crate::select::RuntimeChain;

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

/// Result of one container within a restart pass.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContainerRestartResult {
    pub id: ContainerId,
    pub name: String,
    pub success: bool,
    /// Status was not restartable; no restart was attempted.
    pub skipped: bool,
    /// False when the outcome comes from the simulated backend.
    pub authoritative: bool,
    pub message: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RestartReport {
    pub repository: String,
    /// Backend that served the pass; `None` when no backend answered.
    pub backend: Option<BackendKind>,
    pub success_count: usize,
    /// One line per container, or a single informational line.
    pub messages: Vec<String>,
    pub results: Vec<ContainerRestartResult>,
    /// Set when the runtime could not be queried at all.
    pub error: Option<String>,
}

impl RestartReport {
    pub fn failure_count(&self) -> usize {
        self.results
            .iter()
            .filter(|r| !r.success && !r.skipped)
            .count()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DiscoveryReport {
    pub backend: BackendKind,
    pub containers: Vec<ContainerRecord>,
    pub inserted: usize,
    pub updated: usize,
    pub removed: usize,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct ContainerRestartEngine {
    home: PathBuf,
    chain: RuntimeChain,
}

impl ContainerRestartEngine {
    pub fn new(home: impl Into<PathBuf>, chain: RuntimeChain) -> Self {
        Self {
            home: home.into(),
            chain,
        }
    }

    pub fn chain(&self) -> &RuntimeChain {
        &self.chain
    }

    /// Restart every container whose dependency label lists `repository`.
    ///
    /// One container's failure never stops the others. No matches yields a
    /// single informational message and `success_count == 0`.
    pub async fn restart_for_repository(&self, repository: &str) -> RestartReport {
        let mut report = RestartReport {
            repository: repository.to_string(),
            backend: None,
            success_count: 0,
            messages: Vec::new(),
            results: Vec::new(),
            error: None,
        };

        let selected = match self.chain.list(&LabelFilter::dependency(repository)).await {
            Ok(selected) => selected,
            Err(err) => {
                tracing::warn!(repository, error = %err, "container runtime could not be queried");
                report
                    .messages
                    .push(format!("Could not query container runtime: {err}"));
                report.error = Some(err.to_string());
                return report;
            }
        };
        let kind = selected.kind();
        report.backend = Some(kind);

        if selected.containers.is_empty() {
            report
                .messages
                .push(format!("No containers depend on repository {repository}"));
            return report;
        }

        tracing::info!(repository, backend = %kind, count = selected.containers.len(), "restarting dependent containers");
        for container in &selected.containers {
            let result = if !container.is_restartable() {
                ContainerRestartResult {
                    id: container.id.clone(),
                    name: container.name.clone(),
                    success: false,
                    skipped: true,
                    authoritative: kind.is_authoritative(),
                    message: format!(
                        "Skipped {} ({}): status '{}' is not restartable",
                        container.name, container.id, container.status
                    ),
                }
            } else {
                let outcome = selected.backend.restart(&container.id).await;
                let result = restart_result(container, kind, &outcome);
                self.record_restart(container, kind, &outcome);
                result
            };
            if result.success {
                report.success_count += 1;
            }
            report.messages.push(result.message.clone());
            report.results.push(result);
        }
        report
    }

    /// Reconcile the mirror with the runtime: insert new, update changed,
    /// delete vanished. With only the simulated backend reachable the mirror
    /// is returned untouched.
    pub async fn discover(&self) -> Result<DiscoveryReport, RuntimeError> {
        let selected = self.chain.list(&LabelFilter::Any).await?;
        let kind = selected.kind();
        let mirror = store::list_containers_at(&self.home)?;

        if !kind.is_authoritative() {
            tracing::info!(count = mirror.len(), "runtime unreachable; discovery returns the local mirror");
            return Ok(DiscoveryReport {
                backend: kind,
                containers: mirror,
                inserted: 0,
                updated: 0,
                removed: 0,
            });
        }

        let mut existing: HashMap<ContainerId, ContainerRecord> =
            mirror.into_iter().map(|c| (c.id.clone(), c)).collect();
        let (mut inserted, mut updated) = (0, 0);

        for live in &selected.containers {
            match existing.remove(&live.id) {
                Some(mut record) => {
                    if apply_live_fields(&mut record, live) {
                        record.updated_at = Utc::now();
                        store::save_container_at(&self.home, &record)?;
                        updated += 1;
                    }
                }
                None => {
                    store::save_container_at(&self.home, &new_record(live))?;
                    inserted += 1;
                }
            }
        }

        let removed = existing.len();
        for id in existing.keys() {
            store::remove_container_at(&self.home, id)?;
        }

        tracing::info!(backend = %kind, inserted, updated, removed, "discovery pass complete");
        let entry = SyncAuditEntry::new(
            AuditOperation::Discovery,
            "containers",
            AuditOutcome::Success,
            AuditDetail::Discovery {
                backend: kind,
                inserted,
                updated,
                removed,
            },
        );
        if let Err(err) = store::append_audit_at(&self.home, &entry) {
            tracing::warn!(error = %err, "could not append audit entry");
        }

        Ok(DiscoveryReport {
            backend: kind,
            containers: store::list_containers_at(&self.home)?,
            inserted,
            updated,
            removed,
        })
    }

    /// Store the outcome on the mirrored record and append an audit entry.
    fn record_restart(
        &self,
        container: &RuntimeContainer,
        kind: BackendKind,
        outcome: &Result<(), RuntimeError>,
    ) {
        let error = outcome.as_ref().err().map(|e| e.to_string());
        let mut record = match store::load_container_at(&self.home, &container.id) {
            Ok(Some(record)) => record,
            Ok(None) => new_record(container),
            Err(err) => {
                tracing::warn!(container = %container.id, error = %err, "could not read mirrored container");
                new_record(container)
            }
        };
        let now = Utc::now();
        record.last_restart = Some(RestartOutcome {
            success: error.is_none(),
            at: now,
            backend: kind,
            error: error.clone(),
        });
        record.updated_at = now;
        if let Err(err) = store::save_container_at(&self.home, &record) {
            tracing::warn!(container = %container.id, error = %err, "could not update mirrored container");
        }

        let audit_outcome = match (&error, kind.is_authoritative()) {
            (Some(_), _) => AuditOutcome::Failure,
            (None, true) => AuditOutcome::Success,
            (None, false) => AuditOutcome::SyntheticSuccess,
        };
        let entry = SyncAuditEntry::new(
            AuditOperation::Restart,
            container.name.clone(),
            audit_outcome,
            AuditDetail::Restart {
                container_id: container.id.clone(),
                container_name: container.name.clone(),
                backend: kind,
                authoritative: kind.is_authoritative(),
                error,
            },
        );
        if let Err(err) = store::append_audit_at(&self.home, &entry) {
            tracing::warn!(container = %container.id, error = %err, "could not append audit entry");
        }
    }
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn restart_result(
    container: &RuntimeContainer,
    kind: BackendKind,
    outcome: &Result<(), RuntimeError>,
) -> ContainerRestartResult {
    let authoritative = kind.is_authoritative();
    let (success, message) = match outcome {
        Ok(()) if authoritative => (
            true,
            format!("Restarted {} ({}) via {kind}", container.name, container.id),
        ),
        Ok(()) => (
            true,
            format!(
                "Simulated restart of {} ({}); runtime unreachable, outcome not verified",
                container.name, container.id
            ),
        ),
        Err(err) => {
            tracing::warn!(container = %container.id, backend = %kind, error = %err, "restart failed");
            (
                false,
                format!("Failed to restart {} ({}): {err}", container.name, container.id),
            )
        }
    };
    ContainerRestartResult {
        id: container.id.clone(),
        name: container.name.clone(),
        success,
        skipped: false,
        authoritative,
        message,
    }
}

fn new_record(live: &RuntimeContainer) -> ContainerRecord {
    ContainerRecord {
        id: live.id.clone(),
        name: live.name.clone(),
        image: live.image.clone(),
        status: live.status.clone(),
        dependency_label: live.dependency_label().map(str::to_string),
        last_restart: None,
        updated_at: Utc::now(),
    }
}

/// Copy runtime-owned fields onto `record`; returns whether anything changed.
fn apply_live_fields(record: &mut ContainerRecord, live: &RuntimeContainer) -> bool {
    let label = live.dependency_label().map(str::to_string);
    let changed = record.name != live.name
        || record.image != live.image
        || record.status != live.status
        || record.dependency_label != label;
    if changed {
        record.name = live.name.clone();
        record.image = live.image.clone();
        record.status = live.status.clone();
        record.dependency_label = label;
    }
    changed
}
