//! Read-only status view assembled from the local store.

use std::path::{Path, PathBuf};

use serde::Serialize;

use gitdock_core::store;
use gitdock_core::types::{ContainerRecord, RestartOutcome, SyncOutcome};
use gitdock_core::StoreError;
use gitdock_runtime::label_matches;

#[derive(Debug, Clone, Serialize)]
pub struct DependentStatus {
    pub id: String,
    pub name: String,
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_restart: Option<RestartOutcome>,
}

#[derive(Debug, Clone, Serialize)]
pub struct RepositoryStatus {
    pub name: String,
    pub url: String,
    pub branch: String,
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<SyncOutcome>,
    /// Mirrored containers whose dependency label lists this repository.
    pub dependents: Vec<DependentStatus>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusView {
    pub repositories: Vec<RepositoryStatus>,
    pub containers: usize,
    pub labelled_containers: usize,
}

/// Repositories with their last sync outcome and mirrored dependents.
pub fn status_at(home: &Path) -> Result<StatusView, StoreError> {
    let repositories = store::list_repositories_at(home)?;
    let containers = store::list_containers_at(home)?;

    let repositories = repositories
        .into_iter()
        .map(|repo| RepositoryStatus {
            dependents: containers
                .iter()
                .filter(|c| depends_on(c, &repo.name.0))
                .map(|c| DependentStatus {
                    id: c.id.0.clone(),
                    name: c.name.clone(),
                    status: c.status.clone(),
                    last_restart: c.last_restart.clone(),
                })
                .collect(),
            name: repo.name.0,
            url: repo.url,
            branch: repo.branch,
            active: repo.active,
            local_path: repo.local_path,
            last_sync: repo.last_sync,
        })
        .collect();

    Ok(StatusView {
        repositories,
        labelled_containers: containers
            .iter()
            .filter(|c| c.dependency_label.is_some())
            .count(),
        containers: containers.len(),
    })
}

fn depends_on(container: &ContainerRecord, repository: &str) -> bool {
    container
        .dependency_label
        .as_deref()
        .is_some_and(|label| label_matches(label, repository))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use gitdock_core::types::{ContainerId, RepositoryRecord};
    use tempfile::TempDir;

    fn container(id: &str, label: Option<&str>) -> ContainerRecord {
        ContainerRecord {
            id: ContainerId::from(id),
            name: format!("{id}-name"),
            image: "img".to_string(),
            status: "running".to_string(),
            dependency_label: label.map(str::to_string),
            last_restart: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn dependents_are_grouped_by_label_token() {
        let home = TempDir::new().unwrap();
        store::add_repository_at(
            home.path(),
            RepositoryRecord::new("demo-api", "https://example.com/o/demo-api.git", "main"),
        )
        .unwrap();
        store::save_container_at(home.path(), &container("c1", Some("demo-api"))).unwrap();
        store::save_container_at(home.path(), &container("c2", Some("billing, demo-api"))).unwrap();
        store::save_container_at(home.path(), &container("c3", Some("demo-api-v2"))).unwrap();
        store::save_container_at(home.path(), &container("c4", None)).unwrap();

        let view = status_at(home.path()).unwrap();
        assert_eq!(view.containers, 4);
        assert_eq!(view.labelled_containers, 3);
        let ids: Vec<_> = view.repositories[0]
            .dependents
            .iter()
            .map(|d| d.id.as_str())
            .collect();
        assert_eq!(ids, vec!["c1", "c2"]);
    }
}
