//! Direct runtime API access through the local Docker socket.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use bollard::container::{ListContainersOptions, RestartContainerOptions};
use bollard::models::ContainerSummary;
use bollard::{Docker, API_DEFAULT_VERSION};

use gitdock_core::types::{BackendKind, ContainerId};

use crate::backend::{LabelFilter, RuntimeBackend, RuntimeContainer};
use crate::error::RuntimeError;
use crate::labels::DEPENDENCY_LABEL;

pub struct LiveBackend {
    docker: Docker,
    timeout: Duration,
    grace: Duration,
}

impl LiveBackend {
    /// Build a client for `host` (`unix://…`, `tcp://…`) or the local defaults.
    ///
    /// No request is made here; reachability is checked by
    /// [`RuntimeBackend::available`].
    pub fn connect(host: Option<&str>, timeout: Duration, grace: Duration) -> Result<Self, RuntimeError> {
        let secs = timeout.as_secs().max(1);
        let docker = match host {
            Some(h) if h.starts_with("tcp://") || h.starts_with("http://") => {
                Docker::connect_with_http(h, secs, API_DEFAULT_VERSION)?
            }
            Some(h) => {
                let path = h.strip_prefix("unix://").unwrap_or(h);
                Docker::connect_with_unix(path, secs, API_DEFAULT_VERSION)?
            }
            None => Docker::connect_with_local_defaults()?,
        };
        Ok(Self {
            docker,
            timeout,
            grace,
        })
    }

    async fn bounded<T>(
        &self,
        operation: &'static str,
        limit: Duration,
        call: impl Future<Output = Result<T, bollard::errors::Error>>,
    ) -> Result<T, RuntimeError> {
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result.map_err(RuntimeError::from),
            Err(_) => Err(RuntimeError::Timeout {
                backend: BackendKind::Live,
                operation,
                timeout: limit,
            }),
        }
    }
}

fn to_runtime_container(summary: ContainerSummary) -> RuntimeContainer {
    let name = summary
        .names
        .as_ref()
        .and_then(|names| names.first())
        .map(|n| n.trim_start_matches('/').to_string())
        .unwrap_or_default();
    RuntimeContainer {
        id: ContainerId(summary.id.unwrap_or_default()),
        name,
        image: summary.image.unwrap_or_default(),
        status: summary.state.unwrap_or_default(),
        labels: summary.labels.unwrap_or_default().into_iter().collect(),
    }
}

#[async_trait]
impl RuntimeBackend for LiveBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Live
    }

    async fn available(&self) -> bool {
        match self.bounded("ping", self.timeout, self.docker.ping()).await {
            Ok(_) => true,
            Err(err) => {
                tracing::debug!(error = %err, "runtime API not reachable");
                false
            }
        }
    }

    async fn list(&self, filter: &LabelFilter) -> Result<Vec<RuntimeContainer>, RuntimeError> {
        let mut filters = HashMap::new();
        if matches!(filter, LabelFilter::Dependency(_)) {
            filters.insert("label".to_string(), vec![DEPENDENCY_LABEL.to_string()]);
        }
        let options = ListContainersOptions::<String> {
            all: true,
            filters,
            ..Default::default()
        };
        let summaries = self
            .bounded("list", self.timeout, self.docker.list_containers(Some(options)))
            .await?;
        Ok(summaries
            .into_iter()
            .map(to_runtime_container)
            .filter(|c| !c.id.0.is_empty() && filter.matches(c))
            .collect())
    }

    async fn restart(&self, id: &ContainerId) -> Result<(), RuntimeError> {
        let options = RestartContainerOptions {
            t: self.grace.as_secs() as isize,
        };
        self.bounded(
            "restart",
            self.timeout + self.grace,
            self.docker.restart_container(&id.0, Some(options)),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn summary_conversion_strips_leading_slash() {
        let mut labels = HashMap::new();
        labels.insert(DEPENDENCY_LABEL.to_string(), "demo-api".to_string());
        let summary = ContainerSummary {
            id: Some("abc123".into()),
            names: Some(vec!["/web".into()]),
            image: Some("nginx:alpine".into()),
            state: Some("running".into()),
            labels: Some(labels),
            ..Default::default()
        };
        let c = to_runtime_container(summary);
        assert_eq!(c.name, "web");
        assert_eq!(c.dependency_label(), Some("demo-api"));
        assert_eq!(c.status, "running");
    }

    #[tokio::test]
    async fn unreachable_socket_is_not_available() {
        let dir = tempfile::TempDir::new().unwrap();
        let socket = dir.path().join("missing.sock");
        let backend = LiveBackend::connect(
            Some(&format!("unix://{}", socket.display())),
            Duration::from_secs(1),
            Duration::from_secs(1),
        )
        .expect("client construction does not connect");
        assert!(!backend.available().await);
    }
}
