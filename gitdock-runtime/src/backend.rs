//! The container-runtime capability interface.

use std::collections::BTreeMap;

use async_trait::async_trait;

use gitdock_core::types::{BackendKind, ContainerId};

use crate::error::RuntimeError;
use crate::labels::{label_matches, DEPENDENCY_LABEL};

/// Statuses a restart is attempted for; anything else is skipped.
pub const RESTARTABLE_STATUSES: &[&str] = &["running", "exited", "created"];

/// A container as reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeContainer {
    pub id: ContainerId,
    pub name: String,
    pub image: String,
    pub status: String,
    pub labels: BTreeMap<String, String>,
}

impl RuntimeContainer {
    /// Raw value of the `restart-after` label, if present.
    pub fn dependency_label(&self) -> Option<&str> {
        self.labels.get(DEPENDENCY_LABEL).map(String::as_str)
    }

    pub fn is_restartable(&self) -> bool {
        let status = self.status.to_ascii_lowercase();
        RESTARTABLE_STATUSES.contains(&status.as_str())
    }
}

/// Which containers a `list` call should return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LabelFilter {
    /// Every container, labelled or not.
    Any,
    /// Containers whose dependency label lists this repository.
    Dependency(String),
}

impl LabelFilter {
    pub fn dependency(repository: impl Into<String>) -> Self {
        LabelFilter::Dependency(repository.into())
    }

    pub fn matches(&self, container: &RuntimeContainer) -> bool {
        match self {
            LabelFilter::Any => true,
            LabelFilter::Dependency(repo) => container
                .dependency_label()
                .map(|value| label_matches(value, repo))
                .unwrap_or(false),
        }
    }
}

/// One way of reaching the container runtime.
///
/// Implementations must bound every call with a timeout; none may block
/// indefinitely on the runtime.
#[async_trait]
pub trait RuntimeBackend: Send + Sync {
    fn kind(&self) -> BackendKind;

    /// Cheap reachability check.
    async fn available(&self) -> bool;

    /// Containers matching `filter`, including stopped ones.
    async fn list(&self, filter: &LabelFilter) -> Result<Vec<RuntimeContainer>, RuntimeError>;

    async fn restart(&self, id: &ContainerId) -> Result<(), RuntimeError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(status: &str, label: Option<&str>) -> RuntimeContainer {
        let mut labels = BTreeMap::new();
        if let Some(label) = label {
            labels.insert(DEPENDENCY_LABEL.to_string(), label.to_string());
        }
        RuntimeContainer {
            id: ContainerId::from("abc"),
            name: "web".into(),
            image: "nginx".into(),
            status: status.into(),
            labels,
        }
    }

    #[test]
    fn dependency_filter_uses_token_matching() {
        let c = container("running", Some("alpha, beta"));
        assert!(LabelFilter::dependency("beta").matches(&c));
        assert!(!LabelFilter::dependency("alp").matches(&c));
        assert!(LabelFilter::Any.matches(&c));
    }

    #[test]
    fn unlabelled_container_never_matches_dependency() {
        let c = container("running", None);
        assert!(!LabelFilter::dependency("alpha").matches(&c));
    }

    #[test]
    fn restartable_statuses() {
        assert!(container("Running", None).is_restartable());
        assert!(container("exited", None).is_restartable());
        assert!(!container("paused", None).is_restartable());
        assert!(!container("dead", None).is_restartable());
    }
}
