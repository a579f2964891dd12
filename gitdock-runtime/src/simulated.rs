//! Backend of last resort: answers from the local container mirror.
//!
//! Restarts are reported as successful without touching any runtime, and the
//! kind is [`BackendKind::Simulated`], which callers flag as non-authoritative.

use std::collections::BTreeMap;
use std::path::PathBuf;

use async_trait::async_trait;

use gitdock_core::store;
use gitdock_core::types::{BackendKind, ContainerId, ContainerRecord};

use crate::backend::{LabelFilter, RuntimeBackend, RuntimeContainer};
use crate::error::RuntimeError;
use crate::labels::DEPENDENCY_LABEL;

pub struct SimulatedBackend {
    home: PathBuf,
}

impl SimulatedBackend {
    pub fn new(home: impl Into<PathBuf>) -> Self {
        Self { home: home.into() }
    }
}

pub(crate) fn from_record(record: ContainerRecord) -> RuntimeContainer {
    let mut labels = BTreeMap::new();
    if let Some(label) = record.dependency_label {
        labels.insert(DEPENDENCY_LABEL.to_string(), label);
    }
    RuntimeContainer {
        id: record.id,
        name: record.name,
        image: record.image,
        status: record.status,
        labels,
    }
}

#[async_trait]
impl RuntimeBackend for SimulatedBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Simulated
    }

    async fn available(&self) -> bool {
        true
    }

    async fn list(&self, filter: &LabelFilter) -> Result<Vec<RuntimeContainer>, RuntimeError> {
        Ok(store::list_containers_at(&self.home)?
            .into_iter()
            .map(from_record)
            .filter(|c| filter.matches(c))
            .collect())
    }

    async fn restart(&self, id: &ContainerId) -> Result<(), RuntimeError> {
        match store::load_container_at(&self.home, id)? {
            Some(_) => {
                tracing::debug!(container = %id, "simulated restart");
                Ok(())
            }
            None => Err(RuntimeError::NotFound { id: id.0.clone() }),
        }
    }
}
