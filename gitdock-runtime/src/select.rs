//! Backend selection: Live → Command → Simulated.
//!
//! The chain is built once from settings. Each query walks it in order and
//! uses the first backend that is available and answers the listing; the same
//! backend then performs any restarts for that query.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use gitdock_core::settings::{self, Settings};
use gitdock_core::types::BackendKind;

use crate::backend::{LabelFilter, RuntimeBackend, RuntimeContainer};
use crate::command::{CommandBackend, DEFAULT_CANDIDATES};
use crate::error::RuntimeError;
use crate::live::LiveBackend;
use crate::simulated::SimulatedBackend;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub live_enabled: bool,
    pub docker_host: Option<String>,
    pub docker_candidates: Vec<PathBuf>,
    pub timeout: Duration,
    pub grace: Duration,
}

impl RuntimeConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let mut docker_candidates: Vec<PathBuf> = Vec::new();
        if let Some(path) = settings.get(settings::DOCKER_PATH) {
            docker_candidates.push(PathBuf::from(path));
        }
        for candidate in DEFAULT_CANDIDATES {
            let candidate = PathBuf::from(candidate);
            if !docker_candidates.contains(&candidate) {
                docker_candidates.push(candidate);
            }
        }
        Self {
            live_enabled: settings.bool_or(settings::RUNTIME_LIVE, true),
            docker_host: settings.get(settings::DOCKER_HOST).map(str::to_string),
            docker_candidates,
            timeout: Duration::from_secs(settings.u64_or(settings::DOCKER_TIMEOUT_SECS, 30)),
            grace: Duration::from_secs(settings.u64_or(settings::RESTART_GRACE_SECS, 10)),
        }
    }
}

/// A backend together with what it returned.
pub struct Selected {
    pub backend: Arc<dyn RuntimeBackend>,
    pub containers: Vec<RuntimeContainer>,
}

impl Selected {
    pub fn kind(&self) -> BackendKind {
        self.backend.kind()
    }
}

/// Ordered fallback chain of runtime backends.
#[derive(Clone)]
pub struct RuntimeChain {
    backends: Vec<Arc<dyn RuntimeBackend>>,
}

impl RuntimeChain {
    pub fn new(backends: Vec<Arc<dyn RuntimeBackend>>) -> Self {
        Self { backends }
    }

    /// Live (when enabled and a client can be built), Command, Simulated.
    pub fn from_config(home: &Path, config: &RuntimeConfig) -> Self {
        let mut backends: Vec<Arc<dyn RuntimeBackend>> = Vec::new();
        if config.live_enabled {
            match LiveBackend::connect(config.docker_host.as_deref(), config.timeout, config.grace) {
                Ok(live) => backends.push(Arc::new(live)),
                Err(err) => tracing::debug!(error = %err, "runtime API client unavailable"),
            }
        }
        backends.push(Arc::new(CommandBackend::new(
            config.docker_candidates.clone(),
            config.timeout,
            config.grace,
        )));
        backends.push(Arc::new(SimulatedBackend::new(home)));
        Self { backends }
    }

    pub fn kinds(&self) -> Vec<BackendKind> {
        self.backends.iter().map(|b| b.kind()).collect()
    }

    /// First backend reporting itself available.
    pub async fn select(&self) -> Option<Arc<dyn RuntimeBackend>> {
        for backend in &self.backends {
            if backend.available().await {
                return Some(Arc::clone(backend));
            }
        }
        None
    }

    /// List through the first backend that is available and answers.
    pub async fn list(&self, filter: &LabelFilter) -> Result<Selected, RuntimeError> {
        let mut last = None;
        for backend in &self.backends {
            let kind = backend.kind();
            if !backend.available().await {
                tracing::debug!(backend = %kind, "backend unavailable; falling back");
                continue;
            }
            match backend.list(filter).await {
                Ok(containers) => {
                    tracing::debug!(backend = %kind, count = containers.len(), "listed containers");
                    return Ok(Selected {
                        backend: Arc::clone(backend),
                        containers,
                    });
                }
                Err(err) => {
                    tracing::warn!(backend = %kind, error = %err, "listing failed; falling back");
                    last = Some(err);
                }
            }
        }
        Err(last.unwrap_or(RuntimeError::Unavailable {
            backend: BackendKind::Simulated,
            reason: "no runtime backend available".into(),
        }))
    }
}
