//! The single pull-then-restart path for a repository update.
//!
//! Every trigger (notification, manual sync, sync-all) goes through
//! [`SyncOrchestrator::process_update`]:
//!
//! ```text
//! START ──▶ PULLING ──▶ PULL_FAILED            (terminal)
//!                  └──▶ RESTARTING ──▶ DONE
//! ```
//!
//! Nothing is retried in-process; the caller is the retry boundary. Updates
//! for the same repository are serialised by a per-repository async lock.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::OwnedMutexGuard;
use tokio::time::Instant;

use gitdock_core::settings::{self, Settings};
use gitdock_core::store;
use gitdock_core::types::{
    AuditDetail, AuditOperation, AuditOutcome, BackendKind, FailureCategory, RepoName,
    SyncAuditEntry,
};
use gitdock_core::StoreError;
use gitdock_runtime::{
    ContainerRestartEngine, ContainerRestartResult, DiscoveryReport, RuntimeChain, RuntimeConfig,
    RuntimeError,
};
use gitdock_sync::RepositorySyncEngine;

pub const DEFAULT_SYNC_ALL_PAUSE: Duration = Duration::from_millis(1000);

// ---------------------------------------------------------------------------
// Result
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UpdatePhase {
    Start,
    Pulling,
    PullFailed,
    Restarting,
    Done,
}

/// Structured outcome of one `process_update` call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyncResult {
    pub repository: String,
    pub pull_success: bool,
    pub pull_message: String,
    /// Pull success was recorded without a completed fetch.
    pub synthetic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure_category: Option<FailureCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backend: Option<BackendKind>,
    pub container_results: Vec<ContainerRestartResult>,
    pub restart_messages: Vec<String>,
    pub errors: Vec<String>,
    /// Last phase reached.
    pub phase: UpdatePhase,
}

impl SyncResult {
    fn start(repository: &RepoName) -> Self {
        Self {
            repository: repository.0.clone(),
            pull_success: false,
            pull_message: String::new(),
            synthetic: false,
            failure_category: None,
            backend: None,
            container_results: Vec::new(),
            restart_messages: Vec::new(),
            errors: Vec::new(),
            phase: UpdatePhase::Start,
        }
    }

    /// Overall success: the repository advanced and no pipeline error occurred.
    /// Individual restart failures are reported per container only.
    pub fn success(&self) -> bool {
        self.pull_success && self.errors.is_empty()
    }

    pub fn restarted_count(&self) -> usize {
        self.container_results.iter().filter(|r| r.success).count()
    }

    pub fn failed_count(&self) -> usize {
        self.container_results
            .iter()
            .filter(|r| !r.success && !r.skipped)
            .count()
    }
}

// ---------------------------------------------------------------------------
// Per-repository locks
// ---------------------------------------------------------------------------

type LockMap = Arc<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>;

/// One async mutex per repository name. Entries live only while held or awaited.
#[derive(Debug, Clone, Default)]
pub struct RepoLocks {
    inner: LockMap,
}

impl RepoLocks {
    pub async fn acquire(&self, repository: &str) -> RepoLockGuard {
        let lock = {
            let mut map = self.inner.lock().unwrap_or_else(|p| p.into_inner());
            Arc::clone(map.entry(repository.to_string()).or_default())
        };
        let guard = lock.lock_owned().await;
        RepoLockGuard {
            guard: Some(guard),
            key: repository.to_string(),
            map: Arc::clone(&self.inner),
        }
    }

    /// Number of names currently tracked.
    pub fn tracked(&self) -> usize {
        self.inner.lock().unwrap_or_else(|p| p.into_inner()).len()
    }
}

/// Held for the duration of one update; drops the map entry when nobody else wants it.
#[derive(Debug)]
pub struct RepoLockGuard {
    guard: Option<OwnedMutexGuard<()>>,
    key: String,
    map: LockMap,
}

impl Drop for RepoLockGuard {
    fn drop(&mut self) {
        self.guard.take();
        let mut map = self.map.lock().unwrap_or_else(|p| p.into_inner());
        if map.get(&self.key).is_some_and(|lock| Arc::strong_count(lock) == 1) {
            map.remove(&self.key);
        }
    }
}

// ---------------------------------------------------------------------------
// Scheduler
// ---------------------------------------------------------------------------

/// Releases at most one slot per `interval`; the first slot is immediate.
#[derive(Debug)]
pub struct Pacer {
    interval: Duration,
    last: Option<Instant>,
}

impl Pacer {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub async fn ready(&mut self) {
        if let Some(last) = self.last {
            tokio::time::sleep_until(last + self.interval).await;
        }
        self.last = Some(Instant::now());
    }
}

// ---------------------------------------------------------------------------
// Orchestrator
// ---------------------------------------------------------------------------

pub struct SyncOrchestrator {
    home: PathBuf,
    sync: RepositorySyncEngine,
    restart: ContainerRestartEngine,
    locks: RepoLocks,
    pause: Duration,
}

impl SyncOrchestrator {
    pub fn new(home: impl Into<PathBuf>, sync: RepositorySyncEngine, restart: ContainerRestartEngine) -> Self {
        Self {
            home: home.into(),
            sync,
            restart,
            locks: RepoLocks::default(),
            pause: DEFAULT_SYNC_ALL_PAUSE,
        }
    }

    /// Build both engines from `settings.yaml`.
    pub fn from_home(home: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let home = home.into();
        let settings = settings::load_settings_at(&home)?;
        Ok(Self::from_settings(home, &settings))
    }

    pub fn from_settings(home: PathBuf, settings: &Settings) -> Self {
        let sync = RepositorySyncEngine::from_settings(&home, settings);
        let chain = RuntimeChain::from_config(&home, &RuntimeConfig::from_settings(settings));
        let restart = ContainerRestartEngine::new(&home, chain);
        let pause = Duration::from_millis(
            settings.u64_or(settings::SYNC_ALL_PAUSE_MS, DEFAULT_SYNC_ALL_PAUSE.as_millis() as u64),
        );
        Self::new(home, sync, restart).with_pause(pause)
    }

    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    pub fn home(&self) -> &PathBuf {
        &self.home
    }

    /// Pull `repository`, then restart its dependent containers.
    pub async fn process_update(&self, repository: &RepoName) -> SyncResult {
        let _guard = self.locks.acquire(&repository.0).await;
        let mut result = SyncResult::start(repository);

        let mut record = match store::load_repository_at(&self.home, repository) {
            Ok(record) if record.active => record,
            Ok(_) => {
                result.errors.push(format!("Repository {repository} is inactive"));
                return self.finish(result);
            }
            Err(StoreError::RepositoryNotFound { .. }) => {
                result
                    .errors
                    .push(format!("Repository {repository} is not registered"));
                return self.finish(result);
            }
            Err(err) => {
                result
                    .errors
                    .push(format!("Could not load repository {repository}: {err}"));
                return self.finish(result);
            }
        };

        result.phase = UpdatePhase::Pulling;
        tracing::info!(repository = %repository, phase = ?result.phase, "processing update");
        let report = self.sync.sync(&mut record).await;
        result.pull_success = report.success;
        result.pull_message = report.message.clone();
        result.synthetic = report.synthetic;
        result.failure_category = report.category();
        if let Some(err) = report.persist_error {
            result
                .errors
                .push(format!("Could not record sync outcome for {repository}: {err}"));
        }

        if !report.success {
            result.phase = UpdatePhase::PullFailed;
            result.errors.push(format!(
                "Failed to pull repository {repository}: {}",
                report.message
            ));
            return self.finish(result);
        }

        result.phase = UpdatePhase::Restarting;
        tracing::info!(repository = %repository, phase = ?result.phase, "restarting dependents");
        let restart = self.restart.restart_for_repository(&record.name.0).await;
        result.backend = restart.backend;
        result.restart_messages = restart.messages;
        result.container_results = restart.results;
        if let Some(err) = restart.error {
            result
                .errors
                .push(format!("Could not restart containers for {repository}: {err}"));
        }

        result.phase = UpdatePhase::Done;
        self.finish(result)
    }

    /// Every active repository, one at a time, paced by the scheduler.
    pub async fn sync_all(&self) -> Result<Vec<SyncResult>, StoreError> {
        let repositories = store::list_repositories_at(&self.home)?;
        let mut pacer = Pacer::new(self.pause);
        let mut results = Vec::new();
        for repo in repositories.into_iter().filter(|r| r.active) {
            pacer.ready().await;
            results.push(self.process_update(&repo.name).await);
        }
        tracing::info!(
            count = results.len(),
            failed = results.iter().filter(|r| !r.success()).count(),
            "sync-all complete"
        );
        Ok(results)
    }

    /// Reconcile the container mirror with the runtime.
    pub async fn discover_containers(&self) -> Result<DiscoveryReport, RuntimeError> {
        self.restart.discover().await
    }

    fn finish(&self, result: SyncResult) -> SyncResult {
        let outcome = match (result.success(), result.synthetic) {
            (true, true) => AuditOutcome::SyntheticSuccess,
            (true, false) => AuditOutcome::Success,
            (false, _) => AuditOutcome::Failure,
        };
        if result.success() {
            tracing::info!(
                repository = %result.repository,
                restarted = result.restarted_count(),
                failed = result.failed_count(),
                "update processed"
            );
        } else {
            tracing::warn!(
                repository = %result.repository,
                phase = ?result.phase,
                errors = ?result.errors,
                "update failed"
            );
        }

        let entry = SyncAuditEntry::new(
            AuditOperation::Update,
            result.repository.clone(),
            outcome,
            AuditDetail::Update {
                pull_success: result.pull_success,
                synthetic: result.synthetic,
                restarted: result.restarted_count(),
                failed: result.failed_count(),
                errors: result.errors.clone(),
            },
        );
        if let Err(err) = store::append_audit_at(&self.home, &entry) {
            tracing::warn!(repository = %result.repository, error = %err, "could not append audit entry");
        }
        result
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true, flavor = "current_thread")]
    async fn pacer_spaces_slots_by_interval() {
        let mut pacer = Pacer::new(Duration::from_millis(500));
        let started = Instant::now();
        pacer.ready().await;
        assert_eq!(started.elapsed(), Duration::ZERO);
        pacer.ready().await;
        pacer.ready().await;
        assert!(started.elapsed() >= Duration::from_millis(1000));
    }

    #[tokio::test]
    async fn repo_lock_serialises_same_repository() {
        let locks = RepoLocks::default();
        let first = locks.acquire("demo-api").await;
        let other = tokio::time::timeout(Duration::from_millis(50), locks.acquire("billing")).await;
        assert!(other.is_ok(), "different repositories do not contend");

        let same = tokio::time::timeout(Duration::from_millis(50), locks.acquire("demo-api")).await;
        assert!(same.is_err(), "same repository waits for the holder");
        drop(first);
        let again = tokio::time::timeout(Duration::from_millis(50), locks.acquire("demo-api")).await;
        assert!(again.is_ok());
    }

    #[tokio::test]
    async fn repo_lock_entries_are_released_after_use() {
        let locks = RepoLocks::default();
        for name in ["ghost-1", "ghost-2", "ghost-3"] {
            drop(locks.acquire(name).await);
        }
        assert_eq!(locks.tracked(), 0);

        let held = locks.acquire("demo-api").await;
        let waiter = {
            let locks = locks.clone();
            tokio::spawn(async move { drop(locks.acquire("demo-api").await) })
        };
        tokio::task::yield_now().await;
        drop(held);
        waiter.await.unwrap();
        assert_eq!(locks.tracked(), 0);
    }
}
