//! ContainerRestartEngine integration tests against an in-test backend and
//! the simulated backend over a temp-home mirror.

use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use chrono::Utc;
use gitdock_core::store;
use gitdock_core::types::{AuditOperation, AuditOutcome, BackendKind, ContainerId, ContainerRecord};
use gitdock_runtime::simulated::SimulatedBackend;
use gitdock_runtime::{
    ContainerRestartEngine, LabelFilter, RuntimeBackend, RuntimeChain, RuntimeContainer,
    RuntimeError, DEPENDENCY_LABEL,
};
use tempfile::TempDir;

// ---------------------------------------------------------------------------
// Fake backend
// ---------------------------------------------------------------------------

struct FakeBackend {
    kind: BackendKind,
    reachable: bool,
    containers: Mutex<Vec<RuntimeContainer>>,
    failing: HashSet<String>,
    restarted: Mutex<Vec<ContainerId>>,
}

impl FakeBackend {
    fn new(containers: Vec<RuntimeContainer>) -> Self {
        Self {
            kind: BackendKind::Live,
            reachable: true,
            containers: Mutex::new(containers),
            failing: HashSet::new(),
            restarted: Mutex::new(Vec::new()),
        }
    }

    fn unreachable() -> Self {
        Self {
            reachable: false,
            ..Self::new(vec![])
        }
    }

    fn failing_on(mut self, id: &str) -> Self {
        self.failing.insert(id.to_string());
        self
    }
}

#[async_trait]
impl RuntimeBackend for FakeBackend {
    fn kind(&self) -> BackendKind {
        self.kind
    }

    async fn available(&self) -> bool {
        self.reachable
    }

    async fn list(&self, filter: &LabelFilter) -> Result<Vec<RuntimeContainer>, RuntimeError> {
        Ok(self
            .containers
            .lock()
            .unwrap()
            .iter()
            .filter(|c| filter.matches(c))
            .cloned()
            .collect())
    }

    async fn restart(&self, id: &ContainerId) -> Result<(), RuntimeError> {
        if self.failing.contains(&id.0) {
            return Err(RuntimeError::NotFound { id: id.0.clone() });
        }
        self.restarted.lock().unwrap().push(id.clone());
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn live(id: &str, name: &str, status: &str, label: Option<&str>) -> RuntimeContainer {
    let mut labels = BTreeMap::new();
    if let Some(label) = label {
        labels.insert(DEPENDENCY_LABEL.to_string(), label.to_string());
    }
    RuntimeContainer {
        id: ContainerId::from(id),
        name: name.to_string(),
        image: "app:latest".to_string(),
        status: status.to_string(),
        labels,
    }
}

fn mirror(home: &Path, id: &str, name: &str, label: Option<&str>) {
    store::save_container_at(
        home,
        &ContainerRecord {
            id: ContainerId::from(id),
            name: name.to_string(),
            image: "app:latest".to_string(),
            status: "running".to_string(),
            dependency_label: label.map(str::to_string),
            last_restart: None,
            updated_at: Utc::now(),
        },
    )
    .expect("seed mirror");
}

fn engine_with(home: &Path, backends: Vec<Arc<dyn RuntimeBackend>>) -> ContainerRestartEngine {
    ContainerRestartEngine::new(home, RuntimeChain::new(backends))
}

// ---------------------------------------------------------------------------
// 1. Restart by repository
// ---------------------------------------------------------------------------

#[tokio::test]
async fn no_matching_container_is_informational() {
    let home = TempDir::new().unwrap();
    let fake = Arc::new(FakeBackend::new(vec![live("a", "web", "running", Some("other"))]));
    let engine = engine_with(home.path(), vec![fake]);

    let report = engine.restart_for_repository("demo-api").await;

    assert_eq!(report.success_count, 0);
    assert_eq!(report.messages.len(), 1);
    assert!(report.results.is_empty());
    assert!(report.error.is_none());
}

#[tokio::test]
async fn one_failure_does_not_stop_siblings() {
    let home = TempDir::new().unwrap();
    let fake = Arc::new(
        FakeBackend::new(vec![
            live("a", "web", "running", Some("demo-api")),
            live("b", "worker", "exited", Some("demo-api, billing")),
            live("c", "cron", "paused", Some("demo-api")),
            live("d", "docs", "running", Some("demo-api-docs")),
        ])
        .failing_on("a"),
    );
    let engine = engine_with(home.path(), vec![fake.clone()]);

    let report = engine.restart_for_repository("demo-api").await;

    assert_eq!(report.backend, Some(BackendKind::Live));
    assert_eq!(report.results.len(), 3);
    assert_eq!(report.messages.len(), 3);
    assert_eq!(report.success_count, 1);
    assert_eq!(report.failure_count(), 1);
    assert!(report.results.iter().any(|r| r.skipped && r.name == "cron"));
    assert_eq!(*fake.restarted.lock().unwrap(), vec![ContainerId::from("b")]);

    let worker = store::load_container_at(home.path(), &ContainerId::from("b"))
        .unwrap()
        .expect("mirrored");
    assert!(worker.last_restart.expect("restart recorded").success);
    let web = store::load_container_at(home.path(), &ContainerId::from("a"))
        .unwrap()
        .expect("mirrored");
    assert!(!web.last_restart.expect("restart recorded").success);
}

#[tokio::test]
async fn restarts_are_audited_per_container() {
    let home = TempDir::new().unwrap();
    let fake = Arc::new(FakeBackend::new(vec![
        live("a", "web", "running", Some("demo-api")),
        live("b", "worker", "running", Some("demo-api")),
    ]));
    let engine = engine_with(home.path(), vec![fake]);

    engine.restart_for_repository("demo-api").await;

    let audit = store::read_audit_at(home.path(), 10).unwrap();
    let restarts: Vec<_> = audit
        .iter()
        .filter(|e| e.operation == AuditOperation::Restart)
        .collect();
    assert_eq!(restarts.len(), 2);
    assert!(restarts.iter().all(|e| e.outcome == AuditOutcome::Success));
}

#[tokio::test]
async fn unreachable_runtime_falls_back_to_simulated_mirror() {
    let home = TempDir::new().unwrap();
    mirror(home.path(), "a", "web", Some("demo-api"));
    mirror(home.path(), "b", "worker", Some("billing , demo-api"));
    mirror(home.path(), "c", "docs", Some("demo-api-docs"));
    mirror(home.path(), "d", "db", None);
    let engine = engine_with(
        home.path(),
        vec![
            Arc::new(FakeBackend::unreachable()),
            Arc::new(SimulatedBackend::new(home.path())),
        ],
    );

    let report = engine.restart_for_repository("demo-api").await;

    assert_eq!(report.backend, Some(BackendKind::Simulated));
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.success_count, 2);
    assert!(report.results.iter().all(|r| !r.authoritative));

    let audit = store::read_audit_at(home.path(), 10).unwrap();
    assert!(audit
        .iter()
        .filter(|e| e.operation == AuditOperation::Restart)
        .all(|e| e.outcome == AuditOutcome::SyntheticSuccess));
}

#[tokio::test]
async fn empty_repository_name_matches_nothing() {
    let home = TempDir::new().unwrap();
    let fake = Arc::new(FakeBackend::new(vec![live("a", "web", "running", Some("demo-api,"))]));
    let engine = engine_with(home.path(), vec![fake]);

    let report = engine.restart_for_repository("").await;

    assert_eq!(report.success_count, 0);
    assert!(report.results.is_empty());
}

// ---------------------------------------------------------------------------
// 2. Discovery
// ---------------------------------------------------------------------------

#[tokio::test]
async fn discovery_round_trip_is_stable() {
    let home = TempDir::new().unwrap();
    let fake = Arc::new(FakeBackend::new(vec![
        live("a", "web", "running", Some("demo-api")),
        live("b", "db", "running", None),
    ]));
    let engine = engine_with(home.path(), vec![fake]);

    let first = engine.discover().await.unwrap();
    assert_eq!(first.inserted, 2);

    let second = engine.discover().await.unwrap();
    assert_eq!((second.inserted, second.updated, second.removed), (0, 0, 0));
    assert_eq!(first.containers, second.containers);
}

#[tokio::test]
async fn discovery_removes_vanished_and_keeps_restart_history() {
    let home = TempDir::new().unwrap();
    mirror(home.path(), "gone", "old", Some("demo-api"));
    let fake = Arc::new(FakeBackend::new(vec![live("a", "web", "running", Some("demo-api"))]));
    let engine = engine_with(home.path(), vec![fake.clone()]);

    engine.restart_for_repository("demo-api").await;
    fake.containers.lock().unwrap()[0].status = "exited".into();
    let report = engine.discover().await.unwrap();

    assert_eq!(report.removed, 1);
    assert_eq!(report.updated, 1);
    assert_eq!(report.containers.len(), 1);
    assert_eq!(report.containers[0].status, "exited");
    assert!(report.containers[0].last_restart.is_some());
}

#[tokio::test]
async fn simulated_discovery_leaves_mirror_untouched() {
    let home = TempDir::new().unwrap();
    mirror(home.path(), "a", "web", Some("demo-api"));
    let engine = engine_with(
        home.path(),
        vec![
            Arc::new(FakeBackend::unreachable()),
            Arc::new(SimulatedBackend::new(home.path())),
        ],
    );

    let report = engine.discover().await.unwrap();

    assert_eq!(report.backend, BackendKind::Simulated);
    assert_eq!(report.containers.len(), 1);
    assert_eq!(report.removed, 0);
}
