//! Store error-message, atomic-write and layout integration tests.
//! Layout: ~/.gitdock/{repositories,containers,keys}/*.yaml + settings.yaml + audit.jsonl

use assert_fs::prelude::*;
use chrono::Utc;
use gitdock_core::{
    settings, store,
    types::{ContainerId, ContainerRecord, RepoName, RepositoryRecord, SyncOutcome},
    StoreError,
};
use predicates::prelude::predicate;
use std::fs;

fn demo() -> RepoName {
    RepoName::from("demo-api")
}

// ---------------------------------------------------------------------------
// 1. Load error messages
// ---------------------------------------------------------------------------

#[test]
fn load_missing_repository_names_it() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let err = store::load_repository_at(home.path(), &demo()).unwrap_err();
    assert!(matches!(err, StoreError::RepositoryNotFound { .. }), "got: {err}");
    assert!(err.to_string().contains("demo-api"));
}

#[test]
fn load_corrupt_yaml_returns_parse_error_with_path() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let dir = home.path().join(".gitdock").join("repositories");
    fs::create_dir_all(&dir).expect("mkdir");
    fs::write(dir.join("demo-api.yaml"), b": : corrupt : yaml : !!!\n  - broken: [unclosed")
        .expect("write");

    let err = store::load_repository_at(home.path(), &demo()).unwrap_err();
    assert!(matches!(err, StoreError::Parse { .. }), "got: {err}");
    assert!(err.to_string().contains("demo-api.yaml"));
}

#[test]
fn list_ignores_non_yaml_files() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    home.child(".gitdock/repositories/README.txt")
        .write_str("not a record")
        .expect("write");
    let mut record = RepositoryRecord::new("demo-api", "git@github.com:o/demo-api.git", "main");
    store::save_repository_at(home.path(), &mut record).expect("save");

    let listed = store::list_repositories_at(home.path()).expect("list");
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].name, demo());
}

// ---------------------------------------------------------------------------
// 2. Layout and persistence
// ---------------------------------------------------------------------------

#[test]
fn save_creates_layout_under_home() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let mut record = RepositoryRecord::new("demo-api", "https://github.com/o/demo-api.git", "main");
    store::save_repository_at(home.path(), &mut record).expect("save");

    home.child(".gitdock/repositories/demo-api.yaml")
        .assert(predicate::path::exists());
    home.child(".gitdock/repositories/demo-api.yaml")
        .assert(predicate::str::contains("https://github.com/o/demo-api.git"));
}

#[test]
fn last_sync_outcome_survives_reload() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let mut record = RepositoryRecord::new("demo-api", "https://github.com/o/demo-api.git", "main");
    record.last_sync = Some(SyncOutcome {
        success: true,
        at: Utc::now(),
        synthetic: true,
        category: None,
        error: None,
    });
    store::save_repository_at(home.path(), &mut record).expect("save");

    let loaded = store::load_repository_at(home.path(), &demo()).expect("load");
    let outcome = loaded.last_sync.expect("outcome");
    assert!(outcome.success);
    assert!(outcome.synthetic);
}

#[test]
fn remove_repository_keeps_other_records() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    for name in ["alpha", "beta"] {
        store::add_repository_at(
            home.path(),
            RepositoryRecord::new(name, format!("https://example.com/o/{name}.git"), "main"),
        )
        .expect("add");
    }
    store::remove_repository_at(home.path(), &RepoName::from("alpha")).expect("remove");

    let names: Vec<_> = store::list_repositories_at(home.path())
        .expect("list")
        .into_iter()
        .map(|r| r.name.0)
        .collect();
    assert_eq!(names, vec!["beta"]);
}

#[test]
fn container_ids_with_slashes_stay_inside_mirror_dir() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    let record = ContainerRecord {
        id: ContainerId::from("../escape/me"),
        name: "web".into(),
        image: "nginx".into(),
        status: "running".into(),
        dependency_label: Some("demo-api".into()),
        last_restart: None,
        updated_at: Utc::now(),
    };
    store::save_container_at(home.path(), &record).expect("save");
    let path = store::container_path_at(home.path(), &record.id);
    assert!(path.starts_with(home.path().join(".gitdock").join("containers")));
    assert_eq!(
        store::load_container_at(home.path(), &record.id).expect("load"),
        Some(record)
    );
}

#[test]
fn settings_file_is_plain_yaml_map() {
    let home = assert_fs::TempDir::new().expect("tempdir");
    settings::set_setting_at(home.path(), settings::MAIN_PATH, "/srv/repos").expect("set");
    home.child(".gitdock/settings.yaml")
        .assert(predicate::str::contains("main_path: /srv/repos"));
}
