//! File-backed persistence for repositories, containers, the signing key and
//! the audit log.
//!
//! # Storage layout
//!
//! ```text
//! ~/.gitdock/
//!   repositories/<name>.yaml   (one record per file, mode 0600)
//!   containers/<id>.yaml       (container mirror, one record per file)
//!   keys/active.yaml           (zero-or-one signing key, mode 0600)
//!   settings.yaml              (see [`crate::settings`])
//!   audit.jsonl                (append-only, one JSON entry per line)
//! ```
//!
//! Every function takes an explicit `home`; callers derive it once with
//! [`default_home`]. Record writes go to a `.tmp` sibling and are renamed into
//! place, so a reader never observes a half-written record.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{io_err, StoreError};
use crate::types::{ContainerId, ContainerRecord, RepoName, RepositoryRecord, SigningKeyRecord, SyncAuditEntry};

// ---------------------------------------------------------------------------
// 1. Path helpers
// ---------------------------------------------------------------------------

/// `<home>/.gitdock`
pub fn root_at(home: &Path) -> PathBuf {
    home.join(".gitdock")
}

/// The user's home directory.
pub fn default_home() -> Result<PathBuf, StoreError> {
    dirs::home_dir().ok_or(StoreError::HomeNotFound)
}

/// `<home>/.gitdock/repositories/<name>.yaml` (pure, no I/O).
pub fn repository_path_at(home: &Path, name: &RepoName) -> PathBuf {
    root_at(home)
        .join("repositories")
        .join(format!("{}.yaml", file_stem(&name.0)))
}

/// `<home>/.gitdock/containers/<id>.yaml` (pure, no I/O).
pub fn container_path_at(home: &Path, id: &ContainerId) -> PathBuf {
    root_at(home)
        .join("containers")
        .join(format!("{}.yaml", file_stem(&id.0)))
}

/// `<home>/.gitdock/keys/active.yaml`
pub fn active_key_path_at(home: &Path) -> PathBuf {
    root_at(home).join("keys").join("active.yaml")
}

/// `<home>/.gitdock/audit.jsonl`
pub fn audit_path_at(home: &Path) -> PathBuf {
    root_at(home).join("audit.jsonl")
}

/// Map an arbitrary name onto a safe single path component.
pub fn file_stem(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect();
    let trimmed = cleaned.trim_matches('.');
    if trimmed.is_empty() {
        "unnamed".to_string()
    } else {
        trimmed.to_string()
    }
}

// ---------------------------------------------------------------------------
// 2. Repositories
// ---------------------------------------------------------------------------

/// Load one repository. Returns [`StoreError::RepositoryNotFound`] if absent.
pub fn load_repository_at(home: &Path, name: &RepoName) -> Result<RepositoryRecord, StoreError> {
    let path = repository_path_at(home, name);
    if !path.exists() {
        return Err(StoreError::RepositoryNotFound {
            name: name.0.clone(),
        });
    }
    // Distinct names can share a file stem; only the exact name is a hit.
    let record: RepositoryRecord = read_yaml(&path)?;
    if record.name != *name {
        return Err(StoreError::RepositoryNotFound {
            name: name.0.clone(),
        });
    }
    Ok(record)
}

/// All registered repositories, sorted by name.
pub fn list_repositories_at(home: &Path) -> Result<Vec<RepositoryRecord>, StoreError> {
    let mut records: Vec<RepositoryRecord> = read_yaml_dir(&root_at(home).join("repositories"))?;
    records.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(records)
}

/// Persist a repository, bumping `updated_at`.
pub fn save_repository_at(home: &Path, record: &mut RepositoryRecord) -> Result<(), StoreError> {
    record.updated_at = Utc::now();
    write_yaml(&repository_path_at(home, &record.name), record)
}

/// Register a new repository. Fails if the name is taken.
pub fn add_repository_at(home: &Path, mut record: RepositoryRecord) -> Result<RepositoryRecord, StoreError> {
    if repository_path_at(home, &record.name).exists() {
        return Err(StoreError::RepositoryExists {
            name: record.name.0.clone(),
        });
    }
    save_repository_at(home, &mut record)?;
    Ok(record)
}

/// Delete a repository record. The working copy on disk is left alone.
pub fn remove_repository_at(home: &Path, name: &RepoName) -> Result<(), StoreError> {
    load_repository_at(home, name)?;
    let path = repository_path_at(home, name);
    std::fs::remove_file(&path).map_err(|e| io_err(&path, e))
}

// ---------------------------------------------------------------------------
// 3. Container mirror
// ---------------------------------------------------------------------------

/// All mirrored containers, sorted by name then id.
pub fn list_containers_at(home: &Path) -> Result<Vec<ContainerRecord>, StoreError> {
    let mut records: Vec<ContainerRecord> = read_yaml_dir(&root_at(home).join("containers"))?;
    records.sort_by(|a, b| a.name.cmp(&b.name).then_with(|| a.id.cmp(&b.id)));
    Ok(records)
}

pub fn load_container_at(home: &Path, id: &ContainerId) -> Result<Option<ContainerRecord>, StoreError> {
    let path = container_path_at(home, id);
    if !path.exists() {
        return Ok(None);
    }
    read_yaml(&path).map(Some)
}

pub fn save_container_at(home: &Path, record: &ContainerRecord) -> Result<(), StoreError> {
    write_yaml(&container_path_at(home, &record.id), record)
}

/// Remove a container from the mirror. Missing records are not an error.
pub fn remove_container_at(home: &Path, id: &ContainerId) -> Result<(), StoreError> {
    let path = container_path_at(home, id);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(io_err(&path, e)),
    }
}

// ---------------------------------------------------------------------------
// 4. Signing key
// ---------------------------------------------------------------------------

/// The active signing key, if one is configured.
pub fn load_active_key_at(home: &Path) -> Result<Option<SigningKeyRecord>, StoreError> {
    let path = active_key_path_at(home);
    if !path.exists() {
        return Ok(None);
    }
    read_yaml(&path).map(Some)
}

/// Replace the active signing key.
pub fn save_active_key_at(home: &Path, key: &SigningKeyRecord) -> Result<(), StoreError> {
    let path = active_key_path_at(home);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        set_dir_permissions(dir)?;
    }
    write_yaml(&path, key)
}

/// Remove the active signing key. Returns whether one existed.
pub fn clear_active_key_at(home: &Path) -> Result<bool, StoreError> {
    let path = active_key_path_at(home);
    match std::fs::remove_file(&path) {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(io_err(&path, e)),
    }
}

// ---------------------------------------------------------------------------
// 5. Audit log
// ---------------------------------------------------------------------------

/// Append one entry to the audit log.
pub fn append_audit_at(home: &Path, entry: &SyncAuditEntry) -> Result<(), StoreError> {
    let path = audit_path_at(home);
    if let Some(dir) = path.parent() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
    }
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');
    let mut file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .map_err(|e| io_err(&path, e))?;
    file.write_all(line.as_bytes()).map_err(|e| io_err(&path, e))
}

/// The most recent `limit` audit entries, newest first.
///
/// Lines that fail to parse are skipped with a warning rather than failing
/// the whole read.
pub fn read_audit_at(home: &Path, limit: usize) -> Result<Vec<SyncAuditEntry>, StoreError> {
    let path = audit_path_at(home);
    if !path.exists() {
        return Ok(vec![]);
    }
    let file = std::fs::File::open(&path).map_err(|e| io_err(&path, e))?;
    let mut entries = Vec::new();
    for (idx, line) in BufReader::new(file).lines().enumerate() {
        let line = line.map_err(|e| io_err(&path, e))?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<SyncAuditEntry>(&line) {
            Ok(entry) => entries.push(entry),
            Err(err) => {
                tracing::warn!(line = idx + 1, error = %err, "skipping malformed audit line");
            }
        }
    }
    entries.reverse();
    entries.truncate(limit);
    Ok(entries)
}

// ---------------------------------------------------------------------------
// Private helpers
// ---------------------------------------------------------------------------

fn read_yaml<T: DeserializeOwned>(path: &Path) -> Result<T, StoreError> {
    let contents = std::fs::read_to_string(path).map_err(|e| io_err(path, e))?;
    serde_yaml::from_str(&contents).map_err(|e| StoreError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}

fn read_yaml_dir<T: DeserializeOwned>(dir: &Path) -> Result<Vec<T>, StoreError> {
    if !dir.exists() {
        return Ok(vec![]);
    }
    let mut entries: Vec<_> = std::fs::read_dir(dir)
        .map_err(|e| io_err(dir, e))?
        .filter_map(|e| e.ok())
        .filter(|e| {
            e.file_name()
                .to_str()
                .map(|n| n.ends_with(".yaml"))
                .unwrap_or(false)
        })
        .collect();
    entries.sort_by_key(|e| e.file_name());

    let mut records = Vec::with_capacity(entries.len());
    for entry in entries {
        records.push(read_yaml(&entry.path())?);
    }
    Ok(records)
}

/// Write flow: serialize → `.yaml.tmp` sibling → `chmod 0600` → `rename`.
fn write_yaml<T: Serialize>(path: &Path, value: &T) -> Result<(), StoreError> {
    let Some(dir) = path.parent() else {
        return Err(io_err(path, std::io::Error::other("record path has no parent")));
    };
    if !dir.exists() {
        std::fs::create_dir_all(dir).map_err(|e| io_err(dir, e))?;
        set_dir_permissions(dir)?;
    }
    let yaml = serde_yaml::to_string(value)?;
    let tmp = path.with_extension("yaml.tmp");
    std::fs::write(&tmp, yaml).map_err(|e| io_err(&tmp, e))?;
    set_file_permissions(&tmp)?;
    if let Err(e) = std::fs::rename(&tmp, path) {
        let _ = std::fs::remove_file(&tmp);
        return Err(io_err(path, e));
    }
    Ok(())
}

#[cfg(unix)]
fn set_dir_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o700)).map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_dir_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

#[cfg(unix)]
fn set_file_permissions(path: &Path) -> Result<(), StoreError> {
    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600)).map_err(|e| io_err(path, e))
}
#[cfg(not(unix))]
fn set_file_permissions(_path: &Path) -> Result<(), StoreError> {
    Ok(())
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AuditDetail, AuditOperation, AuditOutcome};
    use tempfile::TempDir;

    fn make_home() -> TempDir {
        TempDir::new().expect("tempdir")
    }

    fn container(id: &str, name: &str, label: Option<&str>) -> ContainerRecord {
        ContainerRecord {
            id: ContainerId::from(id),
            name: name.to_string(),
            image: "nginx:alpine".to_string(),
            status: "running".to_string(),
            dependency_label: label.map(str::to_string),
            last_restart: None,
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn repository_path_is_correct() {
        let home = make_home();
        let path = repository_path_at(home.path(), &RepoName::from("demo-api"));
        assert!(path.ends_with(".gitdock/repositories/demo-api.yaml"));
    }

    #[test]
    fn file_stem_replaces_separators() {
        assert_eq!(file_stem("owner/repo"), "owner_repo");
        assert_eq!(file_stem(".."), "unnamed");
        assert_eq!(file_stem("web.v2"), "web.v2");
    }

    #[test]
    fn add_then_load_repository() {
        let home = make_home();
        let added = add_repository_at(
            home.path(),
            RepositoryRecord::new("demo-api", "https://github.com/o/demo-api.git", "main"),
        )
        .expect("add");
        let loaded = load_repository_at(home.path(), &added.name).expect("load");
        assert_eq!(loaded.url, added.url);
        assert_eq!(loaded.branch, "main");
    }

    #[test]
    fn add_duplicate_repository_fails() {
        let home = make_home();
        let record = RepositoryRecord::new("demo-api", "https://github.com/o/demo-api.git", "main");
        add_repository_at(home.path(), record.clone()).expect("first add");
        let err = add_repository_at(home.path(), record).unwrap_err();
        assert!(matches!(err, StoreError::RepositoryExists { .. }));
    }

    #[test]
    fn lookup_requires_exact_name_when_stems_collide() {
        let home = make_home();
        add_repository_at(
            home.path(),
            RepositoryRecord::new("demo_api", "https://github.com/o/demo_api.git", "main"),
        )
        .expect("add");

        for alias in ["demo api", "demo/api"] {
            let err = load_repository_at(home.path(), &RepoName::from(alias)).unwrap_err();
            assert!(matches!(err, StoreError::RepositoryNotFound { .. }), "{alias}");
            let err = remove_repository_at(home.path(), &RepoName::from(alias)).unwrap_err();
            assert!(matches!(err, StoreError::RepositoryNotFound { .. }), "{alias}");
        }
        assert!(load_repository_at(home.path(), &RepoName::from("demo_api")).is_ok());
    }

    #[test]
    fn save_leaves_no_tmp_behind() {
        let home = make_home();
        let mut record = RepositoryRecord::new("demo-api", "https://github.com/o/demo-api.git", "main");
        save_repository_at(home.path(), &mut record).expect("save");
        let tmp = repository_path_at(home.path(), &record.name).with_extension("yaml.tmp");
        assert!(!tmp.exists(), ".tmp must be gone after successful save");
    }

    #[test]
    fn load_missing_repository_returns_not_found() {
        let home = make_home();
        let err = load_repository_at(home.path(), &RepoName::from("nope")).unwrap_err();
        assert!(matches!(err, StoreError::RepositoryNotFound { .. }));
    }

    #[test]
    fn container_mirror_save_list_remove() {
        let home = make_home();
        save_container_at(home.path(), &container("b2", "worker", Some("demo-api"))).expect("save");
        save_container_at(home.path(), &container("a1", "api", None)).expect("save");

        let listed = list_containers_at(home.path()).expect("list");
        let names: Vec<_> = listed.iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["api", "worker"]);

        remove_container_at(home.path(), &ContainerId::from("a1")).expect("remove");
        remove_container_at(home.path(), &ContainerId::from("a1")).expect("remove twice is fine");
        assert_eq!(list_containers_at(home.path()).expect("list").len(), 1);
    }

    #[test]
    fn active_key_roundtrip_and_clear() {
        let home = make_home();
        assert!(load_active_key_at(home.path()).expect("load").is_none());
        let key = SigningKeyRecord {
            name: "deploy".into(),
            private_key: "PRIVATE".into(),
            public_key: "ssh-ed25519 AAAA".into(),
            created_at: Utc::now(),
        };
        save_active_key_at(home.path(), &key).expect("save");
        assert_eq!(load_active_key_at(home.path()).expect("load"), Some(key));
        assert!(clear_active_key_at(home.path()).expect("clear"));
        assert!(!clear_active_key_at(home.path()).expect("clear again"));
    }

    #[test]
    #[cfg(unix)]
    fn active_key_file_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;
        let home = make_home();
        let key = SigningKeyRecord {
            name: "deploy".into(),
            private_key: "PRIVATE".into(),
            public_key: "ssh-ed25519 AAAA".into(),
            created_at: Utc::now(),
        };
        save_active_key_at(home.path(), &key).expect("save");
        let mode = std::fs::metadata(active_key_path_at(home.path()))
            .unwrap()
            .permissions()
            .mode()
            & 0o777;
        assert_eq!(mode, 0o600);
    }

    #[test]
    fn audit_read_returns_newest_first_and_skips_garbage() {
        let home = make_home();
        for subject in ["first", "second", "third"] {
            let entry = SyncAuditEntry::new(
                AuditOperation::Rejected,
                subject,
                AuditOutcome::Failure,
                AuditDetail::Rejected {
                    reason: "test".into(),
                },
            );
            append_audit_at(home.path(), &entry).expect("append");
        }
        let mut file = OpenOptions::new()
            .append(true)
            .open(audit_path_at(home.path()))
            .unwrap();
        file.write_all(b"not json\n").unwrap();

        let entries = read_audit_at(home.path(), 2).expect("read");
        let subjects: Vec<_> = entries.iter().map(|e| e.subject.as_str()).collect();
        assert_eq!(subjects, vec!["third", "second"]);
    }
}
