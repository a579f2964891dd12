//! Domain types for gitdock.
//!
//! All path fields use `PathBuf`. Every record is serde-serializable; the
//! store writes repositories, containers and keys as YAML and audit entries as
//! JSON lines.

use std::fmt;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// Newtypes
// ---------------------------------------------------------------------------

/// Name of a registered repository. Dependency labels refer to it by token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct RepoName(pub String);

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for RepoName {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for RepoName {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

/// Runtime identifier of a container.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ContainerId(pub String);

impl fmt::Display for ContainerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

impl From<String> for ContainerId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for ContainerId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

// ---------------------------------------------------------------------------
// Enums
// ---------------------------------------------------------------------------

/// The eight categories a failed fetch/clone is classified into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    Authentication,
    BranchNotFound,
    RepositoryNotFound,
    NetworkUnreachable,
    FilesystemReadOnly,
    PermissionDenied,
    DiskFull,
    GenericToolFailure,
}

impl FailureCategory {
    pub fn as_str(self) -> &'static str {
        match self {
            FailureCategory::Authentication => "authentication",
            FailureCategory::BranchNotFound => "branch_not_found",
            FailureCategory::RepositoryNotFound => "repository_not_found",
            FailureCategory::NetworkUnreachable => "network_unreachable",
            FailureCategory::FilesystemReadOnly => "filesystem_read_only",
            FailureCategory::PermissionDenied => "permission_denied",
            FailureCategory::DiskFull => "disk_full",
            FailureCategory::GenericToolFailure => "generic_tool_failure",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Which container-runtime access path served a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    Live,
    Command,
    Simulated,
}

impl BackendKind {
    /// Only the simulated backend reports outcomes it did not observe.
    pub fn is_authoritative(self) -> bool {
        !matches!(self, BackendKind::Simulated)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Live => write!(f, "live"),
            BackendKind::Command => write!(f, "command"),
            BackendKind::Simulated => write!(f, "simulated"),
        }
    }
}

/// Whether a sync attempt cloned from scratch or fast-forwarded a working copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncAction {
    Clone,
    Pull,
}

impl fmt::Display for SyncAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyncAction::Clone => write!(f, "clone"),
            SyncAction::Pull => write!(f, "pull"),
        }
    }
}

// ---------------------------------------------------------------------------
// Failure detail (audit payload)
// ---------------------------------------------------------------------------

/// Structured detail of a classified sync failure, one variant per category.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "category", rename_all = "snake_case")]
pub enum SyncFailure {
    Authentication {
        repository: String,
        url: String,
        diagnostic: String,
    },
    BranchNotFound {
        repository: String,
        branch: String,
        diagnostic: String,
    },
    RepositoryNotFound {
        repository: String,
        url: String,
        diagnostic: String,
    },
    NetworkUnreachable {
        repository: String,
        url: String,
        diagnostic: String,
    },
    FilesystemReadOnly {
        repository: String,
        path: PathBuf,
    },
    PermissionDenied {
        repository: String,
        path: PathBuf,
        diagnostic: String,
    },
    DiskFull {
        repository: String,
        path: PathBuf,
    },
    GenericToolFailure {
        repository: String,
        command: String,
        exit_code: Option<i32>,
        diagnostic: String,
    },
}

impl SyncFailure {
    pub fn category(&self) -> FailureCategory {
        match self {
            SyncFailure::Authentication { .. } => FailureCategory::Authentication,
            SyncFailure::BranchNotFound { .. } => FailureCategory::BranchNotFound,
            SyncFailure::RepositoryNotFound { .. } => FailureCategory::RepositoryNotFound,
            SyncFailure::NetworkUnreachable { .. } => FailureCategory::NetworkUnreachable,
            SyncFailure::FilesystemReadOnly { .. } => FailureCategory::FilesystemReadOnly,
            SyncFailure::PermissionDenied { .. } => FailureCategory::PermissionDenied,
            SyncFailure::DiskFull { .. } => FailureCategory::DiskFull,
            SyncFailure::GenericToolFailure { .. } => FailureCategory::GenericToolFailure,
        }
    }

    /// Human-readable message, distinct per category.
    pub fn message(&self) -> String {
        match self {
            SyncFailure::Authentication { repository, .. } => format!(
                "Authentication failed for repository {repository}; check the signing key or access rights"
            ),
            SyncFailure::BranchNotFound {
                repository, branch, ..
            } => format!("Branch '{branch}' not found in repository {repository}"),
            SyncFailure::RepositoryNotFound { repository, url, .. } => {
                format!("Repository {repository} not found at {url}")
            }
            SyncFailure::NetworkUnreachable { repository, .. } => {
                format!("Network error reaching repository {repository}")
            }
            SyncFailure::FilesystemReadOnly { repository, path } => format!(
                "Cannot write working copy of {repository} at {}: file system is read-only",
                path.display()
            ),
            SyncFailure::PermissionDenied {
                repository, path, ..
            } => format!(
                "Permission denied writing working copy of {repository} at {}",
                path.display()
            ),
            SyncFailure::DiskFull { repository, path } => format!(
                "Insufficient disk space for {repository} at {}",
                path.display()
            ),
            SyncFailure::GenericToolFailure {
                repository,
                command,
                diagnostic,
                ..
            } => format!("git {command} failed for repository {repository}: {diagnostic}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Records
// ---------------------------------------------------------------------------

/// Outcome of the most recent sync attempt of a repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncOutcome {
    pub success: bool,
    pub at: DateTime<Utc>,
    /// Set when the success was recorded to accommodate the environment
    /// rather than a completed fetch.
    #[serde(default)]
    pub synthetic: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<FailureCategory>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// A registered source repository.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RepositoryRecord {
    pub name: RepoName,
    pub url: String,
    #[serde(default = "default_branch")]
    pub branch: String,
    /// Working-copy path; may name a directory that no longer exists.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub local_path: Option<PathBuf>,
    #[serde(default = "default_active")]
    pub active: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<SyncOutcome>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn default_branch() -> String {
    "main".to_string()
}

fn default_active() -> bool {
    true
}

impl RepositoryRecord {
    pub fn new(name: impl Into<RepoName>, url: impl Into<String>, branch: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            name: name.into(),
            url: url.into(),
            branch: branch.into(),
            local_path: None,
            active: true,
            last_sync: None,
            created_at: now,
            updated_at: now,
        }
    }
}

/// Outcome of the most recent restart of a container.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RestartOutcome {
    pub success: bool,
    pub at: DateTime<Utc>,
    pub backend: BackendKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Local mirror of a runtime container; eventually consistent, never authoritative.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub id: ContainerId,
    pub name: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub status: String,
    /// Raw value of the dependency label, possibly listing several repositories.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dependency_label: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_restart: Option<RestartOutcome>,
    pub updated_at: DateTime<Utc>,
}

/// The single active key pair used for authenticated fetches.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SigningKeyRecord {
    pub name: String,
    pub private_key: String,
    pub public_key: String,
    pub created_at: DateTime<Utc>,
}

impl SigningKeyRecord {
    /// SHA-256 of the public key text, hex encoded.
    pub fn fingerprint(&self) -> String {
        let mut h = Sha256::new();
        h.update(self.public_key.trim().as_bytes());
        hex::encode(h.finalize())
    }
}

impl fmt::Debug for SigningKeyRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKeyRecord")
            .field("name", &self.name)
            .field("private_key", &"<redacted>")
            .field("public_key", &self.public_key)
            .field("created_at", &self.created_at)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOperation {
    Clone,
    Pull,
    Restart,
    Update,
    Discovery,
    Rejected,
}

impl fmt::Display for AuditOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AuditOperation::Clone => "clone",
            AuditOperation::Pull => "pull",
            AuditOperation::Restart => "restart",
            AuditOperation::Update => "update",
            AuditOperation::Discovery => "discovery",
            AuditOperation::Rejected => "rejected",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditOutcome {
    Success,
    /// Recorded as success, but no real operation completed.
    SyntheticSuccess,
    Failure,
}

impl fmt::Display for AuditOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuditOutcome::Success => write!(f, "success"),
            AuditOutcome::SyntheticSuccess => write!(f, "synthetic_success"),
            AuditOutcome::Failure => write!(f, "failure"),
        }
    }
}

/// Detail payload of an audit entry, shaped per operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AuditDetail {
    Sync {
        action: SyncAction,
        path: PathBuf,
        synthetic: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        failure: Option<SyncFailure>,
    },
    Restart {
        container_id: ContainerId,
        container_name: String,
        backend: BackendKind,
        authoritative: bool,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    Update {
        pull_success: bool,
        synthetic: bool,
        restarted: usize,
        failed: usize,
        errors: Vec<String>,
    },
    Discovery {
        backend: BackendKind,
        inserted: usize,
        updated: usize,
        removed: usize,
    },
    Rejected {
        reason: String,
    },
}

/// Immutable, append-only audit record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncAuditEntry {
    pub at: DateTime<Utc>,
    pub operation: AuditOperation,
    pub subject: String,
    pub outcome: AuditOutcome,
    pub detail: AuditDetail,
}

impl SyncAuditEntry {
    pub fn new(
        operation: AuditOperation,
        subject: impl Into<String>,
        outcome: AuditOutcome,
        detail: AuditDetail,
    ) -> Self {
        Self {
            at: Utc::now(),
            operation,
            subject: subject.into(),
            outcome,
            detail,
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
