//! Clone or fast-forward one repository's working copy.
//!
//! ## `sync`: steps
//!
//! 1. Resolve the writable root and derive `<root>/<name-from-url>`.
//! 2. Provision the signing key for SSH URLs.
//! 3. Clone when no working copy exists; otherwise fetch, switch branch if
//!    needed, and fast-forward to `origin/<branch>`.
//! 4. Classify any failure. A read-only filesystem is recorded as a
//!    synthetic success.
//! 5. Persist the record's outcome and append a clone/pull audit entry.
//!
//! Failures of git are values in [`SyncReport`], never errors.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use gitdock_core::settings::{self, Settings};
use gitdock_core::store;
use gitdock_core::types::{
    AuditDetail, AuditOperation, AuditOutcome, FailureCategory, RepositoryRecord, SyncAction,
    SyncAuditEntry, SyncFailure, SyncOutcome,
};

use crate::classify::{classify, FailureContext};
use crate::credentials::{CredentialProvisioner, ProvisionedKey};
use crate::error::SyncError;
use crate::git::GitRunner;
use crate::paths::PathResolver;
use crate::url::{extract_repo_name, is_ssh_url};

// ---------------------------------------------------------------------------
// Report
// ---------------------------------------------------------------------------

/// Outcome of one `sync` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// True for real success and for synthetic success.
    pub success: bool,
    pub message: String,
    pub action: SyncAction,
    pub synthetic: bool,
    pub failure: Option<SyncFailure>,
    pub path: PathBuf,
    /// Set when the outcome could not be written to the store.
    pub persist_error: Option<String>,
}

impl SyncReport {
    pub fn category(&self) -> Option<FailureCategory> {
        self.failure.as_ref().map(SyncFailure::category)
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

pub struct RepositorySyncEngine {
    home: PathBuf,
    resolver: Arc<PathResolver>,
    credentials: CredentialProvisioner,
    git: GitRunner,
}

impl RepositorySyncEngine {
    pub fn new(home: impl Into<PathBuf>, resolver: Arc<PathResolver>, git: GitRunner) -> Self {
        let home = home.into();
        Self {
            credentials: CredentialProvisioner::new(&home),
            home,
            resolver,
            git,
        }
    }

    /// Engine configured from `settings.yaml` with the standard resolver.
    pub fn from_settings(home: impl Into<PathBuf>, settings: &Settings) -> Self {
        let home = home.into();
        let resolver = Arc::new(PathResolver::new(&home));
        Self::new(home, resolver, GitRunner::from_settings(settings))
    }

    pub fn resolver(&self) -> &Arc<PathResolver> {
        &self.resolver
    }

    /// Working-copy path `repo` would be synced into.
    pub fn working_copy_path(&self, repo: &RepositoryRecord) -> PathBuf {
        self.resolver.resolve().path.join(extract_repo_name(&repo.url))
    }

    /// Clone or pull `repo`, then record the outcome on it and in the audit log.
    pub async fn sync(&self, repo: &mut RepositoryRecord) -> SyncReport {
        let path = self.working_copy_path(repo);
        let action = if path.join(".git").exists() {
            SyncAction::Pull
        } else {
            SyncAction::Clone
        };
        let ctx = FailureContext {
            repository: &repo.name.0,
            url: &repo.url,
            branch: &repo.branch,
            path: path.clone(),
        };

        tracing::info!(repository = %repo.name, action = %action, path = %path.display(), "syncing repository");
        let key = self.credentials.provision(&repo.url);
        if key.is_none() && is_ssh_url(&repo.url) {
            tracing::debug!(repository = %repo.name, "SSH URL without provisioned key");
        }

        let attempt = match action {
            SyncAction::Clone => self.clone_into(repo, &path, key.as_ref()).await,
            SyncAction::Pull => self.pull(repo, &path, key.as_ref()).await,
        };
        drop(key);

        let failure = attempt
            .err()
            .map(|(command, err)| classify(&ctx, command, err.exit_code(), &err.diagnostic()));
        let mut report = self.record(repo, action, path, failure);
        if let Err(err) = store::save_repository_at(&self.home, repo) {
            tracing::warn!(repository = %repo.name, error = %err, "could not persist sync outcome");
            report.persist_error = Some(err.to_string());
        }
        self.audit(repo, &report);
        report
    }

    /// `git ls-remote --heads <url>` with provisioned credentials.
    pub async fn verify_remote(&self, url: &str) -> Result<(), SyncFailure> {
        let key = self.credentials.provision(url);
        let name = extract_repo_name(url);
        match self
            .git
            .run(&["ls-remote", "--heads", url], None, key.as_ref())
            .await
        {
            Ok(_) => Ok(()),
            Err(err) => {
                let ctx = FailureContext {
                    repository: &name,
                    url,
                    branch: "",
                    path: PathBuf::new(),
                };
                Err(classify(&ctx, "ls-remote", err.exit_code(), &err.diagnostic()))
            }
        }
    }

    // -----------------------------------------------------------------------
    // git steps; the error carries the git sub-command that failed
    // -----------------------------------------------------------------------

    async fn clone_into(
        &self,
        repo: &RepositoryRecord,
        path: &Path,
        key: Option<&ProvisionedKey>,
    ) -> Result<(), (&'static str, SyncError)> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| ("clone", crate::error::io_err(parent, e)))?;
        }
        if path.exists() {
            tracing::info!(repository = %repo.name, path = %path.display(), "removing non-repository directory before clone");
            std::fs::remove_dir_all(path).map_err(|e| ("clone", crate::error::io_err(path, e)))?;
        }
        let target = path.display().to_string();
        self.git
            .run(
                &["clone", "--branch", &repo.branch, &repo.url, &target],
                None,
                key,
            )
            .await
            .map(|_| ())
            .map_err(|e| ("clone", e))
    }

    async fn pull(
        &self,
        repo: &RepositoryRecord,
        path: &Path,
        key: Option<&ProvisionedKey>,
    ) -> Result<(), (&'static str, SyncError)> {
        let cwd = Some(path);
        let branch = repo.branch.as_str();
        self.git
            .run(&["fetch", "origin", branch], cwd, key)
            .await
            .map_err(|e| ("fetch", e))?;

        let current = self
            .git
            .run(&["rev-parse", "--abbrev-ref", "HEAD"], cwd, None)
            .await
            .map_err(|e| ("rev-parse", e))?;
        if current != branch {
            tracing::info!(repository = %repo.name, from = %current, to = branch, "switching branch");
            let upstream = format!("origin/{branch}");
            if self.git.run(&["checkout", branch], cwd, None).await.is_err() {
                self.git
                    .run(&["checkout", "-b", branch, "--track", &upstream], cwd, None)
                    .await
                    .map_err(|e| ("checkout", e))?;
            }
        }

        let upstream = format!("origin/{branch}");
        self.git
            .run(&["merge", "--ff-only", &upstream], cwd, None)
            .await
            .map(|_| ())
            .map_err(|e| ("merge", e))
    }

    // -----------------------------------------------------------------------
    // Outcome bookkeeping
    // -----------------------------------------------------------------------

    fn record(
        &self,
        repo: &mut RepositoryRecord,
        action: SyncAction,
        path: PathBuf,
        failure: Option<SyncFailure>,
    ) -> SyncReport {
        let now = Utc::now();
        match failure {
            None => {
                repo.local_path = Some(path.clone());
                repo.last_sync = Some(SyncOutcome {
                    success: true,
                    at: now,
                    synthetic: false,
                    category: None,
                    error: None,
                });
                let verb = match action {
                    SyncAction::Clone => "Cloned",
                    SyncAction::Pull => "Pulled",
                };
                SyncReport {
                    success: true,
                    message: format!("{verb} {} ({}) into {}", repo.name, repo.branch, path.display()),
                    action,
                    synthetic: false,
                    failure: None,
                    path,
                    persist_error: None,
                }
            }
            Some(failure) if failure.category() == FailureCategory::FilesystemReadOnly => {
                tracing::warn!(repository = %repo.name, path = %path.display(), "read-only filesystem; recording synthetic success");
                repo.last_sync = Some(SyncOutcome {
                    success: true,
                    at: now,
                    synthetic: true,
                    category: Some(FailureCategory::FilesystemReadOnly),
                    error: None,
                });
                SyncReport {
                    success: true,
                    message: format!(
                        "{}; treated as a no-op deployment target",
                        failure.message()
                    ),
                    action,
                    synthetic: true,
                    failure: Some(failure),
                    path,
                    persist_error: None,
                }
            }
            Some(failure) => {
                let message = failure.message();
                tracing::warn!(repository = %repo.name, category = %failure.category(), "sync failed: {message}");
                repo.last_sync = Some(SyncOutcome {
                    success: false,
                    at: now,
                    synthetic: false,
                    category: Some(failure.category()),
                    error: Some(message.clone()),
                });
                SyncReport {
                    success: false,
                    message,
                    action,
                    synthetic: false,
                    failure: Some(failure),
                    path,
                    persist_error: None,
                }
            }
        }
    }

    fn audit(&self, repo: &RepositoryRecord, report: &SyncReport) {
        let operation = match report.action {
            SyncAction::Clone => AuditOperation::Clone,
            SyncAction::Pull => AuditOperation::Pull,
        };
        let outcome = match (report.success, report.synthetic) {
            (true, true) => AuditOutcome::SyntheticSuccess,
            (true, false) => AuditOutcome::Success,
            (false, _) => AuditOutcome::Failure,
        };
        let entry = SyncAuditEntry::new(
            operation,
            repo.name.0.clone(),
            outcome,
            AuditDetail::Sync {
                action: report.action,
                path: report.path.clone(),
                synthetic: report.synthetic,
                failure: report.failure.clone(),
            },
        );
        if let Err(err) = store::append_audit_at(&self.home, &entry) {
            tracing::warn!(repository = %repo.name, error = %err, "could not append audit entry");
        }
    }
}

/// Engine settings read once per construction.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    pub git_path: PathBuf,
    pub git_timeout: Duration,
    pub ssh_keygen_path: PathBuf,
}

impl SyncConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let git = GitRunner::from_settings(settings);
        Self {
            git_path: PathBuf::from(settings.str_or(settings::GIT_PATH, "git")),
            git_timeout: git.timeout(),
            ssh_keygen_path: PathBuf::from(settings.str_or(settings::SSH_KEYGEN_PATH, "ssh-keygen")),
        }
    }
}
