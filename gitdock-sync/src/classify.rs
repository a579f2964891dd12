//! Map git diagnostics onto exactly one [`FailureCategory`].
//!
//! Matching is case-insensitive on the diagnostic text. Order matters: the
//! environment-level categories (read-only, disk full) are checked before
//! remote-side ones, and a bare "permission denied" is only a local
//! permission problem once the ssh `publickey` form has been ruled out.

use std::path::PathBuf;

use gitdock_core::types::{FailureCategory, SyncFailure};

const READ_ONLY: &[&str] = &["read-only file system", "os error 30"];
const DISK_FULL: &[&str] = &["no space left on device", "disk quota exceeded", "os error 28"];
const AUTHENTICATION: &[&str] = &[
    "authentication failed",
    "permission denied (publickey",
    "could not read username",
    "could not read password",
    "host key verification failed",
    "invalid username or password",
];
const BRANCH_NOT_FOUND: &[&str] = &[
    "couldn't find remote ref",
    "remote branch",
    "not found in upstream",
    "did not match any",
];
const REPOSITORY_NOT_FOUND: &[&str] = &[
    "repository not found",
    "does not appear to be a git repository",
    "not appear to be a git repository",
    "does not exist",
];
const NETWORK: &[&str] = &[
    "could not resolve host",
    "name or service not known",
    "temporary failure in name resolution",
    "network is unreachable",
    "connection timed out",
    "connection refused",
    "operation timed out",
    "timed out after",
    "could not connect to server",
];
const PERMISSION_DENIED: &[&str] = &["permission denied", "os error 13"];

/// Pure category lookup on diagnostic text.
pub fn categorize(diagnostic: &str) -> FailureCategory {
    let text = diagnostic.to_ascii_lowercase();
    let any = |needles: &[&str]| needles.iter().any(|n| text.contains(n));

    if any(READ_ONLY) {
        FailureCategory::FilesystemReadOnly
    } else if any(DISK_FULL) {
        FailureCategory::DiskFull
    } else if any(AUTHENTICATION) {
        FailureCategory::Authentication
    } else if any(BRANCH_NOT_FOUND) {
        FailureCategory::BranchNotFound
    } else if any(REPOSITORY_NOT_FOUND) {
        FailureCategory::RepositoryNotFound
    } else if any(NETWORK) {
        FailureCategory::NetworkUnreachable
    } else if any(PERMISSION_DENIED) {
        FailureCategory::PermissionDenied
    } else {
        FailureCategory::GenericToolFailure
    }
}

/// What the engine was doing when a failure happened.
#[derive(Debug, Clone)]
pub struct FailureContext<'a> {
    pub repository: &'a str,
    pub url: &'a str,
    pub branch: &'a str,
    pub path: PathBuf,
}

/// Build the structured failure for `diagnostic`.
pub fn classify(
    ctx: &FailureContext<'_>,
    command: &str,
    exit_code: Option<i32>,
    diagnostic: &str,
) -> SyncFailure {
    let repository = ctx.repository.to_string();
    let diagnostic_text = diagnostic.trim().to_string();
    match categorize(diagnostic) {
        FailureCategory::Authentication => SyncFailure::Authentication {
            repository,
            url: ctx.url.to_string(),
            diagnostic: diagnostic_text,
        },
        FailureCategory::BranchNotFound => SyncFailure::BranchNotFound {
            repository,
            branch: ctx.branch.to_string(),
            diagnostic: diagnostic_text,
        },
        FailureCategory::RepositoryNotFound => SyncFailure::RepositoryNotFound {
            repository,
            url: ctx.url.to_string(),
            diagnostic: diagnostic_text,
        },
        FailureCategory::NetworkUnreachable => SyncFailure::NetworkUnreachable {
            repository,
            url: ctx.url.to_string(),
            diagnostic: diagnostic_text,
        },
        FailureCategory::FilesystemReadOnly => SyncFailure::FilesystemReadOnly {
            repository,
            path: ctx.path.clone(),
        },
        FailureCategory::PermissionDenied => SyncFailure::PermissionDenied {
            repository,
            path: ctx.path.clone(),
            diagnostic: diagnostic_text,
        },
        FailureCategory::DiskFull => SyncFailure::DiskFull {
            repository,
            path: ctx.path.clone(),
        },
        FailureCategory::GenericToolFailure => SyncFailure::GenericToolFailure {
            repository,
            command: command.to_string(),
            exit_code,
            diagnostic: diagnostic_text,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case("fatal: could not create work tree dir 'x': Read-only file system", FailureCategory::FilesystemReadOnly)]
    #[case("error: unable to write file: No space left on device", FailureCategory::DiskFull)]
    #[case("git@github.com: Permission denied (publickey).\nfatal: Could not read from remote repository.", FailureCategory::Authentication)]
    #[case("fatal: Authentication failed for 'https://github.com/o/r.git/'", FailureCategory::Authentication)]
    #[case("fatal: could not read Username for 'https://github.com': terminal prompts disabled", FailureCategory::Authentication)]
    #[case("warning: Could not find remote branch develop to clone.", FailureCategory::BranchNotFound)]
    #[case("fatal: couldn't find remote ref refs/heads/develop", FailureCategory::BranchNotFound)]
    #[case("remote: Repository not found.", FailureCategory::RepositoryNotFound)]
    #[case("fatal: 'origin' does not appear to be a git repository", FailureCategory::RepositoryNotFound)]
    #[case("ssh: Could not resolve hostname github.com: Name or service not known", FailureCategory::NetworkUnreachable)]
    #[case("fatal: unable to access: Could not resolve host: github.com", FailureCategory::NetworkUnreachable)]
    #[case("git timed out after 120s", FailureCategory::NetworkUnreachable)]
    #[case("fatal: could not create leading directories of '/repos/x': Permission denied", FailureCategory::PermissionDenied)]
    #[case("error: cannot open .git/FETCH_HEAD: Permission denied", FailureCategory::PermissionDenied)]
    #[case("fatal: Not possible to fast-forward, aborting.", FailureCategory::GenericToolFailure)]
    #[case("", FailureCategory::GenericToolFailure)]
    fn diagnostic_maps_to_one_category(#[case] diagnostic: &str, #[case] expected: FailureCategory) {
        assert_eq!(categorize(diagnostic), expected);
    }

    #[test]
    fn generic_failure_keeps_command_and_exit_code() {
        let ctx = FailureContext {
            repository: "demo-api",
            url: "https://github.com/o/demo-api.git",
            branch: "main",
            path: PathBuf::from("/repos/demo-api"),
        };
        let failure = classify(&ctx, "merge", Some(128), "fatal: Not possible to fast-forward");
        assert_eq!(
            failure,
            SyncFailure::GenericToolFailure {
                repository: "demo-api".into(),
                command: "merge".into(),
                exit_code: Some(128),
                diagnostic: "fatal: Not possible to fast-forward".into(),
            }
        );
    }

    #[test]
    fn read_only_failure_carries_working_copy_path() {
        let ctx = FailureContext {
            repository: "demo-api",
            url: "git@github.com:o/demo-api.git",
            branch: "main",
            path: PathBuf::from("/repos/demo-api"),
        };
        let failure = classify(&ctx, "clone", Some(128), "Read-only file system");
        assert_eq!(failure.category(), FailureCategory::FilesystemReadOnly);
        assert!(failure.message().contains("/repos/demo-api"));
    }
}
