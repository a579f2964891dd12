//! Error types for gitdock-sync.
//!
//! These cover infrastructure failures only. A git command that runs and fails
//! is reported as a classified [`gitdock_core::SyncFailure`] value instead.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use gitdock_core::error::StoreError;

/// All errors that can arise from sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    /// An error from the record store.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// An I/O error, with annotated path for context.
    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The external tool could not be started at all.
    #[error("failed to spawn {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    /// The external tool exceeded its hard timeout and was killed.
    #[error("{program} timed out after {}s", timeout.as_secs())]
    Timeout { program: String, timeout: Duration },

    /// The external tool exited non-zero.
    #[error("{program} exited with {}: {stderr}", code.map(|c| c.to_string()).unwrap_or_else(|| "signal".into()))]
    Failed {
        program: String,
        code: Option<i32>,
        stderr: String,
    },

    /// A repository URL that is neither SSH nor HTTP(S) shaped.
    #[error("invalid repository URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },
}

impl SyncError {
    /// Diagnostic text used by failure classification.
    pub fn diagnostic(&self) -> String {
        match self {
            SyncError::Failed { stderr, .. } => stderr.clone(),
            other => other.to_string(),
        }
    }

    pub fn exit_code(&self) -> Option<i32> {
        match self {
            SyncError::Failed { code, .. } => *code,
            _ => None,
        }
    }
}

/// Convenience constructor for [`SyncError::Io`].
pub(crate) fn io_err(path: impl Into<PathBuf>, source: std::io::Error) -> SyncError {
    SyncError::Io {
        path: path.into(),
        source,
    }
}
