//! Error types for gitdock-runtime.

use std::time::Duration;

use thiserror::Error;

use gitdock_core::error::StoreError;
use gitdock_core::types::BackendKind;

/// Failure of a single backend call.
#[derive(Debug, Error)]
pub enum RuntimeError {
    /// The backend cannot be reached at all.
    #[error("{backend} runtime unavailable: {reason}")]
    Unavailable { backend: BackendKind, reason: String },

    /// The call exceeded its hard timeout.
    #[error("{backend} runtime {operation} timed out after {}s", timeout.as_secs())]
    Timeout {
        backend: BackendKind,
        operation: &'static str,
        timeout: Duration,
    },

    /// The runtime API answered with an error.
    #[error("runtime API error: {0}")]
    Api(#[from] bollard::errors::Error),

    /// Every command-line candidate failed; carries the last failure.
    #[error("{program} {operation} failed: {message}")]
    Command {
        program: String,
        operation: &'static str,
        message: String,
    },

    /// The container is not known to the backend.
    #[error("container {id} not found")]
    NotFound { id: String },

    /// The local container mirror could not be read or written.
    #[error("store error: {0}")]
    Store(#[from] StoreError),
}
