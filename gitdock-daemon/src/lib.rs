//! # gitdock-daemon
//!
//! The update pipeline and the long-running service around it.
//!
//! [`SyncOrchestrator`] pulls a repository and restarts its dependent
//! containers. The daemon accepts notifications and manual requests over a
//! Unix socket and feeds them through a single job queue.

mod error;
pub mod intake;
pub mod log_rotation;
pub mod orchestrator;
pub mod paths;
pub mod protocol;
mod runtime;
pub mod status;

pub use error::DaemonError;
pub use intake::{IntakeError, UpdateNotification};
pub use orchestrator::{SyncOrchestrator, SyncResult, UpdatePhase};
pub use protocol::{
    request_discover, request_notify, request_status, request_stop, request_sync,
    request_sync_all, send_request, DaemonRequest, DaemonResponse,
};
pub use runtime::{run, run_with, start_blocking, SyncAllSummary, LOG_FORMAT_ENV};
pub use status::{status_at, StatusView};
