//! gitdock core library: domain records, persistence, settings, errors.
//!
//! - [`types`]: newtypes, records and audit payloads
//! - [`error`]: [`StoreError`]
//! - [`store`]: repositories, container mirror, signing key, audit log
//! - [`settings`]: string key-value configuration

pub mod error;
pub mod settings;
pub mod store;
pub mod types;

pub use error::StoreError;
pub use settings::Settings;
pub use types::{
    AuditDetail, AuditOperation, AuditOutcome, BackendKind, ContainerId, ContainerRecord,
    FailureCategory, RepoName, RepositoryRecord, RestartOutcome, SigningKeyRecord, SyncAction,
    SyncAuditEntry, SyncFailure, SyncOutcome,
};
