//! Validation of inbound repository-update notifications.
//!
//! A notification must carry a `repository` object with a non-empty `name`.
//! Anything else is rejected before orchestration starts and recorded as a
//! `rejected` audit entry, distinct from operational failures.

use std::path::Path;

use serde_json::Value;
use thiserror::Error;

use gitdock_core::store;
use gitdock_core::types::{AuditDetail, AuditOperation, AuditOutcome, RepoName, SyncAuditEntry};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum IntakeError {
    #[error("invalid notification: payload is not a JSON object")]
    NotAnObject,

    #[error("invalid notification: missing repository information")]
    MissingRepository,

    #[error("invalid notification: missing repository name")]
    MissingName,
}

/// A validated notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateNotification {
    pub repository: RepoName,
    /// Pushed ref, when the sender provides one (`refs/heads/main`).
    pub git_ref: Option<String>,
}

/// Validate `payload` and extract the repository it refers to.
pub fn validate(payload: &Value) -> Result<UpdateNotification, IntakeError> {
    let object = payload.as_object().ok_or(IntakeError::NotAnObject)?;
    let repository = object
        .get("repository")
        .and_then(Value::as_object)
        .ok_or(IntakeError::MissingRepository)?;
    let name = repository
        .get("name")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|n| !n.is_empty())
        .ok_or(IntakeError::MissingName)?;
    Ok(UpdateNotification {
        repository: RepoName::from(name),
        git_ref: object.get("ref").and_then(Value::as_str).map(str::to_string),
    })
}

/// Validate, auditing a rejection.
pub fn accept(home: &Path, payload: &Value) -> Result<UpdateNotification, IntakeError> {
    match validate(payload) {
        Ok(notification) => Ok(notification),
        Err(err) => {
            tracing::warn!(error = %err, "notification rejected");
            let entry = SyncAuditEntry::new(
                AuditOperation::Rejected,
                "notification",
                AuditOutcome::Failure,
                AuditDetail::Rejected {
                    reason: err.to_string(),
                },
            );
            if let Err(store_err) = store::append_audit_at(home, &entry) {
                tracing::warn!(error = %store_err, "could not append audit entry");
            }
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn push_payload_is_accepted() {
        let payload = json!({
            "ref": "refs/heads/main",
            "repository": { "name": "demo-api", "full_name": "o/demo-api" }
        });
        let notification = validate(&payload).expect("valid");
        assert_eq!(notification.repository, RepoName::from("demo-api"));
        assert_eq!(notification.git_ref.as_deref(), Some("refs/heads/main"));
    }

    #[test]
    fn missing_repository_object_is_rejected() {
        assert_eq!(
            validate(&json!({ "ref": "refs/heads/main" })),
            Err(IntakeError::MissingRepository)
        );
        assert_eq!(
            validate(&json!({ "repository": "demo-api" })),
            Err(IntakeError::MissingRepository)
        );
    }

    #[test]
    fn empty_name_is_rejected() {
        assert_eq!(
            validate(&json!({ "repository": { "name": "  " } })),
            Err(IntakeError::MissingName)
        );
        assert_eq!(
            validate(&json!({ "repository": {} })),
            Err(IntakeError::MissingName)
        );
    }

    #[test]
    fn non_object_is_rejected() {
        assert_eq!(validate(&json!([1, 2])), Err(IntakeError::NotAnObject));
    }

    #[test]
    fn rejection_is_audited() {
        let home = tempfile::TempDir::new().unwrap();
        let _ = accept(home.path(), &json!({}));
        let audit = store::read_audit_at(home.path(), 5).unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].operation, AuditOperation::Rejected);
    }
}
