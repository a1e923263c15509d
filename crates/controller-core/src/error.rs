//! The controller's closed error taxonomy.
//!
//! Every component boundary in the workspace returns [`ControllerError`] (or a
//! `Result` alias over it). Provider-native errors are translated into this
//! taxonomy at the Dispatcher boundary; nothing downstream of that boundary
//! ever sees a provider SDK error type.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::id::{CredentialId, OperationId, ProviderType, WorkspaceId};

/// Structured details attached to `ErrQuota`, matching the quota-exceeded
/// payload external clients are expected to render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuotaDetails {
    pub instance_type: String,
    pub region: String,
    pub current_quota: u64,
    pub current_usage: u64,
    pub available_quota: u64,
    pub required_count: u64,
    pub quota_increase_url: String,
    pub available_regions: Vec<RegionQuota>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegionQuota {
    pub region: String,
    pub available_quota: u64,
}

/// The taxonomy kind, independent of the message text carried alongside it.
/// This is the stable `code` field of the `{code, message, details?}` shape
/// handed to the external HTTP layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub enum ErrorKind {
    Auth,
    Forbidden,
    NotFound,
    Conflict,
    Validation,
    Quota,
    Dependency,
    Unavailable,
    Crypto,
    InUse,
    UnknownProvider,
    CancelAfterCommit,
    Storage,
    Internal,
}

impl ErrorKind {
    /// Only `Unavailable` is retried automatically, per the dispatch retry policy.
    pub fn is_retriable(self) -> bool {
        matches!(self, ErrorKind::Unavailable)
    }
}

#[derive(Error, Debug, Clone, Serialize, Deserialize)]
pub enum ControllerError {
    #[error("authentication rejected by provider")]
    Auth,

    #[error("credential {credential} does not belong to workspace {workspace}")]
    Forbidden {
        credential: CredentialId,
        workspace: WorkspaceId,
    },

    #[error("{resource_type} '{resource_id}' not found")]
    NotFound {
        resource_type: String,
        resource_id: String,
    },

    #[error("conflict: {message}")]
    Conflict { message: String },

    #[error("validation failed: {message}")]
    Validation { message: String },

    #[error("quota exceeded for {} in {}", details.instance_type, details.region)]
    Quota { details: QuotaDetails },

    #[error("cannot delete {resource_id}: dependent resources exist ({message})")]
    Dependency { resource_id: String, message: String },

    #[error("provider unavailable: {message}")]
    Unavailable { message: String },

    #[error("envelope open/seal failed")]
    Crypto,

    #[error("{resource_type} '{resource_id}' is in use by {holder}")]
    InUse {
        resource_type: String,
        resource_id: String,
        holder: String,
    },

    #[error("unknown provider type '{provider_type}'")]
    UnknownProvider { provider_type: ProviderType },

    #[error("operation {operation} was cancelled after the provider already committed")]
    CancelAfterCommit { operation: OperationId },

    #[error("storage error: {message}")]
    Storage { message: String },

    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ControllerError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            ControllerError::Auth => ErrorKind::Auth,
            ControllerError::Forbidden { .. } => ErrorKind::Forbidden,
            ControllerError::NotFound { .. } => ErrorKind::NotFound,
            ControllerError::Conflict { .. } => ErrorKind::Conflict,
            ControllerError::Validation { .. } => ErrorKind::Validation,
            ControllerError::Quota { .. } => ErrorKind::Quota,
            ControllerError::Dependency { .. } => ErrorKind::Dependency,
            ControllerError::Unavailable { .. } => ErrorKind::Unavailable,
            ControllerError::Crypto => ErrorKind::Crypto,
            ControllerError::InUse { .. } => ErrorKind::InUse,
            ControllerError::UnknownProvider { .. } => ErrorKind::UnknownProvider,
            ControllerError::CancelAfterCommit { .. } => ErrorKind::CancelAfterCommit,
            ControllerError::Storage { .. } => ErrorKind::Storage,
            ControllerError::Internal { .. } => ErrorKind::Internal,
        }
    }

    pub fn is_retriable(&self) -> bool {
        self.kind().is_retriable()
    }

    /// Machine-readable details for the external `{code, message, details?}` envelope.
    /// Only a handful of variants carry structured details; everything else is `None`.
    pub fn details(&self) -> Option<serde_json::Value> {
        match self {
            ControllerError::Quota { details } => serde_json::to_value(details).ok(),
            ControllerError::Forbidden { credential, workspace } => serde_json::json!({
                "credential_id": credential.to_string(),
                "workspace_id": workspace.to_string(),
            })
            .into(),
            _ => None,
        }
    }

    pub fn not_found(resource_type: impl Into<String>, resource_id: impl Into<String>) -> Self {
        ControllerError::NotFound {
            resource_type: resource_type.into(),
            resource_id: resource_id.into(),
        }
    }

    pub fn storage(message: impl Into<String>) -> Self {
        ControllerError::Storage { message: message.into() }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        ControllerError::Internal { message: message.into() }
    }

    /// Builds `Dependency` from a provider's native error text (§9 design
    /// note b): passed through verbatim when the upstream message already
    /// names concrete resolution steps, otherwise replaced with a normalized
    /// template so callers always get actionable text regardless of which
    /// provider produced the failure.
    pub fn dependency(resource_id: impl Into<String>, upstream_message: &str) -> Self {
        let resource_id = resource_id.into();
        let message = if upstream_message.contains("Resolution steps") || upstream_message.contains("cannot be deleted") {
            upstream_message.to_string()
        } else {
            format!("'{resource_id}' has dependent resources; delete or detach them first.")
        };
        ControllerError::Dependency { resource_id, message }
    }
}

pub type Result<T> = std::result::Result<T, ControllerError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_unavailable_is_retriable() {
        assert!(ControllerError::Unavailable { message: "timeout".into() }.is_retriable());
        assert!(!ControllerError::Validation { message: "bad".into() }.is_retriable());
        assert!(!ControllerError::Auth.is_retriable());
    }

    #[test]
    fn quota_error_carries_structured_details() {
        let err = ControllerError::Quota {
            details: QuotaDetails {
                instance_type: "p4d.24xlarge".into(),
                region: "ap-northeast-2".into(),
                current_quota: 0,
                current_usage: 0,
                available_quota: 0,
                required_count: 1,
                quota_increase_url: "https://example.com/quota".into(),
                available_regions: vec![RegionQuota { region: "us-east-1".into(), available_quota: 2 }],
            },
        };
        let details = err.details().expect("quota error carries details");
        assert_eq!(details["instance_type"], "p4d.24xlarge");
        assert_eq!(err.kind(), ErrorKind::Quota);
    }

    #[test]
    fn forbidden_names_the_mismatched_workspace() {
        let err = ControllerError::Forbidden {
            credential: CredentialId::new(),
            workspace: WorkspaceId::new(),
        };
        assert_eq!(err.kind(), ErrorKind::Forbidden);
    }

    #[test]
    fn dependency_passes_through_messages_with_resolution_steps() {
        let upstream = "VPC cannot be deleted while subnets are attached. Resolution steps: detach subnets first.";
        let ControllerError::Dependency { message, .. } = ControllerError::dependency("vpc-1", upstream) else {
            panic!("expected Dependency");
        };
        assert_eq!(message, upstream);
    }

    #[test]
    fn dependency_templates_messages_with_no_actionable_text() {
        let ControllerError::Dependency { message, .. } = ControllerError::dependency("vpc-1", "internal provider fault 500") else {
            panic!("expected Dependency");
        };
        assert!(message.contains("vpc-1"));
        assert!(message.contains("delete or detach"));
    }
}
