//! The Operation record and the read-only snapshot external callers see.

use chrono::{DateTime, Utc};
use controller_core::{CredentialId, OperationId, OperationKind, OperationState, WorkspaceId};

/// Internal, mutable record. Only the owning task (inside
/// [`crate::coordinator::OperationCoordinator`]) ever mutates this; everyone
/// else reads a [`OperationSnapshot`] taken under a short lock.
#[derive(Debug, Clone)]
pub struct OperationRecord {
    pub id: OperationId,
    pub workspace_id: WorkspaceId,
    pub credential_id: CredentialId,
    pub kind: OperationKind,
    pub state: OperationState,
    pub progress: u8,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<controller_core::ControllerError>,
}

impl OperationRecord {
    pub fn new(
        id: OperationId,
        workspace_id: WorkspaceId,
        credential_id: CredentialId,
        kind: OperationKind,
        idempotency_key: Option<String>,
    ) -> Self {
        let now = Utc::now();
        Self {
            id,
            workspace_id,
            credential_id,
            kind,
            state: OperationState::Pending,
            progress: 0,
            idempotency_key,
            created_at: now,
            updated_at: now,
        error: None,
        }
    }

    pub fn snapshot(&self) -> OperationSnapshot {
        OperationSnapshot {
            id: self.id,
            workspace_id: self.workspace_id,
            credential_id: self.credential_id,
            kind: self.kind.clone(),
            state: self.state,
            progress: self.progress,
            created_at: self.created_at,
            updated_at: self.updated_at,
            error: self.error.clone(),
        }
    }
}

/// A point-in-time, read-only view of an operation. This is what external
/// components (the SSE Gateway, API handlers) read; they never get a
/// reference into the coordinator's mutable state.
#[derive(Debug, Clone)]
pub struct OperationSnapshot {
    pub id: OperationId,
    pub workspace_id: WorkspaceId,
    pub credential_id: CredentialId,
    pub kind: OperationKind,
    pub state: OperationState,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub error: Option<controller_core::ControllerError>,
}
