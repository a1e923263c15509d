//! Per-event authorization scoping (§4.7): before any event reaches a
//! client, the gateway checks the caller's access to that event's
//! `workspace_id` against the external RBAC service. A caller who cannot see
//! a workspace never learns the event existed — no enumeration oracle.

use async_trait::async_trait;
use controller_core::{CallerId, WorkspaceId};

#[async_trait]
pub trait WorkspaceAccess: Send + Sync {
    async fn can_access(&self, caller: CallerId, workspace_id: WorkspaceId) -> bool;
}

/// Test/embedding double granting every caller access to every workspace.
/// Real deployments wire in the actual RBAC service here; this crate has no
/// opinion on how that check is implemented.
pub struct AllowAllWorkspaces;

#[async_trait]
impl WorkspaceAccess for AllowAllWorkspaces {
    async fn can_access(&self, _caller: CallerId, _workspace_id: WorkspaceId) -> bool {
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn allow_all_grants_any_workspace() {
        assert!(AllowAllWorkspaces.can_access(CallerId::new(), WorkspaceId::new()).await);
    }
}
