//! The per-call context every dispatched call carries, per §4.4:
//! `(caller_identity, workspace, credential_id, op_kind, payload, deadline, cancel_signal)`.

use controller_core::{CallerId, CredentialId, Deadline, WorkspaceId};
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct DispatchContext {
    pub caller: CallerId,
    pub workspace_id: WorkspaceId,
    pub credential_id: CredentialId,
    /// Target region, forwarded to the provider client factory and to
    /// capability-specific calls. Empty for provider-global calls.
    pub region: String,
    pub deadline: Deadline,
    pub cancel_signal: CancellationToken,
}

impl DispatchContext {
    pub fn new(caller: CallerId, workspace_id: WorkspaceId, credential_id: CredentialId, region: impl Into<String>, deadline: Deadline) -> Self {
        Self { caller, workspace_id, credential_id, region: region.into(), deadline, cancel_signal: CancellationToken::new() }
    }

    pub fn with_cancel_signal(mut self, cancel_signal: CancellationToken) -> Self {
        self.cancel_signal = cancel_signal;
        self
    }
}
