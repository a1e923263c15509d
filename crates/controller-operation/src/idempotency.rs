//! Idempotency-key de-duplication for `Create`, grounded in the same
//! negative-cache shape the teacher uses for dispatch-failure memoization.
//!
//! A key is tracked only while its operation is non-terminal; once the
//! operation reaches a terminal state the entry is removed so a later
//! `Create` with the same key starts a fresh operation rather than
//! resurrecting a dead one.

use controller_core::{CredentialId, OperationId, OperationKind, WorkspaceId};
use dashmap::DashMap;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct DedupKey {
    workspace_id: WorkspaceId,
    credential_id: CredentialId,
    kind: OperationKind,
    idempotency_key: String,
}

#[derive(Default)]
pub struct IdempotencyTable {
    entries: DashMap<DedupKey, OperationId>,
}

impl IdempotencyTable {
    pub fn new() -> Self {
        Self { entries: DashMap::new() }
    }

    pub fn lookup(
        &self,
        workspace_id: WorkspaceId,
        credential_id: CredentialId,
        kind: &OperationKind,
        idempotency_key: &str,
    ) -> Option<OperationId> {
        let key = DedupKey {
            workspace_id,
            credential_id,
            kind: kind.clone(),
            idempotency_key: idempotency_key.to_string(),
        };
        self.entries.get(&key).map(|entry| *entry.value())
    }

    pub fn insert(
        &self,
        workspace_id: WorkspaceId,
        credential_id: CredentialId,
        kind: OperationKind,
        idempotency_key: String,
        operation_id: OperationId,
    ) {
        let key = DedupKey { workspace_id, credential_id, kind, idempotency_key };
        self.entries.insert(key, operation_id);
    }

    /// Called when an operation reaches a terminal state, so the key can be
    /// reused by a subsequent, distinct `Create` call.
    pub fn retire(&self, operation_id: OperationId) {
        self.entries.retain(|_, id| *id != operation_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lookup_after_insert_returns_same_operation() {
        let table = IdempotencyTable::new();
        let ws = WorkspaceId::new();
        let cred = CredentialId::new();
        let kind = OperationKind::new("create_vm");
        let op = OperationId::new();

        table.insert(ws, cred, kind.clone(), "key-1".into(), op);
        assert_eq!(table.lookup(ws, cred, &kind, "key-1"), Some(op));
    }

    #[test]
    fn different_idempotency_key_is_a_miss() {
        let table = IdempotencyTable::new();
        let ws = WorkspaceId::new();
        let cred = CredentialId::new();
        let kind = OperationKind::new("create_vm");
        table.insert(ws, cred, kind.clone(), "key-1".into(), OperationId::new());
        assert_eq!(table.lookup(ws, cred, &kind, "key-2"), None);
    }

    #[test]
    fn retire_removes_the_entry() {
        let table = IdempotencyTable::new();
        let ws = WorkspaceId::new();
        let cred = CredentialId::new();
        let kind = OperationKind::new("create_vm");
        let op = OperationId::new();
        table.insert(ws, cred, kind.clone(), "key-1".into(), op);
        table.retire(op);
        assert_eq!(table.lookup(ws, cred, &kind, "key-1"), None);
    }
}
