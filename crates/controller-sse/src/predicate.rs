//! `POST`/`DELETE /sse/subscriptions` bodies: a patch against a client's
//! live filter predicate. Empty fields are a no-op on that slot, matching
//! `FilterPredicate`'s own "empty set means any" semantics — you cannot use
//! a patch to *widen* a slot back to "any" once narrowed; disconnect and
//! reconnect for that.

use std::collections::HashSet;

use controller_core::{CredentialId, OperationId, WorkspaceId};
use controller_eventbus::FilterPredicate;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PredicatePatch {
    #[serde(default)]
    pub event_types: HashSet<String>,
    #[serde(default)]
    pub workspace_ids: HashSet<WorkspaceId>,
    #[serde(default)]
    pub credential_ids: HashSet<CredentialId>,
    #[serde(default)]
    pub operation_ids: HashSet<OperationId>,
}

/// Unions `patch`'s members into `predicate`'s corresponding slots.
pub fn add(predicate: &mut FilterPredicate, patch: &PredicatePatch) {
    predicate.event_types.extend(patch.event_types.iter().cloned());
    predicate.workspace_ids.extend(patch.workspace_ids.iter().copied());
    predicate.credential_ids.extend(patch.credential_ids.iter().copied());
    predicate.operation_ids.extend(patch.operation_ids.iter().copied());
}

/// Removes `patch`'s members from `predicate`'s corresponding slots.
pub fn remove(predicate: &mut FilterPredicate, patch: &PredicatePatch) {
    for t in &patch.event_types {
        predicate.event_types.remove(t);
    }
    for id in &patch.workspace_ids {
        predicate.workspace_ids.remove(id);
    }
    for id in &patch.credential_ids {
        predicate.credential_ids.remove(id);
    }
    for id in &patch.operation_ids {
        predicate.operation_ids.remove(id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_unions_into_empty_predicate() {
        let mut predicate = FilterPredicate::any();
        let ws = WorkspaceId::new();
        let patch = PredicatePatch { workspace_ids: [ws].into_iter().collect(), ..Default::default() };
        add(&mut predicate, &patch);
        assert!(predicate.workspace_ids.contains(&ws));
    }

    #[test]
    fn remove_only_affects_named_members() {
        let ws_a = WorkspaceId::new();
        let ws_b = WorkspaceId::new();
        let mut predicate = FilterPredicate::any();
        predicate.workspace_ids.insert(ws_a);
        predicate.workspace_ids.insert(ws_b);

        let patch = PredicatePatch { workspace_ids: [ws_a].into_iter().collect(), ..Default::default() };
        remove(&mut predicate, &patch);

        assert!(!predicate.workspace_ids.contains(&ws_a));
        assert!(predicate.workspace_ids.contains(&ws_b));
    }
}
