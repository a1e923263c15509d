//! `Event` and the filter predicate subscribers are matched against.

use chrono::{DateTime, Utc};
use controller_core::{CredentialId, EventTypeName, OperationId, WorkspaceId};
use std::collections::HashSet;

/// A published event, assigned a strictly-increasing `seq` by the bus at
/// publish time.
#[derive(Debug, Clone)]
pub struct Event {
    pub event_type: EventTypeName,
    pub workspace_id: WorkspaceId,
    pub credential_id: Option<CredentialId>,
    pub operation_id: Option<OperationId>,
    pub payload: serde_json::Value,
    pub seq: u64,
    pub timestamp: DateTime<Utc>,
}

/// The pre-publish shape a producer constructs; the bus fills in `seq` and
/// `timestamp`.
#[derive(Debug, Clone)]
pub struct EventDraft {
    pub event_type: EventTypeName,
    pub workspace_id: WorkspaceId,
    pub credential_id: Option<CredentialId>,
    pub operation_id: Option<OperationId>,
    pub payload: serde_json::Value,
}

/// Conjunction of allow-lists; an empty set at any slot means "any". Built
/// by the SSE Gateway from the client's subscription request and mutated in
/// place via `POST`/`DELETE /sse/subscriptions`.
#[derive(Debug, Clone, Default)]
pub struct FilterPredicate {
    pub event_types: HashSet<String>,
    pub workspace_ids: HashSet<WorkspaceId>,
    pub credential_ids: HashSet<CredentialId>,
    pub operation_ids: HashSet<OperationId>,
}

impl FilterPredicate {
    pub fn any() -> Self {
        Self::default()
    }

    pub fn matches(&self, event: &Event) -> bool {
        (self.event_types.is_empty() || self.event_types.contains(event.event_type.as_str()))
            && (self.workspace_ids.is_empty() || self.workspace_ids.contains(&event.workspace_id))
            && (self.credential_ids.is_empty() || event.credential_id.is_some_and(|id| self.credential_ids.contains(&id)))
            && (self.operation_ids.is_empty() || event.operation_id.is_some_and(|id| self.operation_ids.contains(&id)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_event(workspace_id: WorkspaceId) -> Event {
        Event {
            event_type: EventTypeName::parse("aws-kubernetes-cluster-created").unwrap(),
            workspace_id,
            credential_id: None,
            operation_id: None,
            payload: serde_json::json!({}),
            seq: 1,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn empty_predicate_matches_anything() {
        assert!(FilterPredicate::any().matches(&sample_event(WorkspaceId::new())));
    }

    #[test]
    fn workspace_filter_excludes_other_workspaces() {
        let ws = WorkspaceId::new();
        let mut predicate = FilterPredicate::any();
        predicate.workspace_ids.insert(ws);
        assert!(predicate.matches(&sample_event(ws)));
        assert!(!predicate.matches(&sample_event(WorkspaceId::new())));
    }
}
