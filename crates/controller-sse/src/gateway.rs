//! The SSE Gateway (C7): maps one authenticated client to one bus
//! [`Subscription`], applies the per-client RBAC filter on every delivered
//! event, and exposes the runtime filter-mutation contract from §4.7.

use std::sync::Arc;
use std::time::Duration;

use controller_core::{defaults, CallerId, SubscriptionId, WorkspaceId};
use controller_eventbus::{BusMessage, Event, EventBus, FilterPredicate, Subscription};
use parking_lot::Mutex;
use thiserror::Error;

use crate::auth::SessionAuthenticator;
use crate::predicate::{self, PredicatePatch};
use crate::rbac::WorkspaceAccess;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("authentication rejected")]
    Unauthenticated,
    #[error("unknown client {0}")]
    UnknownClient(SubscriptionId),
}

/// Whether a filter-mutation request adds to or removes from the client's
/// predicate, per `POST`/`DELETE /sse/subscriptions`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PatchMode {
    Add,
    Remove,
}

struct ClientEntry {
    caller: CallerId,
    subscription: Subscription,
    /// Mirrors the predicate actually installed on `subscription`, so a
    /// patch can be computed incrementally instead of needing a read-back
    /// from the bus (which only exposes `set_predicate`, not a getter).
    predicate: Mutex<FilterPredicate>,
}

/// Holds every live client's state, keyed by the `client_id` handed out at
/// handshake. Dropping the gateway drops every [`Subscription`] with it.
pub struct SseGateway {
    bus: EventBus,
    authenticator: Arc<dyn SessionAuthenticator>,
    rbac: Arc<dyn WorkspaceAccess>,
    heartbeat_interval: Duration,
    clients: dashmap::DashMap<SubscriptionId, Arc<ClientEntry>>,
}

impl SseGateway {
    pub fn new(bus: EventBus, authenticator: Arc<dyn SessionAuthenticator>, rbac: Arc<dyn WorkspaceAccess>) -> Self {
        Self::with_heartbeat_interval(bus, authenticator, rbac, defaults::DEFAULT_HEARTBEAT_INTERVAL)
    }

    pub fn with_heartbeat_interval(
        bus: EventBus,
        authenticator: Arc<dyn SessionAuthenticator>,
        rbac: Arc<dyn WorkspaceAccess>,
        heartbeat_interval: Duration,
    ) -> Self {
        Self { bus, authenticator, rbac, heartbeat_interval, clients: dashmap::DashMap::new() }
    }

    pub fn heartbeat_interval(&self) -> Duration {
        self.heartbeat_interval
    }

    /// Authenticates `token` and, on success, opens a subscription narrowed
    /// to `initial_predicate` and resuming from `last_event_id` if present.
    /// Narrowing at subscribe time (rather than via a follow-up
    /// `mutate_filter` call) matters for resume: the backlog replay below
    /// is filtered against whatever predicate is installed at that instant,
    /// so a client resuming into one workspace must ask for that scope up
    /// front or it would transiently see backlog from every workspace.
    /// `last_event_id` is the `seq` the client already received (the wire
    /// `Last-Event-ID` value), not the bus's resume cursor: `EventBus::
    /// subscribe`'s `start_from_seq` is inclusive, so replaying from
    /// `last_event_id` itself would redeliver that same event. Forward
    /// `last_event_id + 1` to ask the bus for strictly-after.
    /// Returns the assigned `client_id`; the caller (the router handler)
    /// drives delivery by calling [`Self::recv`] in a loop and must call
    /// [`Self::disconnect`] when the connection closes.
    #[tracing::instrument(level = "info", skip(self, token, initial_predicate))]
    pub async fn handshake(
        &self,
        token: &str,
        initial_predicate: FilterPredicate,
        last_event_id: Option<u64>,
    ) -> Result<SubscriptionId, GatewayError> {
        let caller = self.authenticator.authenticate(token).await.ok_or(GatewayError::Unauthenticated)?;
        let start_from_seq = last_event_id.map(|seq| seq.saturating_add(1));
        let subscription = self.bus.subscribe(initial_predicate.clone(), start_from_seq);
        let client_id = subscription.id();
        self.clients.insert(client_id, Arc::new(ClientEntry { caller, subscription, predicate: Mutex::new(initial_predicate) }));
        Ok(client_id)
    }

    /// Awaits the next message for a client and applies the RBAC scoping
    /// check from §4.7: a real [`Event`] the caller cannot see the
    /// workspace of is silently skipped (never returned, never counted
    /// against the caller's queue) rather than surfaced as a gap.
    pub async fn recv(&self, client_id: SubscriptionId) -> Result<BusMessage, GatewayError> {
        loop {
            let entry = self.clients.get(&client_id).map(|e| e.value().clone()).ok_or(GatewayError::UnknownClient(client_id))?;
            let message = entry.subscription.recv().await;
            if let BusMessage::Event(event) = &message {
                if !self.authorized_for(entry.caller, event).await {
                    continue;
                }
            }
            return Ok(message);
        }
    }

    async fn authorized_for(&self, caller: CallerId, event: &Event) -> bool {
        self.rbac.can_access(caller, event.workspace_id).await
    }

    /// Applies a filter-mutation request. Edits take effect on the next
    /// event; any delivery already queued for this client is not rewound
    /// (§4.7 race semantics).
    pub fn mutate_filter(&self, client_id: SubscriptionId, mode: PatchMode, patch: &PredicatePatch) -> Result<(), GatewayError> {
        let entry = self.clients.get(&client_id).ok_or(GatewayError::UnknownClient(client_id))?;
        let mut predicate = entry.predicate.lock();
        match mode {
            PatchMode::Add => predicate::add(&mut predicate, patch),
            PatchMode::Remove => predicate::remove(&mut predicate, patch),
        }
        entry.subscription.set_predicate(predicate.clone());
        Ok(())
    }

    /// Tears down the client's subscription immediately. Safe to call more
    /// than once or for an already-gone client.
    pub fn disconnect(&self, client_id: SubscriptionId) {
        self.clients.remove(&client_id);
    }

    pub fn client_count(&self) -> usize {
        self.clients.len()
    }

    pub fn caller_workspace_hint(&self, client_id: SubscriptionId) -> Option<WorkspaceId> {
        // Not part of the public contract; exposed for diagnostics only if a
        // client narrowed its predicate to a single workspace.
        let entry = self.clients.get(&client_id)?;
        let predicate = entry.predicate.lock();
        predicate.workspace_ids.iter().next().copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::AllowAnyToken;
    use crate::rbac::AllowAllWorkspaces;
    use controller_core::{EventTypeName, WorkspaceId};
    use controller_eventbus::EventDraft;

    fn gateway() -> SseGateway {
        SseGateway::new(EventBus::new(64, 64), Arc::new(AllowAnyToken), Arc::new(AllowAllWorkspaces))
    }

    fn draft(workspace_id: WorkspaceId) -> EventDraft {
        EventDraft {
            event_type: EventTypeName::parse("aws-vm-created").unwrap(),
            workspace_id,
            credential_id: None,
            operation_id: None,
            payload: serde_json::json!({ "status": "PROVISIONING" }),
        }
    }

    #[tokio::test]
    async fn handshake_rejects_empty_token() {
        let gw = gateway();
        assert!(matches!(gw.handshake("", FilterPredicate::any(), None).await, Err(GatewayError::Unauthenticated)));
    }

    #[tokio::test]
    async fn handshake_then_recv_delivers_matching_event() {
        let gw = gateway();
        let client = gw.handshake("tok", FilterPredicate::any(), None).await.unwrap();
        let ws = WorkspaceId::new();
        gw.bus.publish(draft(ws));
        let message = gw.recv(client).await.unwrap();
        assert!(matches!(message, BusMessage::Event(_)));
    }

    #[tokio::test]
    async fn filter_patch_narrows_to_named_workspace() {
        let gw = gateway();
        let client = gw.handshake("tok", FilterPredicate::any(), None).await.unwrap();
        let ws_a = WorkspaceId::new();
        let ws_b = WorkspaceId::new();

        let patch = PredicatePatch { workspace_ids: [ws_a].into_iter().collect(), ..Default::default() };
        gw.mutate_filter(client, PatchMode::Add, &patch).unwrap();

        gw.bus.publish(draft(ws_b));
        gw.bus.publish(draft(ws_a));

        let message = gw.recv(client).await.unwrap();
        let BusMessage::Event(event) = message else { panic!("expected event") };
        assert_eq!(event.workspace_id, ws_a);
    }

    #[tokio::test]
    async fn disconnect_removes_the_client() {
        let gw = gateway();
        let client = gw.handshake("tok", FilterPredicate::any(), None).await.unwrap();
        assert_eq!(gw.client_count(), 1);
        gw.disconnect(client);
        assert_eq!(gw.client_count(), 0);
        assert!(matches!(gw.recv(client).await, Err(GatewayError::UnknownClient(_))));
    }

    struct DenyWorkspace(WorkspaceId);

    #[async_trait::async_trait]
    impl WorkspaceAccess for DenyWorkspace {
        async fn can_access(&self, _caller: CallerId, workspace_id: WorkspaceId) -> bool {
            workspace_id != self.0
        }
    }

    #[tokio::test]
    async fn unauthorized_workspace_event_is_silently_skipped() {
        let ws_denied = WorkspaceId::new();
        let ws_allowed = WorkspaceId::new();
        let gw = SseGateway::new(EventBus::new(64, 64), Arc::new(AllowAnyToken), Arc::new(DenyWorkspace(ws_denied)));
        let client = gw.handshake("tok", FilterPredicate::any(), None).await.unwrap();

        gw.bus.publish(draft(ws_denied));
        gw.bus.publish(draft(ws_allowed));

        let message = gw.recv(client).await.unwrap();
        let BusMessage::Event(event) = message else { panic!("expected event") };
        assert_eq!(event.workspace_id, ws_allowed);
    }
}
