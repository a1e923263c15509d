//! S4 (SSE resume) and S6 (workspace isolation) from the component spec's
//! testable-properties section. These exercise the gateway directly rather
//! than through `axum`, the same way `controller-dispatcher`'s scenario
//! tests bypass HTTP entirely — the wire framing in `router.rs` has its own
//! narrower unit tests.

use std::sync::Arc;

use controller_core::{EventTypeName, WorkspaceId};
use controller_eventbus::{BusMessage, EventBus, EventDraft, FilterPredicate};
use controller_sse::{AllowAllWorkspaces, AllowAnyToken, SseGateway};

fn draft(workspace_id: WorkspaceId, name: &str) -> EventDraft {
    EventDraft {
        event_type: EventTypeName::parse(name).unwrap(),
        workspace_id,
        credential_id: None,
        operation_id: None,
        payload: serde_json::json!({ "status": "PROVISIONING" }),
    }
}

fn workspace_predicate(workspace_id: WorkspaceId) -> FilterPredicate {
    let mut predicate = FilterPredicate::any();
    predicate.workspace_ids.insert(workspace_id);
    predicate
}

#[tokio::test]
async fn s4_sse_resume_replays_only_what_the_filter_still_allows() {
    let bus = EventBus::new(256, 64);
    let gateway = SseGateway::new(bus.clone(), Arc::new(AllowAnyToken), Arc::new(AllowAllWorkspaces));
    let ws_1 = WorkspaceId::new();
    let ws_2 = WorkspaceId::new();

    // Seed seq 1..5: all for ws_1 except seq 1, which is a different
    // workspace. Seq 2 (the resume cursor below) matches ws_1, so a
    // gateway that forwards `Last-Event-ID` verbatim as the bus's inclusive
    // `start_from_seq` would redeliver it — a filtered-out seq 2 would have
    // masked that bug instead of surfacing it.
    bus.publish(draft(ws_2, "aws-kubernetes-cluster-created")); // seq 1
    bus.publish(draft(ws_1, "aws-kubernetes-cluster-created")); // seq 2
    bus.publish(draft(ws_1, "aws-kubernetes-cluster-created")); // seq 3
    bus.publish(draft(ws_1, "aws-kubernetes-cluster-created")); // seq 4
    bus.publish(draft(ws_1, "aws-kubernetes-cluster-created")); // seq 5

    // Reconnect with Last-Event-ID: 2 (the client already received seq 2),
    // scoped to ws_1. Expect replay of the ws_1-matching backlog strictly
    // after seq 2: seq 3, 4, 5 — seq 2 must not be redelivered.
    let client = gateway.handshake("tok", workspace_predicate(ws_1), Some(2)).await.unwrap();

    for expected_seq in [3, 4, 5] {
        let message = gateway.recv(client).await.unwrap();
        let BusMessage::Event(event) = message else { panic!("expected a replayed event, got {message:?}") };
        assert_eq!(event.seq, expected_seq);
        assert_eq!(event.workspace_id, ws_1);
    }

    // Then live: a new ws_1 event arrives after the replay drains.
    bus.publish(draft(ws_1, "aws-kubernetes-cluster-updated"));
    let message = gateway.recv(client).await.unwrap();
    let BusMessage::Event(event) = message else { panic!("expected live event") };
    assert_eq!(event.seq, 6);
}

#[tokio::test]
async fn s4_sse_resume_past_the_ring_yields_missed_events_marker() {
    let bus = EventBus::new(4, 64); // tiny ring: only the last 4 events survive
    let gateway = SseGateway::new(bus.clone(), Arc::new(AllowAnyToken), Arc::new(AllowAllWorkspaces));
    let ws = WorkspaceId::new();

    for _ in 0..10 {
        bus.publish(draft(ws, "aws-kubernetes-cluster-created"));
    }
    // Ring now holds seq 7..10; resuming from seq 2 is no longer possible.
    let client = gateway.handshake("tok", FilterPredicate::any(), Some(2)).await.unwrap();

    let message = gateway.recv(client).await.unwrap();
    match message {
        BusMessage::MissedEvents { requested, current } => {
            assert_eq!(requested, 2);
            assert_eq!(current, 10);
        }
        other => panic!("expected MissedEvents, got {other:?}"),
    }
}

#[tokio::test]
async fn s6_workspace_isolation_across_two_clients() {
    let bus = EventBus::new(256, 64);
    let gateway = SseGateway::new(bus.clone(), Arc::new(AllowAnyToken), Arc::new(AllowAllWorkspaces));
    let ws_1 = WorkspaceId::new();
    let ws_2 = WorkspaceId::new();

    let client_a = gateway.handshake("tok-a", workspace_predicate(ws_1), None).await.unwrap();
    let client_b = gateway.handshake("tok-b", workspace_predicate(ws_2), None).await.unwrap();

    bus.publish(draft(ws_1, "aws-kubernetes-cluster-created"));

    let message = gateway.recv(client_a).await.unwrap();
    let BusMessage::Event(event) = message else { panic!("expected event for C-A") };
    assert_eq!(event.workspace_id, ws_1);

    // C-B must never see it: race the recv against a short timeout.
    let b_result = tokio::time::timeout(std::time::Duration::from_millis(50), gateway.recv(client_b)).await;
    assert!(b_result.is_err(), "C-B should not have received the ws_1 event");

    // Unsubscribe C-A; the next ws_1 event is delivered to nobody. C-A's
    // subscription is gone, so its `recv` now fails fast with
    // `UnknownClient` rather than ever seeing the event.
    gateway.disconnect(client_a);
    bus.publish(draft(ws_1, "aws-kubernetes-cluster-updated"));

    assert!(matches!(gateway.recv(client_a).await, Err(controller_sse::GatewayError::UnknownClient(_))));
}
