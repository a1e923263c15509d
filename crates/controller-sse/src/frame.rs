//! The wire format (§6): `event: <type>\ndata: <JSON>\nid: <seq>`, the
//! `hello` handshake frame, and the two synthetic markers the bus can hand
//! back (`dropped_events`, `missed_events`). Kept independent of axum's SSE
//! types so the mapping from domain messages to wire frames is unit
//! testable without spinning up an HTTP server.

use controller_core::SubscriptionId;
use controller_eventbus::BusMessage;
use serde::Serialize;

/// A neutral SSE frame, translated to `axum::response::sse::Event` at the
/// router boundary.
#[derive(Debug, Clone, PartialEq)]
pub struct SseFrame {
    pub event: String,
    pub data: String,
    pub id: Option<String>,
}

impl SseFrame {
    fn new(event: impl Into<String>, data: impl Serialize, id: Option<u64>) -> Self {
        Self {
            event: event.into(),
            data: serde_json::to_string(&data).expect("frame payloads are always representable as JSON"),
            id: id.map(|seq| seq.to_string()),
        }
    }

    /// The first frame on every stream, carrying the assigned `client_id`.
    pub fn hello(client_id: SubscriptionId) -> Self {
        Self::new("hello", serde_json::json!({ "client_id": client_id.to_string() }), None)
    }
}

/// Maps one bus message to its wire frame. `None` means the message should
/// be silently dropped (an event the caller is not authorized to see —
/// checked by the caller of this function, not here, since that check needs
/// the RBAC service).
pub fn from_bus_message(message: &BusMessage) -> SseFrame {
    match message {
        BusMessage::Event(event) => SseFrame::new(event.event_type.as_str(), &event.payload, Some(event.seq)),
        BusMessage::DroppedEvents { count } => SseFrame::new("dropped_events", serde_json::json!({ "count": count }), None),
        BusMessage::MissedEvents { requested, current } => {
            SseFrame::new("missed_events", serde_json::json!({ "requested": requested, "current": current }), None)
        }
    }
}
