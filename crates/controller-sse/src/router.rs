//! Wires the [`SseGateway`] into an `axum` `Router`: `GET /sse` for the
//! handshake and streamed delivery, `POST`/`DELETE /sse/subscriptions` for
//! runtime filter mutation (§4.7, §6). Authentication itself is external
//! (the session token is just forwarded to [`SessionAuthenticator`]); this
//! module only owns the HTTP-shape of the contract.

use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::sse::{Event as AxumSseEvent, KeepAlive, Sse};
use axum::response::IntoResponse;
use axum::routing::{get, post};
use axum::{Json, Router};
use controller_core::{SubscriptionId, WorkspaceId};
use controller_eventbus::FilterPredicate;
use futures_core::Stream;
use serde::Deserialize;

use crate::frame::{self, SseFrame};
use crate::gateway::{GatewayError, PatchMode, SseGateway};
use crate::predicate::PredicatePatch;

/// `GET /sse` query parameters: an optional narrowing to a single workspace
/// at connect time, so a resuming client's backlog replay is scoped before
/// any event is read rather than narrowed after the fact (see
/// [`SseGateway::handshake`]).
#[derive(Debug, Deserialize, Default)]
struct SseQuery {
    workspace_id: Option<WorkspaceId>,
}

fn initial_predicate(query: &SseQuery) -> FilterPredicate {
    let mut predicate = FilterPredicate::any();
    if let Some(workspace_id) = query.workspace_id {
        predicate.workspace_ids.insert(workspace_id);
    }
    predicate
}

pub fn router(gateway: Arc<SseGateway>) -> Router {
    Router::new()
        .route("/sse", get(handshake_handler))
        .route("/sse/subscriptions", post(add_filter_handler).delete(remove_filter_handler))
        .with_state(gateway)
}

fn bearer_token(headers: &HeaderMap) -> String {
    headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .unwrap_or_default()
        .to_string()
}

fn last_event_id(headers: &HeaderMap) -> Option<u64> {
    headers.get("Last-Event-ID").and_then(|value| value.to_str().ok()).and_then(|value| value.parse().ok())
}

#[tracing::instrument(level = "info", skip_all)]
async fn handshake_handler(
    State(gateway): State<Arc<SseGateway>>,
    Query(query): Query<SseQuery>,
    headers: HeaderMap,
) -> impl IntoResponse {
    let token = bearer_token(&headers);
    let resume_from = last_event_id(&headers);
    let predicate = initial_predicate(&query);

    let client_id = match gateway.handshake(&token, predicate, resume_from).await {
        Ok(id) => id,
        Err(GatewayError::Unauthenticated) => return StatusCode::UNAUTHORIZED.into_response(),
        Err(other) => return (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()).into_response(),
    };

    let heartbeat = gateway.heartbeat_interval();
    let stream = event_stream(gateway, client_id);
    Sse::new(stream).keep_alive(KeepAlive::new().interval(heartbeat).text("keepalive")).into_response()
}

/// Disconnects the client's subscription the moment the stream stops being
/// polled, whether that's a clean end or the generator being dropped
/// mid-`await` because the client's TCP connection closed.
struct DisconnectGuard {
    gateway: Arc<SseGateway>,
    client_id: SubscriptionId,
}

impl Drop for DisconnectGuard {
    fn drop(&mut self) {
        self.gateway.disconnect(self.client_id);
    }
}

fn event_stream(gateway: Arc<SseGateway>, client_id: SubscriptionId) -> impl Stream<Item = Result<AxumSseEvent, Infallible>> {
    async_stream::stream! {
        let _guard = DisconnectGuard { gateway: gateway.clone(), client_id };
        yield Ok(to_axum_event(&SseFrame::hello(client_id)));
        loop {
            match gateway.recv(client_id).await {
                Ok(message) => yield Ok(to_axum_event(&frame::from_bus_message(&message))),
                Err(_) => break,
            }
        }
    }
}

fn to_axum_event(frame: &SseFrame) -> AxumSseEvent {
    let mut event = AxumSseEvent::default().event(frame.event.clone()).data(frame.data.clone());
    if let Some(id) = &frame.id {
        event = event.id(id.clone());
    }
    event
}

#[derive(Debug, Deserialize)]
struct SubscriptionRequest {
    client_id: String,
    #[serde(flatten)]
    patch: PredicatePatch,
}

async fn add_filter_handler(State(gateway): State<Arc<SseGateway>>, Json(body): Json<SubscriptionRequest>) -> impl IntoResponse {
    apply_patch(&gateway, PatchMode::Add, body)
}

async fn remove_filter_handler(State(gateway): State<Arc<SseGateway>>, Json(body): Json<SubscriptionRequest>) -> impl IntoResponse {
    apply_patch(&gateway, PatchMode::Remove, body)
}

fn apply_patch(gateway: &SseGateway, mode: PatchMode, body: SubscriptionRequest) -> axum::response::Response {
    let client_id: SubscriptionId = match body.client_id.parse() {
        Ok(id) => id,
        Err(_) => return StatusCode::BAD_REQUEST.into_response(),
    };
    match gateway.mutate_filter(client_id, mode, &body.patch) {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(GatewayError::UnknownClient(_)) => StatusCode::NOT_FOUND.into_response(),
        Err(other) => (StatusCode::INTERNAL_SERVER_ERROR, other.to_string()).into_response(),
    }
}
