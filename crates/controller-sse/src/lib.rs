//! # controller-sse
//!
//! The SSE Gateway (C7): the HTTP-level push channel mapping one
//! authenticated client to one [`controller_eventbus::Subscription`],
//! applying per-client RBAC filtering and exposing runtime filter mutation
//! (§4.7, §6).

mod auth;
mod frame;
mod gateway;
mod predicate;
mod rbac;
mod router;

pub use auth::{AllowAnyToken, SessionAuthenticator};
pub use frame::SseFrame;
pub use gateway::{GatewayError, PatchMode, SseGateway};
pub use predicate::PredicatePatch;
pub use rbac::{AllowAllWorkspaces, WorkspaceAccess};
pub use router::router;
