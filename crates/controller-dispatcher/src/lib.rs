//! # controller-dispatcher
//!
//! The Provider Dispatcher (C4): the single chokepoint for any
//! provider-touching call. Resolves credential scoping, builds a per-call
//! provider client under the Credential Store's scoped-decryption and
//! refcount discipline, classifies the call as a synchronous read or a
//! mutating long-running action, and normalizes errors at this boundary so
//! nothing downstream of it ever sees a provider-native error type.

mod bulkhead;
mod context;
mod dispatcher;
mod event_naming;
mod negative_cache;
mod retry;

pub use bulkhead::CredentialBulkhead;
pub use context::DispatchContext;
pub use dispatcher::{Dispatcher, DispatcherMetrics};
pub use event_naming::{event_type, initial_verb, terminal_verb, Verb};
pub use negative_cache::NegativeCache;
