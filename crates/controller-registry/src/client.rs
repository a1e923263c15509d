//! The provider client contract (§6): the uniform surface every registered
//! provider module exposes to the Dispatcher, replacing the duck-typed
//! per-provider methods of the original source with one closed trait.

use async_trait::async_trait;
use controller_core::{OperationKind, Result};
use std::sync::atomic::AtomicBool;
use tokio_util::sync::CancellationToken;

/// Reports intermediate progress (0..100) for a long-running mutation and
/// exposes whether the provider call has already committed, so the
/// Coordinator's cancellation race (§4.5) knows whether an abort is still
/// possible.
pub struct MutationHandle<'a> {
    pub cancel: &'a CancellationToken,
    pub committed: &'a AtomicBool,
    pub report_progress: &'a (dyn Fn(u8) + Send + Sync),
}

impl MutationHandle<'_> {
    pub fn mark_committed(&self) {
        self.committed.store(true, std::sync::atomic::Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A per-call, provider-typed client built fresh by a `ProviderDescriptor`'s
/// factory from a decrypted credential and a region. All methods return
/// provider-neutral JSON DTOs, never native SDK types.
#[async_trait]
pub trait ProviderClient: Send + Sync {
    /// Executes a synchronous read (`list`, `get`, `regions`, `cost-estimate`)
    /// and returns its normalized DTO directly.
    async fn execute_read(&self, op_kind: &OperationKind, payload: serde_json::Value) -> Result<serde_json::Value>;

    /// Drives one mutating long-running action (`create_*`, `delete_*`,
    /// `update_*`) to a terminal result, invoking `handle.report_progress`
    /// as intermediate state becomes known and `handle.mark_committed` the
    /// moment the change becomes irrevocable upstream.
    async fn execute_mutation(&self, op_kind: &OperationKind, payload: serde_json::Value, handle: MutationHandle<'_>) -> Result<serde_json::Value>;

    /// Best-effort rollback request for a mutation that was cancelled before
    /// it committed. A no-op for providers with nothing to unwind.
    async fn abort_in_progress(&self, op_kind: &OperationKind, payload: serde_json::Value) -> Result<()>;

    async fn list_regions(&self) -> Result<Vec<String>>;
}
