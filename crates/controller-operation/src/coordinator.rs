//! The Operation Coordinator itself: owns the operations map, drives each
//! operation's state machine, and synthesizes progress heartbeats when a
//! provider offers no progress signal of its own.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use controller_core::{
    defaults, ControllerError, Counter, CredentialId, EventTypeName, OperationId, OperationKind, OperationState,
    Result, WorkspaceId,
};
use controller_eventbus::{EventBus, EventDraft};
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio_util::sync::CancellationToken;

use crate::idempotency::IdempotencyTable;
use crate::model::{OperationRecord, OperationSnapshot};

struct OperationEntry {
    record: Mutex<OperationRecord>,
    cancel: CancellationToken,
    committed: AtomicBool,
    last_progress_touch: Mutex<Instant>,
}

struct CoordinatorInner {
    operations: DashMap<OperationId, Arc<OperationEntry>>,
    idempotency: IdempotencyTable,
    bus: EventBus,
    retention: Duration,
    evictions: Counter,
}

/// Snapshot of the coordinator's retention-sweep counter.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct OperationMetrics {
    pub evictions: u64,
}

/// Lifecycle manager for long-running mutations (C5). Cheaply cloneable;
/// clones share the same operations map and idempotency table.
#[derive(Clone)]
pub struct OperationCoordinator {
    inner: Arc<CoordinatorInner>,
}

impl OperationCoordinator {
    pub fn new(bus: EventBus) -> Self {
        Self::with_retention(bus, defaults::DEFAULT_OPERATION_RETENTION)
    }

    pub fn with_retention(bus: EventBus, retention: Duration) -> Self {
        Self {
            inner: Arc::new(CoordinatorInner {
                operations: DashMap::new(),
                idempotency: IdempotencyTable::new(),
                bus,
                retention,
                evictions: Counter::new(),
            }),
        }
    }

    /// Registers a new operation, or returns a handle to an existing
    /// non-terminal operation if `idempotency_key` matches one already
    /// tracked for the same `(workspace, credential, kind)`.
    pub fn create(
        &self,
        workspace_id: WorkspaceId,
        credential_id: CredentialId,
        kind: OperationKind,
        idempotency_key: Option<String>,
    ) -> OperationHandle {
        self.create_reporting_dedup(workspace_id, credential_id, kind, idempotency_key).0
    }

    /// Same as [`Self::create`], but also reports whether a brand new
    /// operation was registered (`true`) or an existing one was returned
    /// because of a matching idempotency key (`false`). Callers that would
    /// otherwise spawn a duplicate provider call use this to skip the
    /// spawn on a dedup hit.
    pub fn create_reporting_dedup(
        &self,
        workspace_id: WorkspaceId,
        credential_id: CredentialId,
        kind: OperationKind,
        idempotency_key: Option<String>,
    ) -> (OperationHandle, bool) {
        if let Some(key) = idempotency_key.as_deref() {
            if let Some(existing) = self.inner.idempotency.lookup(workspace_id, credential_id, &kind, key) {
                if let Some(entry) = self.inner.operations.get(&existing) {
                    return (
                        OperationHandle { id: existing, coordinator: self.inner.clone(), entry: entry.clone() },
                        false,
                    );
                }
            }
        }

        let id = OperationId::new();
        let record = OperationRecord::new(id, workspace_id, credential_id, kind.clone(), idempotency_key.clone());
        let entry = Arc::new(OperationEntry {
            record: Mutex::new(record),
            cancel: CancellationToken::new(),
            committed: AtomicBool::new(false),
            last_progress_touch: Mutex::new(Instant::now()),
        });
        self.inner.operations.insert(id, entry.clone());
        if let Some(key) = idempotency_key {
            self.inner.idempotency.insert(workspace_id, credential_id, kind, key, id);
        }

        (OperationHandle { id, coordinator: self.inner.clone(), entry }, true)
    }

    pub fn get(&self, id: OperationId) -> Option<OperationSnapshot> {
        self.inner.operations.get(&id).map(|entry| entry.record.lock().snapshot())
    }

    pub fn list_for_workspace(&self, workspace_id: WorkspaceId) -> Vec<OperationSnapshot> {
        self.inner
            .operations
            .iter()
            .map(|entry| entry.record.lock().snapshot())
            .filter(|snapshot| snapshot.workspace_id == workspace_id)
            .collect()
    }

    pub fn handle(&self, id: OperationId) -> Option<OperationHandle> {
        self.inner
            .operations
            .get(&id)
            .map(|entry| OperationHandle { id, coordinator: self.inner.clone(), entry: entry.clone() })
    }

    /// Evicts terminal operations past their retention window. The caller
    /// (typically a periodic background task in the server binary) decides
    /// the sweep cadence; this method does one pass.
    pub fn evict_expired(&self) {
        let now = chrono::Utc::now();
        let retention = chrono::Duration::from_std(self.inner.retention).unwrap_or(chrono::Duration::zero());
        let before = self.inner.operations.len();
        self.inner.operations.retain(|_, entry| {
            let record = entry.record.lock();
            !(record.state.is_terminal() && now - record.updated_at > retention)
        });
        let evicted = before.saturating_sub(self.inner.operations.len());
        if evicted > 0 {
            self.inner.evictions.add(evicted as u64);
        }
    }

    pub fn operation_count(&self) -> usize {
        self.inner.operations.len()
    }

    pub fn metrics(&self) -> OperationMetrics {
        OperationMetrics { evictions: self.inner.evictions.get() }
    }
}

/// A handle to one in-flight operation, held by the Dispatcher task that
/// drives it. Cloning is cheap; all clones observe the same underlying
/// record, but only the Dispatcher's owning task should call the mutating
/// methods (per §4.5's single-writer rule).
#[derive(Clone)]
pub struct OperationHandle {
    id: OperationId,
    coordinator: Arc<CoordinatorInner>,
    entry: Arc<OperationEntry>,
}

impl OperationHandle {
    pub fn id(&self) -> OperationId {
        self.id
    }

    pub fn snapshot(&self) -> OperationSnapshot {
        self.entry.record.lock().snapshot()
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.entry.cancel.clone()
    }

    /// Signals cancellation. Whether this lands as `cancelled` or
    /// `failed(ErrCancelAfterCommit)` depends on whether the provider call
    /// had already committed by the time the owning task observes it.
    pub fn request_cancel(&self) {
        self.entry.cancel.cancel();
    }

    pub fn is_cancel_requested(&self) -> bool {
        self.entry.cancel.is_cancelled()
    }

    /// Marks that the provider call has committed and can no longer be
    /// rolled back; a subsequent cancellation must resolve as
    /// `ErrCancelAfterCommit` rather than a clean `cancelled`.
    pub fn mark_committed(&self) {
        self.entry.committed.store(true, Ordering::SeqCst);
    }

    pub fn is_committed(&self) -> bool {
        self.entry.committed.load(Ordering::SeqCst)
    }

    /// `pending -> running`, the "dispatch accepted" transition.
    pub fn start(&self) -> Result<()> {
        self.transition(OperationState::Running)
    }

    pub fn succeed(&self) -> Result<()> {
        self.transition(OperationState::Succeeded)?;
        self.coordinator.idempotency.retire(self.id);
        Ok(())
    }

    pub fn fail(&self, error: ControllerError) -> Result<()> {
        {
            let mut record = self.entry.record.lock();
            if !record.state.can_transition_to(OperationState::Failed) {
                return Err(ControllerError::Internal {
                    message: format!("cannot transition operation {} from {:?} to failed", self.id, record.state),
                });
            }
            record.state = OperationState::Failed;
            record.error = Some(error);
            record.updated_at = chrono::Utc::now();
        }
        self.coordinator.idempotency.retire(self.id);
        Ok(())
    }

    pub fn cancel_before_commit(&self) -> Result<()> {
        self.transition(OperationState::Cancelled)?;
        self.coordinator.idempotency.retire(self.id);
        Ok(())
    }

    /// Cancellation was requested but the provider call had already
    /// committed; the operation still resolves as `failed`, carrying
    /// `ErrCancelAfterCommit` rather than the provider's own error.
    pub fn cancel_after_commit(&self) -> Result<()> {
        self.fail(ControllerError::CancelAfterCommit { operation: self.id })
    }

    fn transition(&self, next: OperationState) -> Result<()> {
        let mut record = self.entry.record.lock();
        if !record.state.can_transition_to(next) {
            return Err(ControllerError::Internal {
                message: format!("cannot transition operation {} from {:?} to {:?}", self.id, record.state, next),
            });
        }
        record.state = next;
        record.updated_at = chrono::Utc::now();
        Ok(())
    }

    /// Called by the provider client's progress callback whenever it emits
    /// a real progress signal, so the heartbeat synthesizer backs off.
    pub fn touch_progress(&self, progress: u8) {
        let mut record = self.entry.record.lock();
        record.progress = progress;
        record.updated_at = chrono::Utc::now();
        drop(record);
        *self.entry.last_progress_touch.lock() = Instant::now();
    }

    /// Spawns the background task that synthesizes a heartbeat event every
    /// `defaults::DEFAULT_PROGRESS_HEARTBEAT_INTERVAL` when no real progress
    /// signal has arrived since the last tick, capped at
    /// `defaults::SYNTHESIZED_PROGRESS_CAP`. Exits once the operation
    /// reaches a terminal state.
    pub fn spawn_heartbeat(&self, event_type: EventTypeName) -> tokio::task::JoinHandle<()> {
        let entry = self.entry.clone();
        let bus = self.coordinator.bus.clone();
        let id = self.id;
        let workspace_id = self.snapshot().workspace_id;

        tokio::spawn(async move {
            let interval = defaults::DEFAULT_PROGRESS_HEARTBEAT_INTERVAL;
            loop {
                tokio::time::sleep(interval).await;
                let terminal = {
                    let record = entry.record.lock();
                    record.state.is_terminal()
                };
                if terminal {
                    return;
                }

                let touched_recently = entry.last_progress_touch.lock().elapsed() < interval;
                if touched_recently {
                    continue;
                }

                let next_progress = {
                    let mut record = entry.record.lock();
                    let next = (record.progress + 5).min(defaults::SYNTHESIZED_PROGRESS_CAP);
                    record.progress = next;
                    record.updated_at = chrono::Utc::now();
                    next
                };
                *entry.last_progress_touch.lock() = Instant::now();

                bus.publish(EventDraft {
                    event_type: event_type.clone(),
                    workspace_id,
                    credential_id: None,
                    operation_id: Some(id),
                    payload: serde_json::json!({ "status": "PROVISIONING", "progress": next_progress, "synthesized": true }),
                });
            }
        })
    }
}
