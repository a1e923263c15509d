//! The Provider Dispatcher (C4): the single chokepoint for any
//! provider-touching call. Implements the five-step contract from the
//! component spec: scope the credential, resolve the descriptor, acquire
//! (refcount + bulkhead), classify and run, translate errors at the
//! boundary.

use std::sync::Arc;
use std::time::Duration;

use controller_core::{
    defaults, ControllerError, Counter, CredentialId, EventTypeName, OperationId, OperationKind, ProviderType,
    Result, RetryPolicy, WorkspaceId,
};
use controller_credential::CredentialStore;
use controller_eventbus::{EventBus, EventDraft};
use controller_operation::{OperationCoordinator, OperationHandle, OperationSnapshot};
use controller_registry::{MutationHandle, ProviderClient, ProviderRegistry};

use crate::bulkhead::CredentialBulkhead;
use crate::context::DispatchContext;
use crate::event_naming::{self, Verb};
use crate::negative_cache::NegativeCache;
use crate::retry;

/// The Provider Dispatcher (C4). Cheaply cloneable; clones share the same
/// bulkhead, negative cache, and underlying component handles.
#[derive(Clone)]
pub struct Dispatcher {
    config: Arc<controller_core::Config>,
    credentials: Arc<CredentialStore>,
    registry: Arc<ProviderRegistry>,
    coordinator: OperationCoordinator,
    bus: EventBus,
    bulkhead: Arc<CredentialBulkhead>,
    negative_cache: Arc<NegativeCache>,
    metrics: Arc<DispatcherMetricsInner>,
}

#[derive(Default)]
struct DispatcherMetricsInner {
    attempts: Counter,
    retries: Counter,
}

/// Snapshot of the dispatcher's attempt/retry counters (§4.4). Every call
/// into a provider client, read or mutation, counts as one attempt; a retry
/// only happens after a retriable (`ErrUnavailable`) failure per the policy
/// in §6.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct DispatcherMetrics {
    pub attempts: u64,
    pub retries: u64,
}

impl Dispatcher {
    pub fn new(
        config: Arc<controller_core::Config>,
        credentials: Arc<CredentialStore>,
        registry: Arc<ProviderRegistry>,
        coordinator: OperationCoordinator,
        bus: EventBus,
    ) -> Self {
        let bulkhead = Arc::new(CredentialBulkhead::new(config.per_credential_inflight_cap, config.bulkhead_queue_timeout));
        let negative_cache = Arc::new(NegativeCache::new(defaults::DEFAULT_NEGATIVE_CACHE_TTL));
        Self { config, credentials, registry, coordinator, bus, bulkhead, negative_cache, metrics: Arc::default() }
    }

    pub fn operations(&self) -> &OperationCoordinator {
        &self.coordinator
    }

    pub fn metrics(&self) -> DispatcherMetrics {
        DispatcherMetrics { attempts: self.metrics.attempts.get(), retries: self.metrics.retries.get() }
    }

    /// Steps 1+2: verify the credential belongs to the caller's workspace
    /// and resolve its provider type, doing zero provider I/O either way
    /// (§8 invariant 2).
    fn resolve_scope(&self, workspace_id: WorkspaceId, credential_id: CredentialId) -> Result<ProviderType> {
        let credential = self.credentials.get(credential_id)?;
        if credential.workspace_id != workspace_id {
            return Err(ControllerError::Forbidden { credential: credential_id, workspace: workspace_id });
        }
        self.registry.get(&credential.provider_type)?;
        Ok(credential.provider_type)
    }

    /// Step 3: acquires the credential's refcount guard and builds a
    /// per-call client inside the scoped decryption closure. The guard
    /// lives as long as the returned tuple; dropping it (on any exit path)
    /// releases the refcount per §8 invariant 3.
    fn build_client(&self, credential_id: CredentialId, region: &str) -> Result<(Arc<dyn ProviderClient>, controller_credential::RefcountGuard)> {
        let guard = self.credentials.refcounts().acquire(credential_id);
        let credential = self.credentials.get(credential_id)?;
        let descriptor = self.registry.get(&credential.provider_type)?;
        let client = self.credentials.with_decrypted(credential_id, |payload| descriptor.build(payload, region))??;
        Ok((client, guard))
    }

    /// Synchronous read path: `list`, `get`, `regions`, `cost-estimate`.
    /// Runs inline under the deadline; only `ErrUnavailable` is retried.
    #[tracing::instrument(level = "info", skip(self, payload), fields(workspace = %ctx.workspace_id, credential = %ctx.credential_id, op = %op_kind))]
    pub async fn dispatch_read(&self, ctx: DispatchContext, op_kind: OperationKind, payload: serde_json::Value) -> Result<serde_json::Value> {
        self.resolve_scope(ctx.workspace_id, ctx.credential_id)?;

        if let Some(err) = self.negative_cache.get(ctx.credential_id, &op_kind) {
            return Err(err);
        }

        let permit = self.bulkhead.acquire(ctx.credential_id).await?;
        let result = self.run_read(&ctx, &op_kind, payload).await;
        drop(permit);

        if let Err(err) = &result {
            if !err.is_retriable() {
                self.negative_cache.remember(ctx.credential_id, op_kind.clone(), err.clone());
            }
        }
        result
    }

    async fn run_read(&self, ctx: &DispatchContext, op_kind: &OperationKind, payload: serde_json::Value) -> Result<serde_json::Value> {
        let (client, _guard) = self.build_client(ctx.credential_id, &ctx.region)?;

        let mut attempt = 0u32;
        loop {
            self.metrics.attempts.incr();
            let outcome = run_under_deadline_and_cancel(ctx, client.execute_read(op_kind, payload.clone())).await;
            match outcome {
                Ok(value) => return Ok(value),
                Err(err) if err.is_retriable() && attempt + 1 < self.config.retry.attempts && !ctx.deadline.is_expired() => {
                    let delay = retry::backoff_delay(attempt, &self.config.retry);
                    attempt += 1;
                    self.metrics.retries.incr();
                    if sleep_or_cancelled(ctx, delay).await.is_err() {
                        return Err(ControllerError::Unavailable { message: "dispatch cancelled during retry backoff".into() });
                    }
                }
                Err(err) => return Err(err),
            }
        }
    }

    /// Mutating long-running path: `create_*`, `delete_*`, `update_*`.
    /// Registers an Operation and returns its id immediately; the provider
    /// call runs on a task the Coordinator's operation record owns.
    #[tracing::instrument(level = "info", skip(self, payload), fields(workspace = %ctx.workspace_id, credential = %ctx.credential_id, op = %op_kind))]
    pub fn dispatch_mutation(
        &self,
        ctx: DispatchContext,
        op_kind: OperationKind,
        payload: serde_json::Value,
        idempotency_key: Option<String>,
    ) -> Result<OperationId> {
        let provider_type = self.resolve_scope(ctx.workspace_id, ctx.credential_id)?;

        if let Some(err) = self.negative_cache.get(ctx.credential_id, &op_kind) {
            return Err(err);
        }

        let (handle, is_new) =
            self.coordinator.create_reporting_dedup(ctx.workspace_id, ctx.credential_id, op_kind.clone(), idempotency_key);
        let operation_id = handle.id();
        if !is_new {
            return Ok(operation_id);
        }

        let task = MutationTask {
            credentials: self.credentials.clone(),
            registry: self.registry.clone(),
            bulkhead: self.bulkhead.clone(),
            bus: self.bus.clone(),
            negative_cache: self.negative_cache.clone(),
            retry_policy: self.config.retry,
            metrics: self.metrics.clone(),
        };
        tokio::spawn(task.run(ctx, op_kind, provider_type, payload, handle));
        Ok(operation_id)
    }

    /// Requests cancellation of an in-flight operation. A no-op returning
    /// the existing snapshot if the operation is already terminal (§8
    /// boundary behavior).
    pub fn cancel(&self, operation_id: OperationId) -> Result<OperationSnapshot> {
        let handle = self
            .coordinator
            .handle(operation_id)
            .ok_or_else(|| ControllerError::not_found("operation", operation_id.to_string()))?;
        if !handle.snapshot().state.is_terminal() {
            handle.request_cancel();
        }
        Ok(handle.snapshot())
    }
}

async fn run_under_deadline_and_cancel<F>(ctx: &DispatchContext, future: F) -> Result<serde_json::Value>
where
    F: std::future::Future<Output = Result<serde_json::Value>>,
{
    tokio::select! {
        biased;
        () = ctx.cancel_signal.cancelled() => Err(ControllerError::Unavailable { message: "dispatch cancelled by caller".into() }),
        timeout_result = tokio::time::timeout(ctx.deadline.remaining(), future) => {
            timeout_result.unwrap_or_else(|_| Err(ControllerError::Unavailable { message: "dispatch deadline exceeded".into() }))
        }
    }
}

async fn sleep_or_cancelled(ctx: &DispatchContext, delay: Duration) -> std::result::Result<(), ()> {
    tokio::select! {
        () = ctx.cancel_signal.cancelled() => Err(()),
        () = tokio::time::sleep(delay) => Ok(()),
    }
}

/// The state a spawned mutation's provider call resolved to, before it's
/// folded into the operation's terminal transition.
enum MutationOutcome {
    Failed(ControllerError),
    CancelledBeforeCommit,
    CancelledAfterCommit,
}

/// Owns the behavior of one spawned mutation task so `Dispatcher::dispatch_mutation`
/// stays a thin, synchronous admission check. Built fresh per dispatched
/// mutation from `Arc`-shared collaborators.
struct MutationTask {
    credentials: Arc<CredentialStore>,
    registry: Arc<ProviderRegistry>,
    bulkhead: Arc<CredentialBulkhead>,
    bus: EventBus,
    negative_cache: Arc<NegativeCache>,
    retry_policy: RetryPolicy,
    metrics: Arc<DispatcherMetricsInner>,
}

impl MutationTask {
    async fn run(self, ctx: DispatchContext, op_kind: OperationKind, provider_type: ProviderType, payload: serde_json::Value, handle: OperationHandle) {
        let result = self.drive(&ctx, &op_kind, &provider_type, payload, &handle).await;
        if let Err(err) = result {
            if !err.is_retriable() {
                self.negative_cache.remember(ctx.credential_id, op_kind.clone(), err.clone());
            }
            let _ = handle.fail(err);
        }
    }

    async fn drive(
        &self,
        ctx: &DispatchContext,
        op_kind: &OperationKind,
        provider_type: &ProviderType,
        payload: serde_json::Value,
        handle: &OperationHandle,
    ) -> Result<()> {
        handle.start()?;

        let started_verb = event_naming::initial_verb(op_kind);
        if let Some(verb) = started_verb {
            self.bus.publish(self.lifecycle_event(provider_type, op_kind, verb, ctx, handle.id(), "CREATING"));
        }

        let heartbeat_event_type: EventTypeName = event_naming::event_type(provider_type, op_kind, started_verb.unwrap_or(Verb::Updated));
        let heartbeat_task = handle.spawn_heartbeat(heartbeat_event_type);

        let client_result = self.acquire_and_build_client(ctx).await;
        let (client, _refcount_guard) = match client_result {
            Ok(pair) => pair,
            Err(err) => {
                heartbeat_task.abort();
                return Err(err);
            }
        };

        let mutation_result = self.run_with_retry(client.clone(), op_kind, payload.clone(), ctx, handle).await;
        heartbeat_task.abort();

        match mutation_result {
            Ok(result_payload) => {
                handle.succeed()?;
                let verb = event_naming::terminal_verb(op_kind);
                let mut event = self.lifecycle_event(provider_type, op_kind, verb, ctx, handle.id(), "ACTIVE");
                if let serde_json::Value::Object(ref mut map) = event.payload {
                    map.insert("result".to_string(), result_payload);
                }
                self.bus.publish(event);
                Ok(())
            }
            Err(MutationOutcome::CancelledBeforeCommit) => {
                let _ = client.abort_in_progress(op_kind, payload).await;
                handle.cancel_before_commit()
            }
            Err(MutationOutcome::CancelledAfterCommit) => {
                handle.cancel_after_commit()?;
                self.bus.publish(EventDraft {
                    event_type: EventTypeName::parse(format!("{provider_type}-reconciliation-updated"))
                        .expect("reconciliation event name is always canonical"),
                    workspace_id: ctx.workspace_id,
                    credential_id: Some(ctx.credential_id),
                    operation_id: Some(handle.id()),
                    payload: serde_json::json!({ "status": "NEEDS_RECONCILIATION" }),
                });
                Ok(())
            }
            Err(MutationOutcome::Failed(err)) => Err(err),
        }
    }

    async fn acquire_and_build_client(&self, ctx: &DispatchContext) -> Result<(Arc<dyn ProviderClient>, controller_credential::RefcountGuard)> {
        let permit = self.bulkhead.acquire(ctx.credential_id).await?;
        let guard = self.credentials.refcounts().acquire(ctx.credential_id);
        let credential = self.credentials.get(ctx.credential_id)?;
        let descriptor = self.registry.get(&credential.provider_type)?;
        let client = self.credentials.with_decrypted(ctx.credential_id, |payload| descriptor.build(payload, &ctx.region))??;
        drop(permit);
        Ok((client, guard))
    }

    fn lifecycle_event(
        &self,
        provider_type: &ProviderType,
        op_kind: &OperationKind,
        verb: Verb,
        ctx: &DispatchContext,
        operation_id: OperationId,
        status: &str,
    ) -> EventDraft {
        EventDraft {
            event_type: event_naming::event_type(provider_type, op_kind, verb),
            workspace_id: ctx.workspace_id,
            credential_id: Some(ctx.credential_id),
            operation_id: Some(operation_id),
            payload: serde_json::json!({ "status": status }),
        }
    }

    async fn run_with_retry(
        &self,
        client: Arc<dyn ProviderClient>,
        op_kind: &OperationKind,
        payload: serde_json::Value,
        ctx: &DispatchContext,
        handle: &OperationHandle,
    ) -> std::result::Result<serde_json::Value, MutationOutcome> {
        let mut attempt = 0u32;
        loop {
            self.metrics.attempts.incr();
            let outcome = Self::run_one_attempt(client.clone(), op_kind, payload.clone(), ctx, handle).await;
            match outcome {
                Err(MutationOutcome::Failed(err))
                    if err.is_retriable() && !handle.is_committed() && attempt + 1 < self.retry_policy.attempts && !ctx.deadline.is_expired() =>
                {
                    let delay = retry::backoff_delay(attempt, &self.retry_policy);
                    attempt += 1;
                    self.metrics.retries.incr();
                    tokio::select! {
                        () = ctx.cancel_signal.cancelled() => return Err(MutationOutcome::CancelledBeforeCommit),
                        () = handle.cancellation_token().cancelled() => return Err(MutationOutcome::CancelledBeforeCommit),
                        () = tokio::time::sleep(delay) => {}
                    }
                }
                other => return other,
            }
        }
    }

    async fn run_one_attempt(
        client: Arc<dyn ProviderClient>,
        op_kind: &OperationKind,
        payload: serde_json::Value,
        ctx: &DispatchContext,
        handle: &OperationHandle,
    ) -> std::result::Result<serde_json::Value, MutationOutcome> {
        let committed = std::sync::atomic::AtomicBool::new(false);
        let handle_for_progress = handle.clone();
        let report_progress = move |progress: u8| handle_for_progress.touch_progress(progress);
        let mutation_handle = MutationHandle { cancel: &ctx.cancel_signal, committed: &committed, report_progress: &report_progress };

        let op_cancel = handle.cancellation_token();
        let resolve_cancellation = || {
            if committed.load(std::sync::atomic::Ordering::SeqCst) {
                MutationOutcome::CancelledAfterCommit
            } else {
                MutationOutcome::CancelledBeforeCommit
            }
        };

        let result = tokio::select! {
            biased;
            () = ctx.cancel_signal.cancelled() => Err(resolve_cancellation()),
            () = op_cancel.cancelled() => Err(resolve_cancellation()),
            timeout_result = tokio::time::timeout(ctx.deadline.remaining(), client.execute_mutation(op_kind, payload, mutation_handle)) => {
                match timeout_result {
                    Ok(Ok(value)) => Ok(value),
                    Ok(Err(err)) => Err(MutationOutcome::Failed(err)),
                    Err(_) => Err(MutationOutcome::Failed(ControllerError::Unavailable { message: "operation deadline exceeded".into() })),
                }
            }
        };

        // The provider may have flipped `committed` mid-call on any exit path,
        // not just the success branch (e.g. it commits upstream, then the same
        // attempt still returns a retriable error). Propagate it to `handle`
        // unconditionally so `run_with_retry`'s `!handle.is_committed()` guard
        // sees a true commit regardless of how this attempt resolved.
        if committed.load(std::sync::atomic::Ordering::SeqCst) {
            handle.mark_committed();
        }

        result
    }
}
