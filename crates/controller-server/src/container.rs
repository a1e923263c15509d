//! Wires every component crate into one running [`Container`].
//!
//! Construction goes through [`ContainerBuilder`], a typestate builder
//! (grounded in `nebula_credential`'s `CredentialManagerBuilder<HasStorage>`)
//! so that a master key provider — the one thing every other piece depends
//! on transitively — must be supplied before `.build()` is even callable,
//! instead of failing at runtime.

use std::marker::PhantomData;
use std::sync::Arc;

use controller_core::Config;
use controller_credential::{CredentialStore, ProviderSchemaLookup};
use controller_crypto::KeyProvider;
use controller_dispatcher::{Dispatcher, DispatcherMetrics};
use controller_eventbus::{EventBus, EventBusMetrics};
use controller_operation::{OperationCoordinator, OperationMetrics};
use controller_registry::ProviderDescriptor;
use controller_registry::ProviderRegistry;
use controller_sse::{SessionAuthenticator, SseGateway, WorkspaceAccess};

use crate::providers;

/// Everything the HTTP surface needs to serve a request: the Dispatcher
/// (which itself reaches the Credential Store, Provider Registry, and
/// Operation Coordinator) plus the SSE Gateway sharing the same bus.
pub struct Container {
    pub config: Arc<Config>,
    pub dispatcher: Dispatcher,
    pub sse_gateway: Arc<SseGateway>,
    bus: EventBus,
}

impl Container {
    pub fn builder() -> ContainerBuilder<NoKeyProvider> {
        ContainerBuilder::new()
    }

    /// Aggregates the operational counters each component tracks on its own
    /// (dispatch attempts/retries, bus drop-oldest evictions, operation
    /// retention sweeps) into one snapshot for a diagnostics endpoint.
    pub fn metrics(&self) -> Metrics {
        Metrics {
            dispatcher: self.dispatcher.metrics(),
            event_bus: self.bus.metrics(),
            operations: self.dispatcher.operations().metrics(),
        }
    }
}

/// Process-wide operational counters, composed from each component's own
/// snapshot. Not a Prometheus exporter — just enough to answer "is this
/// instance healthy" at a glance.
#[derive(Debug, Clone, Copy, Default, serde::Serialize)]
pub struct Metrics {
    pub dispatcher: DispatcherMetrics,
    pub event_bus: EventBusMetrics,
    pub operations: OperationMetrics,
}

#[doc(hidden)]
pub struct NoKeyProvider;
#[doc(hidden)]
pub struct HasKeyProvider;

/// Builds a [`Container`]. Every field but `key_provider` has a workable
/// default (see each setter); `key_provider` has none, since a container
/// with no way to decrypt credentials cannot serve any real request.
pub struct ContainerBuilder<S> {
    config: Option<Arc<Config>>,
    key_provider: Option<Arc<dyn KeyProvider>>,
    schema_lookup: Option<Arc<dyn ProviderSchemaLookup>>,
    descriptors: Option<Vec<ProviderDescriptor>>,
    authenticator: Option<Arc<dyn SessionAuthenticator>>,
    rbac: Option<Arc<dyn WorkspaceAccess>>,
    _marker: PhantomData<S>,
}

impl ContainerBuilder<NoKeyProvider> {
    fn new() -> Self {
        Self {
            config: None,
            key_provider: None,
            schema_lookup: None,
            descriptors: None,
            authenticator: None,
            rbac: None,
            _marker: PhantomData,
        }
    }

    /// Supplies the master key provider. Required: without it `.build()`
    /// does not exist on this type.
    pub fn key_provider(self, key_provider: Arc<dyn KeyProvider>) -> ContainerBuilder<HasKeyProvider> {
        ContainerBuilder {
            config: self.config,
            key_provider: Some(key_provider),
            schema_lookup: self.schema_lookup,
            descriptors: self.descriptors,
            authenticator: self.authenticator,
            rbac: self.rbac,
            _marker: PhantomData,
        }
    }
}

impl<S> ContainerBuilder<S> {
    pub fn config(mut self, config: Arc<Config>) -> Self {
        self.config = Some(config);
        self
    }

    pub fn schema_lookup(mut self, schema_lookup: Arc<dyn ProviderSchemaLookup>) -> Self {
        self.schema_lookup = Some(schema_lookup);
        self
    }

    /// Overrides the built-in `aws|gcp|azure|ncp` descriptor set, e.g. to
    /// link in a real provider SDK module or to scope a test registry down
    /// to a single provider.
    pub fn descriptors(mut self, descriptors: Vec<ProviderDescriptor>) -> Self {
        self.descriptors = Some(descriptors);
        self
    }

    pub fn authenticator(mut self, authenticator: Arc<dyn SessionAuthenticator>) -> Self {
        self.authenticator = Some(authenticator);
        self
    }

    pub fn rbac(mut self, rbac: Arc<dyn WorkspaceAccess>) -> Self {
        self.rbac = Some(rbac);
        self
    }
}

impl ContainerBuilder<HasKeyProvider> {
    pub fn build(self) -> Container {
        let config = self.config.unwrap_or_else(|| Arc::new(default_config()));
        let key_provider = self.key_provider.expect("typestate guarantees Some");
        let schema_lookup = self.schema_lookup.unwrap_or_else(|| Arc::new(controller_credential::PermissiveSchemaLookup));
        let descriptors = self.descriptors.unwrap_or_else(providers::default_descriptors);
        let authenticator = self.authenticator.unwrap_or_else(|| Arc::new(controller_sse::AllowAnyToken));
        let rbac = self.rbac.unwrap_or_else(|| Arc::new(controller_sse::AllowAllWorkspaces));

        let credentials = Arc::new(CredentialStore::new(config.clone(), key_provider, schema_lookup));
        let registry = Arc::new(ProviderRegistry::new(descriptors));
        let bus = EventBus::new(config.bus_ring_capacity, config.subscriber_queue_capacity);
        let coordinator = OperationCoordinator::new(bus.clone());
        let dispatcher = Dispatcher::new(config.clone(), credentials, registry, coordinator, bus.clone());
        let sse_gateway = Arc::new(SseGateway::with_heartbeat_interval(bus.clone(), authenticator, rbac, config.heartbeat_interval));

        Container { config, dispatcher, sse_gateway, bus }
    }
}

/// A config with no master keys of its own — only reachable if the caller
/// never called `.config(...)`, which would leave `master_key_versions`
/// empty and every credential operation failing closed. Real deployments
/// always supply a loaded `Config`.
fn default_config() -> Config {
    Config {
        master_key_versions: Vec::new(),
        dispatch_default_deadline: controller_core::defaults::DEFAULT_DISPATCH_DEADLINE,
        operation_default_deadline: controller_core::defaults::DEFAULT_OPERATION_DEADLINE,
        per_credential_inflight_cap: controller_core::defaults::DEFAULT_PER_CREDENTIAL_INFLIGHT_CAP,
        bulkhead_queue_timeout: controller_core::defaults::DEFAULT_BULKHEAD_QUEUE_TIMEOUT,
        bus_ring_capacity: controller_core::defaults::DEFAULT_BUS_RING_CAPACITY,
        subscriber_queue_capacity: controller_core::defaults::DEFAULT_SUBSCRIBER_QUEUE_CAPACITY,
        operation_retention: controller_core::defaults::DEFAULT_OPERATION_RETENTION,
        heartbeat_interval: controller_core::defaults::DEFAULT_HEARTBEAT_INTERVAL,
        retry: controller_core::RetryPolicy::default(),
    }
}
