//! `ProviderDescriptor`: the immutable, statically-linked declaration of one
//! provider type's capabilities, credential schema, and client factory.

use std::collections::HashSet;
use std::sync::Arc;

use controller_core::{Capability, ControllerError, ProviderType, Result};
use controller_credential::PlaintextPayload;

use crate::client::ProviderClient;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    String,
    Secret,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub required: bool,
    pub kind: FieldKind,
}

impl FieldSpec {
    pub fn required(name: impl Into<String>, kind: FieldKind) -> Self {
        Self { name: name.into(), required: true, kind }
    }

    pub fn optional(name: impl Into<String>, kind: FieldKind) -> Self {
        Self { name: name.into(), required: false, kind }
    }
}

type ClientFactory = dyn Fn(&PlaintextPayload, &str) -> Result<Arc<dyn ProviderClient>> + Send + Sync;

/// A statically registered provider type. Built once at process start and
/// never mutated afterward; all lookups on [`crate::registry::ProviderRegistry`]
/// are safe for concurrent readers because of this.
pub struct ProviderDescriptor {
    pub provider_type: ProviderType,
    pub version: &'static str,
    pub capabilities: HashSet<Capability>,
    pub credential_schema: Vec<FieldSpec>,
    factory: Arc<ClientFactory>,
}

impl ProviderDescriptor {
    pub fn new(
        provider_type: ProviderType,
        version: &'static str,
        capabilities: HashSet<Capability>,
        credential_schema: Vec<FieldSpec>,
        factory: impl Fn(&PlaintextPayload, &str) -> Result<Arc<dyn ProviderClient>> + Send + Sync + 'static,
    ) -> Self {
        Self { provider_type, version, capabilities, credential_schema, factory: Arc::new(factory) }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    /// Builds a per-call client from a decrypted credential payload and a
    /// target region. The factory is documented as idempotent: calling it
    /// twice with equivalent inputs yields equivalent, independent clients.
    pub fn build(&self, payload: &PlaintextPayload, region: &str) -> Result<Arc<dyn ProviderClient>> {
        (self.factory)(payload, region)
    }

    pub(crate) fn required_field_names(&self) -> Vec<String> {
        self.credential_schema.iter().filter(|f| f.required).map(|f| f.name.clone()).collect()
    }

    pub(crate) fn missing_fields(&self, payload: &PlaintextPayload) -> Vec<&str> {
        self.credential_schema
            .iter()
            .filter(|f| f.required)
            .filter(|f| payload.get(&f.name).is_none())
            .map(|f| f.name.as_str())
            .collect()
    }
}

pub(crate) fn unknown_provider(provider_type: &ProviderType) -> ControllerError {
    ControllerError::UnknownProvider { provider_type: provider_type.clone() }
}
