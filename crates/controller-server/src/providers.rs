//! The static provider registry's linked-in module set (§9 redesign note:
//! runtime plugin loading from shared objects is replaced with provider
//! modules compiled into this binary). Each module here declares one
//! `ProviderDescriptor` — its capability set, credential schema, and a
//! client factory.
//!
//! None of these modules talk to a real cloud API; a production build
//! would swap each factory's body for the provider's actual SDK client
//! construction (e.g. `aws-sdk-eks`, `google-cloud-container`) while
//! keeping the same `ProviderDescriptor` shape. Wiring a real SDK in is out
//! of scope here — the core only needs the seam.

use std::collections::HashSet;
use std::sync::Arc;

use controller_core::{Capability, ProviderType};
use controller_registry::{FieldKind, FieldSpec, MockProviderClient, ProviderClient, ProviderDescriptor};

fn mock_factory(_payload: &controller_credential::PlaintextPayload, _region: &str) -> controller_core::Result<Arc<dyn ProviderClient>> {
    Ok(Arc::new(MockProviderClient::default()) as Arc<dyn ProviderClient>)
}

fn cloud_credential_schema() -> Vec<FieldSpec> {
    vec![
        FieldSpec::required("access_key_id", FieldKind::String),
        FieldSpec::required("secret_access_key", FieldKind::Secret),
    ]
}

/// The four built-in provider modules (`aws|gcp|azure|ncp`), each a thin
/// wrapper over [`MockProviderClient`] until a real SDK is linked in.
pub fn default_descriptors() -> Vec<ProviderDescriptor> {
    vec![
        aws_descriptor(),
        gcp_descriptor(),
        azure_descriptor(),
        ncp_descriptor(),
    ]
}

fn aws_descriptor() -> ProviderDescriptor {
    ProviderDescriptor::new(
        ProviderType::new("aws"),
        "1.0.0",
        [Capability::Kubernetes, Capability::Vm, Capability::Network, Capability::Iam, Capability::Regions]
            .into_iter()
            .collect::<HashSet<_>>(),
        cloud_credential_schema(),
        mock_factory,
    )
}

fn gcp_descriptor() -> ProviderDescriptor {
    ProviderDescriptor::new(
        ProviderType::new("gcp"),
        "1.0.0",
        [Capability::Kubernetes, Capability::Vm, Capability::Network, Capability::Regions].into_iter().collect(),
        vec![FieldSpec::required("service_account_json", FieldKind::Secret)],
        mock_factory,
    )
}

fn azure_descriptor() -> ProviderDescriptor {
    ProviderDescriptor::new(
        ProviderType::new("azure"),
        "1.0.0",
        [Capability::Kubernetes, Capability::Vm, Capability::Network, Capability::Regions].into_iter().collect(),
        vec![
            FieldSpec::required("tenant_id", FieldKind::String),
            FieldSpec::required("client_id", FieldKind::String),
            FieldSpec::required("client_secret", FieldKind::Secret),
        ],
        mock_factory,
    )
}

fn ncp_descriptor() -> ProviderDescriptor {
    ProviderDescriptor::new(
        ProviderType::new("ncp"),
        "1.0.0",
        [Capability::Vm, Capability::Network, Capability::Regions].into_iter().collect(),
        cloud_credential_schema(),
        mock_factory,
    )
}
