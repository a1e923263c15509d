//! The Provider Registry (C3): the static, read-only-after-init set of
//! provider descriptors the Dispatcher resolves against.

use std::collections::{HashMap, HashSet};

use controller_core::{Capability, ProviderType, Result};
use controller_credential::ProviderSchemaLookup;

use crate::descriptor::{unknown_provider, ProviderDescriptor};

#[derive(Debug, Clone)]
pub struct ProviderInfo {
    pub provider_type: ProviderType,
    pub version: &'static str,
    pub capabilities: HashSet<Capability>,
}

/// Populated once at process start from a static set of descriptors; no
/// runtime loading of untrusted code is supported (§9 design note a).
pub struct ProviderRegistry {
    descriptors: HashMap<ProviderType, ProviderDescriptor>,
}

impl ProviderRegistry {
    pub fn new(descriptors: Vec<ProviderDescriptor>) -> Self {
        let descriptors = descriptors.into_iter().map(|d| (d.provider_type.clone(), d)).collect();
        Self { descriptors }
    }

    pub fn get(&self, provider_type: &ProviderType) -> Result<&ProviderDescriptor> {
        self.descriptors.get(provider_type).ok_or_else(|| unknown_provider(provider_type))
    }

    pub fn list(&self) -> Vec<ProviderInfo> {
        self.descriptors
            .values()
            .map(|d| ProviderInfo { provider_type: d.provider_type.clone(), version: d.version, capabilities: d.capabilities.clone() })
            .collect()
    }
}

impl ProviderSchemaLookup for ProviderRegistry {
    fn is_known(&self, provider_type: &ProviderType) -> bool {
        self.descriptors.contains_key(provider_type)
    }

    fn required_fields(&self, provider_type: &ProviderType) -> Option<Vec<String>> {
        self.descriptors.get(provider_type).map(ProviderDescriptor::required_field_names)
    }
}
