//! The Credential Store validates a new credential's payload against the
//! owning provider's schema, but it must not depend on `controller-registry`
//! directly (the Dispatcher is the only crate that needs both). This trait is
//! the seam: the binary wires a concrete registry-backed implementation in.

use controller_core::ProviderType;

/// Looks up whether a provider type is known and which payload fields it
/// requires, without exposing the full `ProviderDescriptor`.
pub trait ProviderSchemaLookup: Send + Sync {
    fn is_known(&self, provider_type: &ProviderType) -> bool;

    /// Names of fields a credential payload for this provider must contain.
    /// Returns `None` if the provider type is unknown.
    fn required_fields(&self, provider_type: &ProviderType) -> Option<Vec<String>>;
}

/// A schema lookup that accepts anything: every provider type is known and
/// requires no fields. Useful for tests and for embedding contexts that
/// don't need schema enforcement.
pub struct PermissiveSchemaLookup;

impl ProviderSchemaLookup for PermissiveSchemaLookup {
    fn is_known(&self, _provider_type: &ProviderType) -> bool {
        true
    }

    fn required_fields(&self, _provider_type: &ProviderType) -> Option<Vec<String>> {
        Some(Vec::new())
    }
}
