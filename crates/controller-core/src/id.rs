//! Identifier types for controller entities
//!
//! All identifiers are newtype wrappers, giving each entity kind its own type
//! so a `CredentialId` and an `OperationId` can never be swapped by accident.

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

macro_rules! uuid_id {
    ($name:ident) => {
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
        pub struct $name(Uuid);

        impl $name {
            /// Generate a new random id.
            pub fn new() -> Self {
                Self(Uuid::new_v4())
            }

            /// Wrap an existing UUID.
            pub fn from_uuid(uuid: Uuid) -> Self {
                Self(uuid)
            }

            /// Borrow the underlying UUID.
            pub fn as_uuid(&self) -> &Uuid {
                &self.0
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::new()
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl From<Uuid> for $name {
            fn from(uuid: Uuid) -> Self {
                Self(uuid)
            }
        }

        impl std::str::FromStr for $name {
            type Err = uuid::Error;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                Ok(Self(Uuid::parse_str(s)?))
            }
        }
    };
}

/// Tenant boundary that every credential, operation, and event belongs to.
uuid_id!(WorkspaceId);

/// Identifies a single stored, encrypted provider credential.
uuid_id!(CredentialId);

/// Identifies a long-running cloud mutation tracked by the Operation Coordinator.
uuid_id!(OperationId);

/// Identifies one connected SSE client's filtered view over the event bus.
uuid_id!(SubscriptionId);

/// Identifies the authenticated caller driving a dispatched call.
uuid_id!(CallerId);

/// Provider type discriminant. Closed per the static registry (`aws|gcp|azure|ncp|...`);
/// modeled as a string rather than an enum so new provider modules can be linked in
/// without widening a match anywhere in `controller-core`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProviderType(String);

impl ProviderType {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for ProviderType {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl From<String> for ProviderType {
    fn from(s: String) -> Self {
        Self(s)
    }
}
