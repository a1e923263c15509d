//! # controller-core
//!
//! Shared identifiers, the closed error taxonomy, value types, and the
//! configuration surface used by every other crate in the workspace. This
//! crate owns no behavior of its own component — it is the vocabulary the
//! Crypto Envelope, Credential Store, Provider Registry, Dispatcher,
//! Operation Coordinator, Event Bus, and SSE Gateway all speak.
//!
//! ## Key components
//!
//! - **Identifiers**: [`WorkspaceId`], [`CredentialId`], [`OperationId`], [`SubscriptionId`]
//! - **Error taxonomy**: [`ControllerError`], closed per the component spec's §7
//! - **Shared value types**: [`OperationState`], [`OperationKind`], [`EventTypeName`], [`Deadline`]
//! - **Configuration**: [`Config`], loaded once at process start

pub mod config;
pub mod defaults;
pub mod error;
pub mod id;
pub mod metrics;
pub mod traits;
pub mod types;

pub use config::{Config, ConfigError, MasterKeyEntry, RetryPolicy};
pub use error::{ControllerError, ErrorKind, QuotaDetails, RegionQuota, Result};
pub use id::{CallerId, CredentialId, OperationId, ProviderType, SubscriptionId, WorkspaceId};
pub use metrics::Counter;
pub use traits::{Identifiable, WorkspaceScoped};
pub use types::{Capability, Deadline, DispatchClass, EventTypeName, KeyVersion, OperationKind, OperationState, StateVersion};

/// Common prelude for controller crates.
pub mod prelude {
    pub use crate::{
        Capability, CallerId, Config, ConfigError, ControllerError, CredentialId, Deadline, DispatchClass,
        ErrorKind, EventTypeName, Identifiable, KeyVersion, OperationId, OperationKind, OperationState,
        ProviderType, QuotaDetails, Result, RetryPolicy, SubscriptionId, WorkspaceId, WorkspaceScoped,
    };
}
